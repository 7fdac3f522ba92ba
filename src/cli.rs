use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "source-analyst")]
#[command(version)]
#[command(about = "Grounded research assistant for a single attached file, with a live notes workspace and quizzes")]
pub struct Args {
    /// File to analyze (PDF, video, audio or document)
    pub file: Option<PathBuf>,

    /// Path to a TOML config file (defaults to ./source-analyst.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the model name
    #[arg(long)]
    pub model: Option<String>,

    /// Start with the quiz countdown disabled
    #[arg(long)]
    pub no_timer: bool,

    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Args {
    /// Apply command-line overrides on top of a loaded config.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if self.no_timer {
            config.quiz_timer_enabled = false;
        }
    }
}

/// A line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    File(PathBuf),
    Clear,
    ShowNotes,
    AppendNote(String),
    /// Open the notes in `$EDITOR` and replace them with the result.
    EditNotes,
    /// Replace the notes with the contents of a file.
    LoadNotes(PathBuf),
    SaveNotes(PathBuf),
    Preview(PathBuf),
    Quiz,
    ToggleTimer,
    Help,
    Quit,
    /// A slash command that was not understood; carries the message to show.
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Chat(line.trim_end_matches(['\r', '\n']).to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name, arg.is_empty()) {
            ("file", false) => Command::File(PathBuf::from(arg)),
            ("clear", _) => Command::Clear,
            ("notes", _) => Command::ShowNotes,
            ("note", false) => Command::AppendNote(arg.to_string()),
            ("edit", _) => Command::EditNotes,
            ("load", false) => Command::LoadNotes(PathBuf::from(arg)),
            ("save", false) => Command::SaveNotes(PathBuf::from(arg)),
            ("preview", false) => Command::Preview(PathBuf::from(arg)),
            ("quiz", _) => Command::Quiz,
            ("timer", _) => Command::ToggleTimer,
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            ("file" | "note" | "load" | "save" | "preview", true) => {
                Command::Invalid(format!("/{name} needs an argument"))
            }
            _ => Command::Invalid(format!("Unknown command: /{name}")),
        }
    }
}

/// A line typed while a quiz is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizInput {
    /// Zero-based option index.
    Select(usize),
    Next,
    Close,
    /// Slash commands keep working during a quiz.
    Command(Command),
    Unknown,
}

impl QuizInput {
    pub fn parse(line: &str, option_count: usize) -> QuizInput {
        let trimmed = line.trim();
        if trimmed.starts_with('/') {
            return QuizInput::Command(Command::parse(trimmed));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "n" | "next" => QuizInput::Next,
            "q" | "quit" | "close" => QuizInput::Close,
            other => match other.parse::<usize>() {
                Ok(n) if (1..=option_count).contains(&n) => QuizInput::Select(n - 1),
                _ => QuizInput::Unknown,
            },
        }
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /file PATH      attach a file (replaces the current one and resets the session)
  /clear          detach the file and reset the session
  /notes          show the notes workspace
  /note TEXT      append a line to the notes
  /edit           edit the notes in $EDITOR
  /load PATH      replace the notes with a file's contents
  /save PATH      write the notes to a Markdown file
  /preview PATH   write the attached file back to disk
  /quiz           generate a quiz from the attached file
  /timer          toggle the quiz countdown
  /help           show this help
  /quit           exit
Anything else is sent to the analyst. An empty line asks about the attached file.
During a quiz: 1-4 answer, n next, q close. Slash commands still work.";
