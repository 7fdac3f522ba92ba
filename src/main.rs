use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use source_analyst::cli::{Args, Command, QuizInput, HELP_TEXT};
use source_analyst::conversation::Origin;
use source_analyst::error::NotesError;
use source_analyst::notes::{read_notes_file, FactRecord};
use source_analyst::render;
use source_analyst::{Attachment, Config, Controller, GeminiGateway, Update};

struct Repl {
    controller: Controller,
    config: Config,
    /// Reply currently being printed and the text already written for it.
    streaming: Option<(Uuid, String)>,
    pending_facts: Vec<FactRecord>,
}

impl Repl {
    fn attach(&mut self, path: &Path) {
        match Attachment::from_path(path, self.config.max_attachment_bytes) {
            Ok(attachment) => {
                self.streaming = None;
                self.pending_facts.clear();
                self.controller.select_attachment(attachment);
                let session = self.controller.session();
                println!(
                    "{}",
                    render::header(
                        session.attachment(),
                        &self.config.model,
                        session.quiz_timer_enabled()
                    )
                );
                if let Some(greeting) = session.conversation().last() {
                    println!("{}", render::turn(greeting));
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "attachment rejected");
                println!("{}", render::error(&e.to_string()));
            }
        }
    }

    /// Returns `false` when the user asked to quit.
    fn handle_line(&mut self, line: &str) -> io::Result<bool> {
        if let Some(quiz) = self.controller.session().quiz() {
            match QuizInput::parse(line, quiz.current().options.len()) {
                QuizInput::Command(command) => return self.run_command(command),
                input => self.handle_quiz_input(input),
            }
            return Ok(true);
        }
        self.run_command(Command::parse(line))
    }

    fn run_command(&mut self, command: Command) -> io::Result<bool> {
        match command {
            Command::Chat(text) => match self.controller.submit(&text) {
                Ok(turn_id) => {
                    print!("{} ", render::label(Origin::Model));
                    io::stdout().flush()?;
                    self.streaming = Some((turn_id, String::new()));
                }
                Err(e) => println!("{}", render::error(&e.to_string())),
            },
            Command::File(path) => self.attach(&path),
            Command::Clear => {
                self.streaming = None;
                self.controller.clear_attachment();
                println!("{}", render::info("Session cleared."));
            }
            Command::ShowNotes => println!("{}", render::notes(self.controller.session().notes())),
            Command::AppendNote(text) => {
                self.controller.session_mut().append_note_line(&text);
                println!("{}", render::info("Added to notes."));
            }
            Command::EditNotes => match self.edit_in_editor() {
                Ok(()) => println!("{}", render::info("Notes updated.")),
                Err(e) => {
                    warn!(error = %e, "notes edit failed");
                    println!("{}", render::error(&e.to_string()));
                }
            },
            Command::LoadNotes(path) => match read_notes_file(&path) {
                Ok(text) => {
                    self.controller.session_mut().edit_notes(text);
                    info!(path = %path.display(), "notes loaded");
                    println!("{}", render::info(&format!("Notes replaced from {}", path.display())));
                }
                Err(e) => println!("{}", render::error(&e.to_string())),
            },
            Command::SaveNotes(path) => match self.controller.session().notes().save(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "notes saved");
                    println!("{}", render::info(&format!("Notes written to {}", path.display())));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "notes save failed");
                    println!("{}", render::error(&e.to_string()));
                }
            },
            Command::Preview(path) => match self.controller.session().attachment() {
                Some(attachment) => match attachment.write_preview(&path) {
                    Ok(blob) => println!(
                        "{}",
                        render::info(&format!("{} ({}) written to {}", attachment.name(), blob.mime_type, path.display()))
                    ),
                    Err(e) => println!("{}", render::error(&e.to_string())),
                },
                None => println!("{}", render::error("No file attached.")),
            },
            Command::Quiz => match self.controller.generate_quiz() {
                Ok(()) => println!("{}", render::info("Generating quiz...")),
                Err(e) => println!("{}", render::error(&e.to_string())),
            },
            Command::ToggleTimer => {
                let on = self.controller.session_mut().toggle_quiz_timer();
                println!(
                    "{}",
                    render::info(&format!("Quiz timer {}", if on { "on" } else { "off" }))
                );
            }
            Command::Help => println!("{HELP_TEXT}"),
            Command::Quit => return Ok(false),
            Command::Invalid(message) => println!("{}", render::error(&message)),
        }
        Ok(true)
    }

    /// Round-trip the notes through `$EDITOR` (or `vi`) on a temp file.
    fn edit_in_editor(&mut self) -> Result<(), NotesError> {
        let path = std::env::temp_dir().join(format!("source-analyst-notes-{}.md", Uuid::new_v4()));
        self.controller.session().notes().save(&path)?;
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        let status = std::process::Command::new(&editor).arg(&path).status();
        let result = match status {
            Ok(status) if status.success() => read_notes_file(&path),
            Ok(status) => Err(NotesError::Editor(format!("{editor} exited with {status}"))),
            Err(e) => Err(NotesError::Editor(format!("could not run {editor}: {e}"))),
        };
        let _ = std::fs::remove_file(&path);
        self.controller.session_mut().edit_notes(result?);
        Ok(())
    }

    fn handle_quiz_input(&mut self, input: QuizInput) {
        match input {
            QuizInput::Select(option) => match self.controller.quiz_select(option) {
                Some(answer) => {
                    if let Some(quiz) = self.controller.session().quiz() {
                        println!("{}", render::answer(&answer, quiz));
                    }
                }
                None => self.explain_quiz_state(),
            },
            QuizInput::Next => {
                if !self.controller.quiz_advance() {
                    self.explain_quiz_state();
                    return;
                }
                self.show_quiz_or_results();
            }
            QuizInput::Close => {
                self.controller.close_quiz();
                println!("{}", render::info("Quiz closed."));
            }
            QuizInput::Command(_) | QuizInput::Unknown => {
                println!("{}", render::info("Answer 1-4, n for next, q to close."))
            }
        }
    }

    /// Tell the user why a quiz key did nothing.
    fn explain_quiz_state(&self) {
        if let Some(quiz) = self.controller.session().quiz() {
            println!("{}", render::info(render::quiz_hint(quiz.state())));
        }
    }

    fn show_quiz_or_results(&mut self) {
        let Some(quiz) = self.controller.session().quiz() else {
            return;
        };
        if quiz.is_completed() {
            println!("{}", render::quiz_results(quiz));
            self.controller.close_quiz();
        } else {
            println!("{}", render::quiz_question(quiz));
        }
    }

    fn handle_update(&mut self, update: Update) -> io::Result<()> {
        match update {
            Update::Reply {
                turn_id,
                text,
                new_facts,
            } => {
                self.pending_facts.extend(new_facts);
                self.print_reply(turn_id, &text)?;
            }
            Update::ReplyFinished {
                turn_id,
                failed,
                new_facts,
            } => {
                self.pending_facts.extend(new_facts);
                if failed {
                    println!();
                    if let Some(turn) = self.controller.session().conversation().get(turn_id) {
                        println!("{}", render::turn(turn));
                    }
                } else {
                    let text = self
                        .controller
                        .session()
                        .conversation()
                        .get(turn_id)
                        .map(|t| t.display_text.clone())
                        .unwrap_or_default();
                    self.print_reply(turn_id, &text)?;
                    println!();
                }
                self.streaming = None;
                for record in self.pending_facts.drain(..) {
                    println!("{}", render::fact_saved(&record));
                }
            }
            Update::QuizReady => self.show_quiz_or_results(),
            Update::QuizFailed => {
                if let Some(turn) = self.controller.session().conversation().last() {
                    println!("{}", render::turn(turn));
                }
            }
            Update::QuizTick {
                remaining_seconds,
                expired,
            } => {
                if expired {
                    println!("\n{}", render::error("Time is up."));
                    self.show_quiz_or_results();
                } else if remaining_seconds % 60 == 0 || remaining_seconds == 10 {
                    if let Some(quiz) = self.controller.session().quiz() {
                        println!("{}", render::info(&format!("{} left", quiz.format_remaining())));
                    }
                }
            }
            Update::Ignored => {}
        }
        Ok(())
    }

    fn print_reply(&mut self, turn_id: Uuid, text: &str) -> io::Result<()> {
        let Some((current, printed)) = self.streaming.as_mut() else {
            return Ok(());
        };
        if *current != turn_id {
            return Ok(());
        }
        match render::stream_delta(printed, text) {
            Some(delta) => print!("{delta}"),
            None => print!("\n{text}"),
        }
        printed.clear();
        printed.push_str(text);
        io::stdout().flush()
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);

    let gateway = Arc::new(GeminiGateway::new(&config)?);
    let mut repl = Repl {
        controller: Controller::new(gateway, &config),
        config,
        streaming: None,
        pending_facts: Vec::new(),
    };

    match &args.file {
        Some(path) => repl.attach(path),
        None => println!(
            "{}",
            render::header(None, &repl.config.model, repl.config.quiz_timer_enabled)
        ),
    }
    println!("{}", render::info("Type /help for commands."));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !repl.handle_line(&line)? {
                    break;
                }
            }
            Some(event) = repl.controller.next_event() => {
                let update = repl.controller.handle(event);
                repl.handle_update(update)?;
            }
        }
    }

    info!("exiting");
    Ok(())
}
