//! Terminal rendering for the REPL.

use colored::*;

use crate::attachment::Attachment;
use crate::conversation::{Origin, Turn};
use crate::notes::{FactRecord, Notes};
use crate::quiz::{Answer, QuestionState, QuizSession, ScoreBand};

const OPTION_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

pub fn header(attachment: Option<&Attachment>, model: &str, timer_enabled: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "SOURCE ANALYST".bright_cyan().bold()));
    out.push_str(&format!("{}: {}\n", "Model".bright_yellow(), model));
    match attachment {
        Some(att) => out.push_str(&format!(
            "{}: {} ({}, {})\n",
            "Source".bright_yellow(),
            att.name().bright_white(),
            att.kind(),
            att.display_size()
        )),
        None => out.push_str(&format!(
            "{}: {}\n",
            "Source".bright_yellow(),
            "none (use /file PATH)".dimmed()
        )),
    }
    out.push_str(&format!(
        "{}: {}\n",
        "Quiz timer".bright_yellow(),
        if timer_enabled { "on" } else { "off" }
    ));
    out.push_str(&format!("{}", "=".repeat(50).bright_blue()));
    out
}

pub fn label(origin: Origin) -> ColoredString {
    match origin {
        Origin::User => "you".bright_green().bold(),
        Origin::Model => "analyst".bright_cyan().bold(),
        Origin::System => "system".bright_magenta().bold(),
    }
}

pub fn turn(turn: &Turn) -> String {
    let body = if turn.failed {
        turn.display_text.bright_red().to_string()
    } else {
        turn.display_text.clone()
    };
    format!("{} {}", label(turn.origin), body)
}

/// The part of `current` not yet printed, or `None` when the visible text
/// was rewritten and needs a full redraw.
pub fn stream_delta<'a>(printed: &str, current: &'a str) -> Option<&'a str> {
    current.strip_prefix(printed)
}

pub fn fact_saved(record: &FactRecord) -> String {
    format!("  {} {}", "saved to notes:".bright_yellow(), record.text.dimmed())
}

pub fn notes(notes: &Notes) -> String {
    format!(
        "{}\n{}\n{}",
        "----- notes -----".bright_blue(),
        notes.text().trim_end(),
        "-----------------".bright_blue()
    )
}

pub fn quiz_question(quiz: &QuizSession) -> String {
    let q = quiz.current();
    let mut out = format!(
        "{} {}/{}",
        "Question".bright_yellow().bold(),
        quiz.current_index() + 1,
        quiz.len()
    );
    if quiz.timer_enabled() {
        out.push_str(&format!("  [{}]", quiz.format_remaining().bright_white()));
    }
    out.push_str(&format!("  score {}\n{}\n", quiz.score(), q.question.bold()));
    for (i, option) in q.options.iter().enumerate() {
        let tag = OPTION_LABELS.get(i).copied().unwrap_or('?');
        out.push_str(&format!("  {}. ({}) {}\n", i + 1, tag, option));
    }
    match quiz.state() {
        QuestionState::Answered(a) => {
            out.push_str(&answer(&a, quiz));
            out.push('\n');
        }
        QuestionState::Unanswered | QuestionState::Completed => {}
    }
    out.push_str(&format!("{}", quiz_hint(quiz.state()).dimmed()));
    out
}

/// What the user can do next from this question state.
pub fn quiz_hint(state: QuestionState) -> &'static str {
    match state {
        QuestionState::Unanswered => "answer 1-4, n next, q close",
        QuestionState::Answered(_) => "already answered: n next, q close",
        QuestionState::Completed => "quiz finished: q close",
    }
}

pub fn answer(answer: &Answer, quiz: &QuizSession) -> String {
    let correct = quiz
        .current()
        .options
        .get(answer.correct_index)
        .map(String::as_str)
        .unwrap_or("?");
    if answer.correct {
        format!("{} {}", "Correct:".bright_green().bold(), correct)
    } else {
        format!(
            "{} the answer was {}",
            "Incorrect:".bright_red().bold(),
            correct
        )
    }
}

pub fn quiz_results(quiz: &QuizSession) -> String {
    let pct = format!("{}%", quiz.percentage());
    let pct = match quiz.band() {
        ScoreBand::High => pct.bright_green().bold(),
        ScoreBand::Medium => pct.bright_yellow().bold(),
        ScoreBand::Low => pct.bright_red().bold(),
    };
    let mut out = format!("{} {}\n", "Quiz complete:".bright_cyan().bold(), pct);
    out.push_str(&format!("You scored {} out of {}.", quiz.score(), quiz.len()));
    if quiz.timer_enabled() && quiz.remaining_seconds() == 0 {
        out.push_str(&format!(" {}", "(time expired)".bright_red()));
    }
    out
}

pub fn error(message: &str) -> String {
    format!("{} {}", "error:".bright_red().bold(), message)
}

pub fn info(message: &str) -> String {
    message.bright_blue().to_string()
}
