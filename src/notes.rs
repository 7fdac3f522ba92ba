//! The workspace notes pane: one flat, user-editable Markdown buffer that
//! captured facts are appended to.

use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::NotesError;

/// Heading used when no attachment is bound.
pub const DEFAULT_HEADING: &str = "# Key Findings";

/// A fact lifted out of a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactRecord {
    pub text: String,
    pub captured_at: DateTime<Local>,
}

impl FactRecord {
    pub fn new(text: impl Into<String>, captured_at: DateTime<Local>) -> Self {
        FactRecord {
            text: text.into(),
            captured_at,
        }
    }

    /// The line written into the notes buffer, e.g. `- [14:05] fact`.
    pub fn to_line(&self) -> String {
        format!("- [{}] {}", self.captured_at.format("%H:%M"), self.text)
    }
}

/// Notes buffer plus the append-only log of automatically captured facts.
///
/// User edits replace the text wholesale and are never reconciled against
/// the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notes {
    text: String,
    records: Vec<FactRecord>,
}

impl Default for Notes {
    fn default() -> Self {
        Self::with_heading(DEFAULT_HEADING)
    }
}

impl Notes {
    pub fn with_heading(heading: &str) -> Self {
        Notes {
            text: format!("{heading}\n\n"),
            records: Vec::new(),
        }
    }

    /// Fresh notes for a newly selected attachment.
    pub fn for_attachment(name: &str) -> Self {
        Self::with_heading(&format!("# Analysis: {name}"))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn records(&self) -> &[FactRecord] {
        &self.records
    }

    /// Replace the buffer with user-edited text.
    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Append a free-form line typed by the user.
    pub fn append_line(&mut self, line: &str) {
        self.ensure_line_break();
        self.text.push_str(line);
        self.text.push('\n');
    }

    /// Append captured facts, one line each, all stamped with `at`.
    pub fn append_facts<I, S>(&mut self, facts: I, at: DateTime<Local>) -> Vec<FactRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut appended = Vec::new();
        for fact in facts {
            let record = FactRecord::new(fact, at);
            self.ensure_line_break();
            self.text.push_str(&record.to_line());
            self.text.push('\n');
            self.records.push(record.clone());
            appended.push(record);
        }
        appended
    }

    /// Write the buffer to a Markdown file.
    pub fn save(&self, path: &Path) -> Result<(), NotesError> {
        std::fs::write(path, &self.text).map_err(|source| NotesError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    fn ensure_line_break(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }
}

/// Read replacement notes text from disk.
pub fn read_notes_file(path: &Path) -> Result<String, NotesError> {
    std::fs::read_to_string(path).map_err(|source| NotesError::Read {
        path: path.display().to_string(),
        source,
    })
}
