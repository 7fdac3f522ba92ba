//! Conversation/session state manager.
//!
//! Owns the active attachment, the conversation, the notes buffer, the quiz
//! and the model session handle. All mutation goes through here. Gateway
//! work is split into `begin_*` (validate and record intent) and
//! `apply_*`/`finish_*` (fold results back in) so an event loop can
//! interleave other events in between; tickets carry the epoch they were
//! issued in, and anything from an older epoch is dropped.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::config::Config;
use crate::conversation::{Conversation, Origin, Turn};
use crate::error::{GatewayError, QuizError, QuizRejected, SubmitRejected};
use crate::extractor::{AnnotationExtractor, TrailingMarker};
use crate::gateway::{ModelGateway, SessionHandle, StreamRequest};
use crate::notes::{FactRecord, Notes};
use crate::prompts;
use crate::quiz::{QuizQuestion, QuizSession};

/// Shown in place of a reply whose stream failed.
pub const CHAT_ERROR_TEXT: &str =
    "**Error:** Failed to analyze content. Please try again or check your API key.";

/// System turn appended when quiz generation fails.
pub const QUIZ_ERROR_TEXT: &str = "**System:** Failed to generate quiz. Please try again.";

/// Query sent when the user submits an empty message with a file attached.
pub const FILE_ONLY_QUERY: &str = "Analyze the attached file.";

/// What the session is currently waiting on. At most one gateway call is in
/// flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Sending { turn_id: Uuid },
    GeneratingQuiz,
}

/// Identifies one accepted chat submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendTicket {
    pub epoch: u64,
    pub turn_id: Uuid,
}

/// Identifies one accepted quiz generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizTicket {
    pub epoch: u64,
}

/// Inputs for a quiz generation call.
#[derive(Debug, Clone)]
pub struct QuizJob {
    pub attachment: Attachment,
    pub prompt: String,
}

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub remaining_seconds: u32,
    pub expired: bool,
}

pub struct SessionManager {
    gateway: Arc<dyn ModelGateway>,
    model_session: SessionHandle,
    chat_temperature: f32,
    attachment: Option<Attachment>,
    conversation: Conversation,
    notes: Notes,
    extractor: AnnotationExtractor,
    /// Cumulative text of the reply currently streaming.
    reply_text: String,
    activity: Activity,
    epoch: u64,
    quiz: Option<QuizSession>,
    quiz_serial: u64,
    quiz_timer_enabled: bool,
    quiz_time_budget: u32,
    quiz_length: usize,
    clock: fn() -> DateTime<Local>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &Config) -> Self {
        let model_session =
            gateway.create_session(&prompts::system_instruction(), config.chat_temperature);
        SessionManager {
            gateway,
            model_session,
            chat_temperature: config.chat_temperature,
            attachment: None,
            conversation: Conversation::new(),
            notes: Notes::default(),
            extractor: AnnotationExtractor::with_trailing(TrailingMarker::Defer),
            reply_text: String::new(),
            activity: Activity::Idle,
            epoch: 0,
            quiz: None,
            quiz_serial: 0,
            quiz_timer_enabled: config.quiz_timer_enabled,
            quiz_time_budget: config.quiz_time_budget_secs,
            quiz_length: config.quiz_length,
            clock: Local::now,
        }
    }

    /// Override the clock used to stamp captured facts.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn is_idle(&self) -> bool {
        self.activity == Activity::Idle
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn model_session(&self) -> &SessionHandle {
        &self.model_session
    }

    pub fn quiz(&self) -> Option<&QuizSession> {
        self.quiz.as_ref()
    }

    pub fn quiz_mut(&mut self) -> Option<&mut QuizSession> {
        self.quiz.as_mut()
    }

    /// Changes each time a new quiz session is created.
    pub fn quiz_serial(&self) -> u64 {
        self.quiz_serial
    }

    pub fn quiz_timer_enabled(&self) -> bool {
        self.quiz_timer_enabled
    }

    // -----------------------------------------------------------------------
    // Attachment lifecycle
    // -----------------------------------------------------------------------

    /// Bind a new file. Discards the conversation, notes, quiz and any
    /// in-flight work, and starts a fresh model session.
    pub fn select_attachment(&mut self, attachment: Attachment) {
        info!(
            file = attachment.name(),
            mime = attachment.mime_type(),
            bytes = attachment.byte_size(),
            "attachment selected"
        );
        self.reset();
        self.notes = Notes::for_attachment(attachment.name());
        self.conversation
            .push(Turn::new(Origin::System, prompts::greeting(attachment.name())));
        self.attachment = Some(attachment);
    }

    /// Unbind the current file and return to the empty state.
    pub fn clear_attachment(&mut self) {
        info!("attachment cleared");
        self.reset();
        self.notes = Notes::default();
    }

    fn reset(&mut self) {
        self.gateway.discard_session(&self.model_session);
        self.model_session = self
            .gateway
            .create_session(&prompts::system_instruction(), self.chat_temperature);
        self.epoch += 1;
        self.activity = Activity::Idle;
        self.attachment = None;
        self.conversation.clear();
        self.extractor.reset();
        self.reply_text.clear();
        self.quiz = None;
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Accept a chat submission. On success the user turn and a streaming
    /// placeholder are already appended; the caller opens the stream
    /// described by the returned request.
    pub fn begin_send(&mut self, text: &str) -> Result<(SendTicket, StreamRequest), SubmitRejected> {
        if !self.is_idle() {
            return Err(SubmitRejected::Busy);
        }
        let blank = text.trim().is_empty();
        if blank && self.attachment.is_none() {
            return Err(SubmitRejected::NothingToSend);
        }
        let query = if blank { FILE_ONLY_QUERY } else { text };

        let prior = self.conversation.exchanges();
        self.conversation.push(Turn::new(Origin::User, query));
        let turn_id = self.conversation.push_placeholder();
        self.extractor.reset();
        self.reply_text.clear();
        self.activity = Activity::Sending { turn_id };

        let attachment = if prior.is_empty() {
            self.attachment.clone()
        } else {
            None
        };
        debug!(%turn_id, prior = prior.len(), inline = attachment.is_some(), "send accepted");
        let request = StreamRequest {
            session: self.model_session.clone(),
            prior,
            text: query.to_string(),
            attachment,
        };
        Ok((
            SendTicket {
                epoch: self.epoch,
                turn_id,
            },
            request,
        ))
    }

    fn is_current_send(&self, ticket: &SendTicket) -> bool {
        ticket.epoch == self.epoch
            && self.activity == Activity::Sending {
                turn_id: ticket.turn_id,
            }
    }

    /// Fold one cumulative increment into the placeholder turn. Returns the
    /// facts appended to notes, or `None` when the ticket is stale.
    pub fn apply_increment(&mut self, ticket: &SendTicket, cumulative: &str) -> Option<Vec<FactRecord>> {
        if !self.is_current_send(ticket) {
            warn!(turn_id = %ticket.turn_id, "dropping increment from superseded stream");
            return None;
        }
        self.reply_text.clear();
        self.reply_text.push_str(cumulative);
        let extraction = self.extractor.extract(cumulative);
        self.conversation
            .replace_streaming_text(ticket.turn_id, extraction.cleaned);
        Some(self.record_facts(extraction.new_facts))
    }

    /// Finalize the streaming turn. On error the text is replaced with
    /// [`CHAT_ERROR_TEXT`]; facts already captured stay in the notes.
    pub fn finish_send(
        &mut self,
        ticket: &SendTicket,
        error: Option<&GatewayError>,
    ) -> Option<Vec<FactRecord>> {
        if !self.is_current_send(ticket) {
            warn!(turn_id = %ticket.turn_id, "dropping completion from superseded stream");
            return None;
        }
        let facts = match error {
            None => {
                let extraction = self.extractor.finish(&self.reply_text);
                self.conversation
                    .replace_streaming_text(ticket.turn_id, extraction.cleaned);
                self.conversation.finalize(ticket.turn_id, None);
                self.record_facts(extraction.new_facts)
            }
            Some(err) => {
                warn!(turn_id = %ticket.turn_id, error = %err, "reply stream failed");
                self.conversation
                    .finalize(ticket.turn_id, Some(CHAT_ERROR_TEXT));
                Vec::new()
            }
        };
        self.reply_text.clear();
        self.activity = Activity::Idle;
        Some(facts)
    }

    fn record_facts(&mut self, facts: Vec<String>) -> Vec<FactRecord> {
        if facts.is_empty() {
            return Vec::new();
        }
        debug!(count = facts.len(), "captured workspace facts");
        self.notes.append_facts(facts, (self.clock)())
    }

    // -----------------------------------------------------------------------
    // Notes
    // -----------------------------------------------------------------------

    /// Replace the notes buffer with user-edited text.
    pub fn edit_notes(&mut self, text: impl Into<String>) {
        self.notes.edit(text);
    }

    pub fn append_note_line(&mut self, line: &str) {
        self.notes.append_line(line);
    }

    // -----------------------------------------------------------------------
    // Quiz
    // -----------------------------------------------------------------------

    pub fn toggle_quiz_timer(&mut self) -> bool {
        self.quiz_timer_enabled = !self.quiz_timer_enabled;
        self.quiz_timer_enabled
    }

    pub fn begin_quiz(&mut self) -> Result<(QuizTicket, QuizJob), QuizRejected> {
        if !self.is_idle() {
            return Err(QuizRejected::Busy);
        }
        let attachment = self.attachment.clone().ok_or(QuizRejected::NoAttachment)?;
        self.activity = Activity::GeneratingQuiz;
        info!(file = attachment.name(), "quiz generation started");
        Ok((
            QuizTicket { epoch: self.epoch },
            QuizJob {
                attachment,
                prompt: prompts::quiz_prompt(self.quiz_length),
            },
        ))
    }

    /// Install generated questions, or report the failure in the chat.
    /// Returns `false` when the ticket is stale.
    pub fn finish_quiz(
        &mut self,
        ticket: &QuizTicket,
        result: Result<Vec<QuizQuestion>, QuizError>,
    ) -> bool {
        if ticket.epoch != self.epoch || self.activity != Activity::GeneratingQuiz {
            warn!("dropping quiz result from superseded request");
            return false;
        }
        self.activity = Activity::Idle;
        let timer = self.quiz_timer_enabled.then_some(self.quiz_time_budget);
        match result.and_then(|questions| QuizSession::new(questions, timer)) {
            Ok(quiz) => {
                info!(questions = quiz.len(), timed = quiz.timer_enabled(), "quiz ready");
                self.quiz = Some(quiz);
                self.quiz_serial += 1;
            }
            Err(err) => {
                warn!(error = %err, "quiz generation failed");
                self.conversation
                    .push(Turn::new(Origin::System, QUIZ_ERROR_TEXT));
            }
        }
        true
    }

    /// Advance the countdown of quiz `serial`. `None` when that quiz is gone.
    pub fn quiz_tick(&mut self, serial: u64) -> Option<TickOutcome> {
        if serial != self.quiz_serial {
            return None;
        }
        let quiz = self.quiz.as_mut()?;
        let expired = quiz.tick();
        Some(TickOutcome {
            remaining_seconds: quiz.remaining_seconds(),
            expired,
        })
    }

    pub fn close_quiz(&mut self) {
        self.quiz = None;
    }
}
