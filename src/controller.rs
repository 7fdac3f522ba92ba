//! Async driver around [`SessionManager`].
//!
//! Gateway calls and the quiz countdown run as spawned tasks that report back
//! over one unbounded channel. The front end awaits [`Controller::next_event`]
//! alongside its own input and feeds each event to [`Controller::handle`],
//! so every state change happens on a single task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::config::Config;
use crate::error::{GatewayError, QuizError, QuizRejected, SubmitRejected};
use crate::gateway::{ModelGateway, StreamRequest};
use crate::notes::FactRecord;
use crate::quiz::{parse_questions, quiz_response_schema, Answer, QuizQuestion};
use crate::session::{QuizJob, QuizTicket, SendTicket, SessionManager};

/// Message from a background task.
#[derive(Debug)]
pub enum Event {
    StreamIncrement {
        ticket: SendTicket,
        text: String,
    },
    StreamFinished {
        ticket: SendTicket,
        result: Result<(), GatewayError>,
    },
    QuizGenerated {
        ticket: QuizTicket,
        result: Result<Vec<QuizQuestion>, QuizError>,
    },
    QuizTick {
        serial: u64,
    },
}

/// What changed after handling an event, for the front end to render.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Reply {
        turn_id: Uuid,
        text: String,
        new_facts: Vec<FactRecord>,
    },
    ReplyFinished {
        turn_id: Uuid,
        failed: bool,
        new_facts: Vec<FactRecord>,
    },
    QuizReady,
    QuizFailed,
    QuizTick {
        remaining_seconds: u32,
        expired: bool,
    },
    /// The event belonged to superseded work.
    Ignored,
}

/// Aborts the wrapped task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Controller {
    session: SessionManager,
    gateway: Arc<dyn ModelGateway>,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    work: Option<TaskGuard>,
    timer: Option<TaskGuard>,
}

impl Controller {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &Config) -> Self {
        Self::with_session(SessionManager::new(gateway.clone(), config), gateway)
    }

    pub fn with_session(session: SessionManager, gateway: Arc<dyn ModelGateway>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Controller {
            session,
            gateway,
            tx,
            rx,
            work: None,
            timer: None,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Direct access for synchronous edits (notes, timer preference).
    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    pub fn is_busy(&self) -> bool {
        !self.session.is_idle()
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn select_attachment(&mut self, attachment: Attachment) {
        self.cancel_all();
        self.session.select_attachment(attachment);
    }

    pub fn clear_attachment(&mut self) {
        self.cancel_all();
        self.session.clear_attachment();
    }

    fn cancel_all(&mut self) {
        if self.work.take().is_some() {
            debug!("aborted in-flight gateway task");
        }
        self.timer = None;
    }

    /// Submit a chat message and start streaming the reply.
    pub fn submit(&mut self, text: &str) -> Result<Uuid, SubmitRejected> {
        let (ticket, request) = self.session.begin_send(text)?;
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let result = run_stream(gateway.as_ref(), ticket, request, &tx).await;
            let _ = tx.send(Event::StreamFinished { ticket, result });
        });
        self.work = Some(TaskGuard(handle));
        Ok(ticket.turn_id)
    }

    /// Start generating a quiz from the active attachment.
    pub fn generate_quiz(&mut self) -> Result<(), QuizRejected> {
        let (ticket, job) = self.session.begin_quiz()?;
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let result = run_quiz(gateway.as_ref(), job).await;
            let _ = tx.send(Event::QuizGenerated { ticket, result });
        });
        self.work = Some(TaskGuard(handle));
        Ok(())
    }

    /// Record an answer for the current question.
    pub fn quiz_select(&mut self, option: usize) -> Option<Answer> {
        self.session.quiz_mut()?.select(option)
    }

    /// Move to the next question, or complete the quiz after the last one.
    pub fn quiz_advance(&mut self) -> bool {
        let Some(quiz) = self.session.quiz_mut() else {
            return false;
        };
        let moved = quiz.advance();
        if quiz.is_completed() {
            self.timer = None;
        }
        moved
    }

    pub fn close_quiz(&mut self) {
        self.timer = None;
        self.session.close_quiz();
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn handle(&mut self, event: Event) -> Update {
        match event {
            Event::StreamIncrement { ticket, text } => {
                match self.session.apply_increment(&ticket, &text) {
                    Some(new_facts) => Update::Reply {
                        turn_id: ticket.turn_id,
                        text: self.display_text(ticket.turn_id),
                        new_facts,
                    },
                    None => Update::Ignored,
                }
            }
            Event::StreamFinished { ticket, result } => {
                let error = result.err();
                match self.session.finish_send(&ticket, error.as_ref()) {
                    Some(new_facts) => {
                        self.work = None;
                        Update::ReplyFinished {
                            turn_id: ticket.turn_id,
                            failed: error.is_some(),
                            new_facts,
                        }
                    }
                    None => Update::Ignored,
                }
            }
            Event::QuizGenerated { ticket, result } => {
                if !self.session.finish_quiz(&ticket, result) {
                    return Update::Ignored;
                }
                self.work = None;
                match self.session.quiz() {
                    Some(quiz) if quiz.timer_enabled() => {
                        self.start_timer();
                        Update::QuizReady
                    }
                    Some(_) => {
                        self.timer = None;
                        Update::QuizReady
                    }
                    None => Update::QuizFailed,
                }
            }
            Event::QuizTick { serial } => match self.session.quiz_tick(serial) {
                Some(outcome) => {
                    if outcome.expired {
                        info!("quiz time expired");
                        self.timer = None;
                    }
                    Update::QuizTick {
                        remaining_seconds: outcome.remaining_seconds,
                        expired: outcome.expired,
                    }
                }
                None => Update::Ignored,
            },
        }
    }

    /// Handle events until no gateway work is in flight.
    pub async fn run_until_idle(&mut self) -> Vec<Update> {
        let mut updates = Vec::new();
        while self.is_busy() {
            let Some(event) = self.next_event().await else {
                break;
            };
            updates.push(self.handle(event));
        }
        updates
    }

    fn display_text(&self, turn_id: Uuid) -> String {
        self.session
            .conversation()
            .get(turn_id)
            .map(|t| t.display_text.clone())
            .unwrap_or_default()
    }

    fn start_timer(&mut self) {
        let serial = self.session.quiz_serial();
        let tx = self.tx.clone();
        let period = Duration::from_secs(1);
        let handle = tokio::spawn(async move {
            let mut ticks = IntervalStream::new(interval_at(Instant::now() + period, period));
            while ticks.next().await.is_some() {
                if tx.send(Event::QuizTick { serial }).is_err() {
                    break;
                }
            }
        });
        self.timer = Some(TaskGuard(handle));
    }
}

async fn run_stream(
    gateway: &dyn ModelGateway,
    ticket: SendTicket,
    request: StreamRequest,
    tx: &mpsc::UnboundedSender<Event>,
) -> Result<(), GatewayError> {
    let mut stream = gateway
        .stream_reply(
            &request.session,
            &request.prior,
            &request.text,
            request.attachment.as_ref(),
        )
        .await?;
    while let Some(item) = stream.next().await {
        let text = item?;
        if tx.send(Event::StreamIncrement { ticket, text }).is_err() {
            break;
        }
    }
    Ok(())
}

async fn run_quiz(gateway: &dyn ModelGateway, job: QuizJob) -> Result<Vec<QuizQuestion>, QuizError> {
    let value = gateway
        .generate_structured(&job.attachment, &job.prompt, &quiz_response_schema())
        .await?;
    parse_questions(value)
}
