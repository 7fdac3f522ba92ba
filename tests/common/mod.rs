//! In-memory gateway that replays scripted replies.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use source_analyst::attachment::Attachment;
use source_analyst::config::Config;
use source_analyst::controller::Controller;
use source_analyst::conversation::Exchange;
use source_analyst::error::GatewayError;
use source_analyst::gateway::{ModelGateway, ReplyStream, SessionHandle};

/// One scripted reply: cumulative increments, optionally ending in an error.
#[derive(Debug, Clone, Default)]
pub struct ReplyScript {
    pub increments: Vec<String>,
    pub error: Option<String>,
}

impl ReplyScript {
    pub fn ok(increments: &[&str]) -> Self {
        ReplyScript {
            increments: increments.iter().map(|s| s.to_string()).collect(),
            error: None,
        }
    }

    pub fn failing(increments: &[&str], message: &str) -> Self {
        ReplyScript {
            error: Some(message.to_string()),
            ..Self::ok(increments)
        }
    }
}

/// What the gateway was asked to stream.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub session: Uuid,
    pub prior: Vec<Exchange>,
    pub text: String,
    pub attachment: Option<String>,
}

#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<ReplyScript>>,
    quizzes: Mutex<VecDeque<Result<Value, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    discarded: Mutex<Vec<Uuid>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, script: ReplyScript) {
        self.replies.lock().unwrap().push_back(script);
    }

    pub fn push_quiz(&self, result: Result<Value, String>) {
        self.quizzes.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn discarded(&self) -> Vec<Uuid> {
        self.discarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn discard_session(&self, session: &SessionHandle) {
        self.discarded.lock().unwrap().push(session.id);
    }

    async fn stream_reply(
        &self,
        session: &SessionHandle,
        prior: &[Exchange],
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<ReplyStream, GatewayError> {
        self.calls.lock().unwrap().push(RecordedCall {
            session: session.id,
            prior: prior.to_vec(),
            text: text.to_string(),
            attachment: attachment.map(|a| a.name().to_string()),
        });
        let script = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        let items: Vec<Result<String, GatewayError>> = script
            .increments
            .into_iter()
            .map(Ok)
            .chain(script.error.map(|m| Err(GatewayError::Malformed(m))))
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn generate_structured(
        &self,
        _attachment: &Attachment,
        _prompt: &str,
        _schema: &Value,
    ) -> Result<Value, GatewayError> {
        match self.quizzes.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(GatewayError::Malformed(message)),
            None => Err(GatewayError::EmptyResponse),
        }
    }
}

pub fn pdf(name: &str) -> Attachment {
    Attachment::from_bytes(name, "application/pdf", b"%PDF-1.7", 1024).expect("attachment")
}

pub fn controller_with(gateway: Arc<ScriptedGateway>, config: &Config) -> Controller {
    Controller::new(gateway, config)
}

pub fn quiz_json(count: usize) -> Value {
    let questions: Vec<Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "question": format!("Question {i}?"),
                "options": ["a", "b", "c", "d"],
                "correctAnswerIndex": i % 4,
            })
        })
        .collect();
    Value::Array(questions)
}
