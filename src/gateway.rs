//! The seam to the hosted model.
//!
//! Everything the crate knows about the remote side goes through
//! [`ModelGateway`]: open a chat session, stream a reply as cumulative text,
//! and request a schema-constrained JSON value.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::conversation::Exchange;
use crate::error::GatewayError;

/// Cumulative reply text: each item is the full text received so far.
pub type ReplyStream = BoxStream<'static, Result<String, GatewayError>>;

/// Client-side handle to one model chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHandle {
    pub id: Uuid,
    pub system_instruction: String,
    pub temperature: f32,
}

impl SessionHandle {
    pub fn new(system_instruction: impl Into<String>, temperature: f32) -> Self {
        SessionHandle {
            id: Uuid::new_v4(),
            system_instruction: system_instruction.into(),
            temperature,
        }
    }
}

/// Everything needed to open one reply stream. Owned so it can move into a
/// spawned task.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub session: SessionHandle,
    pub prior: Vec<Exchange>,
    pub text: String,
    /// Present only on the first exchange of a session.
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    fn create_session(&self, system_instruction: &str, temperature: f32) -> SessionHandle {
        SessionHandle::new(system_instruction, temperature)
    }

    /// Drop any model-side state held for `session`.
    fn discard_session(&self, _session: &SessionHandle) {}

    async fn stream_reply(
        &self,
        session: &SessionHandle,
        prior: &[Exchange],
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<ReplyStream, GatewayError>;

    async fn generate_structured(
        &self,
        attachment: &Attachment,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, GatewayError>;
}
