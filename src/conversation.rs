//! Chat turns and the ordered conversation that owns them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Model,
    /// Local notices (greeting, quiz failure). Shown, never sent to the model.
    System,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::User => write!(f, "user"),
            Origin::Model => write!(f, "model"),
            Origin::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub id: Uuid,
    pub origin: Origin,
    pub display_text: String,
    pub created_at: DateTime<Utc>,
    pub in_streaming: bool,
    /// Set when the model turn was finalized by a gateway error.
    pub failed: bool,
}

impl Turn {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Turn {
            id: Uuid::new_v4(),
            origin,
            display_text: text.into(),
            created_at: Utc::now(),
            in_streaming: false,
            failed: false,
        }
    }

    fn streaming_placeholder() -> Self {
        Turn {
            in_streaming: true,
            ..Turn::new(Origin::Model, "")
        }
    }
}

/// One completed user → model exchange, as sent back to the model as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub model: String,
}

/// Turns in chronological order. Only the streaming model turn is mutable.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn push(&mut self, turn: Turn) -> Uuid {
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Append an empty streaming model turn and return its id.
    pub fn push_placeholder(&mut self) -> Uuid {
        self.push(Turn::streaming_placeholder())
    }

    pub fn streaming_turn(&self) -> Option<&Turn> {
        self.turns.iter().find(|t| t.in_streaming)
    }

    /// Replace the text of a streaming turn. Frozen turns are left alone.
    pub fn replace_streaming_text(&mut self, id: Uuid, text: String) -> bool {
        match self.turns.iter_mut().find(|t| t.id == id && t.in_streaming) {
            Some(turn) => {
                turn.display_text = text;
                true
            }
            None => false,
        }
    }

    /// Freeze a streaming turn, optionally replacing its text with an error.
    pub fn finalize(&mut self, id: Uuid, error_text: Option<&str>) -> bool {
        match self.turns.iter_mut().find(|t| t.id == id && t.in_streaming) {
            Some(turn) => {
                turn.in_streaming = false;
                if let Some(err) = error_text {
                    turn.display_text = err.to_string();
                    turn.failed = true;
                }
                true
            }
            None => false,
        }
    }

    /// Completed exchanges to replay as model context. System turns, failed
    /// replies (and the user turn that prompted them) and the streaming turn
    /// are excluded.
    pub fn exchanges(&self) -> Vec<Exchange> {
        let mut out = Vec::new();
        let mut pending_user: Option<&str> = None;
        for turn in &self.turns {
            match turn.origin {
                Origin::User => pending_user = Some(turn.display_text.as_str()),
                Origin::Model => {
                    if let Some(user) = pending_user.take() {
                        if !turn.failed && !turn.in_streaming {
                            out.push(Exchange {
                                user: user.to_string(),
                                model: turn.display_text.clone(),
                            });
                        }
                    }
                }
                Origin::System => {}
            }
        }
        out
    }
}
