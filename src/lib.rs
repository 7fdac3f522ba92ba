//! Grounded research assistant for a single attached file.
//!
//! A model reply streams in as cumulative text; [`extractor`] lifts the
//! `:::WORKSPACE_SAVE:` marker lines out of it into the [`notes`] workspace
//! while the cleaned text becomes the visible chat turn. [`session`] owns all
//! state, [`controller`] drives the gateway tasks, and [`quiz`] runs the
//! generated multiple-choice quiz.

pub mod attachment;
pub mod cli;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod gemini;
pub mod notes;
pub mod prompts;
pub mod quiz;
pub mod render;
pub mod session;

pub use attachment::Attachment;
pub use config::Config;
pub use controller::{Controller, Event, Update};
pub use error::AnalystError;
pub use extractor::{AnnotationExtractor, Extraction, TrailingMarker, SENTINEL};
pub use gateway::{ModelGateway, ReplyStream, SessionHandle};
pub use gemini::GeminiGateway;
pub use session::SessionManager;
