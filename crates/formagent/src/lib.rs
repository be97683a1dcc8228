//! FormAgent - Chat-driven form builder backend
//!
//! This crate provides an HTTP service that turns natural-language chat
//! into structured form definitions, with per-conversation memory,
//! content guardrails, and a deterministic fallback when the AI backend
//! is unavailable.

pub mod actions;
pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod fallback;
pub mod forms;
pub mod guardrails;
pub mod server;

pub use error::FormAgentError;
