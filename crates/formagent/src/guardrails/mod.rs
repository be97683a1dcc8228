//! Guardrails for chat content and form design
//!
//! Classifies free text and form drafts for unsafe or forbidden content,
//! improves low-quality responses, and keeps a capped violation log for
//! aggregate monitoring.

pub mod engine;
pub mod log;

pub use engine::{
    DesignCheck, DesignIssue, DesignIssueKind, GuardrailsEngine, SafetyCheck, SafetyViolation,
    SafetyWarning,
};
pub use log::{DEFAULT_LOG_CAPACITY, Severity, ViolationLog, ViolationRecord};
