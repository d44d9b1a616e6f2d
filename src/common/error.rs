//! Error and warning types for the Processor.
//!
//! There is a single fatal error category: processing stops at the first
//! error, no recovery is attempted, and no partial IR is produced. The kind
//! of error is carried in the message text itself (the phrasings are stable
//! and asserted on by tests). Warnings are non-fatal; they accumulate on the
//! Processor and are returned alongside the IR.

use crate::common::source::Span;
use thiserror::Error;

/// A fatal processing error with an optional source span.
///
/// The span is attached at the nearest enclosing point where the current AST
/// node is known; `with_span` never overwrites a span set deeper in the call
/// stack, so the most precise location wins.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProcessingError {
    pub message: String,
    pub span: Option<Span>,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    /// Attach a span if none has been attached yet.
    pub fn with_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

/// A non-fatal diagnostic collected during processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub span: Option<Span>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}
