//! Caller-supplied sink for errors and warnings.
//!
//! The core never prints. Phases that can fail for several independent
//! reasons push every cause here and turn the collection into a single
//! aggregated [`SchemaError`] at the end of the phase.

use tracing::warn;

use crate::errors::{SchemaError, SchemaResult};

#[derive(Debug, Default, Clone)]
pub struct ErrorCollector {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Fail with every collected error wrapped by `wrap`, or succeed if none
    /// were collected. Collected errors are drained; warnings stay.
    pub fn throw_if_errors(&mut self, wrap: fn(Vec<String>) -> SchemaError) -> SchemaResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(wrap(std::mem::take(&mut self.errors)))
        }
    }
}
