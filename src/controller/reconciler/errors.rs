//! # Error Collection
//!
//! Accumulates independent failures of one pass so every failing condition or
//! channel is reported, not just the first.

use crate::controller::reconciler::types::ReconcilerError;
use std::fmt;

#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<ReconcilerError>,
}

impl ErrorCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ReconcilerError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok` when nothing was collected
    ///
    /// # Errors
    /// Returns every collected error as one value
    pub fn into_result(self) -> Result<(), CollectedErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CollectedErrors(self.errors))
        }
    }
}

/// Several errors reported as one; `Display` joins them with newlines
#[derive(Debug)]
pub struct CollectedErrors(Vec<ReconcilerError>);

impl CollectedErrors {
    #[must_use]
    pub fn errors(&self) -> &[ReconcilerError] {
        &self.0
    }
}

impl fmt::Display for CollectedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CollectedErrors {}
