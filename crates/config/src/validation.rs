//! Aggregated validation errors for rate limit registrations.

use std::fmt;

/// A single violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending value, e.g. `rate_limits[0].address.port`.
    pub path: String,
    /// Human readable message, e.g. `"event" is required`.
    pub message: String,
}

/// Every constraint violated by a registration, in schema order.
///
/// Validation never stops at the first problem: callers get the full list so
/// a broken configuration can be fixed in one go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    details: Vec<Violation>,
}

impl ValidationError {
    /// Creates an empty error, to be filled with [`ValidationError::push`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation for the value at `path`.
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.details.push(Violation {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Records that the key at `path` is missing.
    pub fn required(&mut self, path: &str) {
        let message = format!("{} is required", label(path));
        self.push(path, message);
    }

    /// Records that the value at `path` is not one of `allowed`.
    pub fn one_of(&mut self, path: &str, allowed: &[&str]) {
        let message = format!("{} must be one of [{}]", label(path), allowed.join(", "));
        self.push(path, message);
    }

    /// Records that the value at `path` has the wrong type.
    pub fn wrong_type(&mut self, path: &str, expected: &str) {
        let message = format!("{} must be {expected}", label(path));
        self.push(path, message);
    }

    /// All violations, in the order they were found.
    pub fn details(&self) -> &[Violation] {
        &self.details
    }

    /// True when nothing was violated.
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Moves all violations of `other` into `self`.
    pub fn extend(&mut self, other: ValidationError) {
        self.details.extend(other.details);
    }

    /// Prepends `prefix` to the path of every violation.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        for violation in &mut self.details {
            violation.path = format!("{prefix}.{}", violation.path);
        }

        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.details.iter().enumerate() {
            if i > 0 {
                f.write_str(". ")?;
            }

            f.write_str(&violation.message)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The quoted name used in messages: the last segment of the path.
pub(crate) fn label(path: &str) -> String {
    let key = path.rsplit('.').next().unwrap_or(path);
    format!("\"{key}\"")
}
