//! Structured configuration errors.

use derive_more::Display;
use thiserror::Error;

/// Failure categories shared by the profile store and the startup resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorCategory {
    #[display("missing environment input")]
    MissingEnvironmentInput,
    #[display("malformed reference")]
    MalformedReference,
    #[display("external service unavailable")]
    ExternalServiceUnavailable,
    #[display("missing infrastructure output")]
    MissingInfrastructureOutput,
    #[display("malformed secret payload")]
    MalformedSecretPayload,
    #[display("missing secret field")]
    MissingSecretField,
    #[display("invalid field value")]
    InvalidFieldValue,
    #[display("unknown secret field")]
    UnknownSecretField,
    #[display("profile not found")]
    ProfileNotFound,
    #[display("profile corrupt")]
    ProfileCorrupt,
    #[display("inheritance cycle")]
    InheritanceCycle,
    #[display("projection field missing")]
    ProjectionFieldMissing,
}

/// A configuration failure with everything needed to act on it: the category,
/// a human message, and the complete set of suggestions and supporting
/// details collected in one pass.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigError {
    pub category: ErrorCategory,
    pub message: String,
    pub suggestions: Vec<String>,
    pub details: Vec<String>,
}

impl ConfigError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            suggestions: Vec::new(),
            details: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details.extend(details);
        self
    }

    /// Full human-readable rendering: category, message, suggestions, then
    /// every supporting detail. A process refusing to start prints this.
    pub fn render(&self) -> String {
        let mut out = format!("{}: {}", self.category, self.message);
        for suggestion in &self.suggestions {
            out.push_str(&format!("\n  suggestion: {suggestion}"));
        }
        for detail in &self.details {
            out.push_str(&format!("\n  - {detail}"));
        }
        out
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_part() {
        let err = ConfigError::new(ErrorCategory::MissingSecretField, "secret is incomplete")
            .with_suggestion("add the listed fields to the secret payload")
            .with_details(vec!["tenant_id".to_string(), "client_id".to_string()]);

        let rendered = err.render();
        assert!(rendered.contains("missing secret field"));
        assert!(rendered.contains("secret is incomplete"));
        assert!(rendered.contains("suggestion: add the listed fields"));
        assert!(rendered.contains("- tenant_id"));
        assert!(rendered.contains("- client_id"));
    }

    #[test]
    fn display_is_the_message() {
        let err = ConfigError::new(ErrorCategory::ProfileCorrupt, "user.json is not valid JSON");
        assert_eq!(err.to_string(), "user.json is not valid JSON");
    }
}
