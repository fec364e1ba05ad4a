//! The process environment contract.

use shipit_core::stack_ref::STACK_REF_FORMAT;
use shipit_core::{ConfigError, ConfigResult, ErrorCategory};

/// Environment variable naming the deployed infrastructure stack.
pub const STACK_REF_VAR: &str = "SHIPIT_STACK_REF";

/// Environment variable naming the secret record.
pub const SECRET_REF_VAR: &str = "SHIPIT_SECRET_REF";

const SECRET_REF_FORMAT: &str = "a secret name or fully-qualified secret locator";

/// The two startup identifiers. Nothing else is read from the environment by
/// this subsystem.
#[derive(Debug, Clone)]
pub struct EnvInputs {
    pub stack_ref: String,
    pub secret_ref: String,
}

impl EnvInputs {
    pub fn new(stack_ref: impl Into<String>, secret_ref: impl Into<String>) -> Self {
        Self {
            stack_ref: stack_ref.into(),
            secret_ref: secret_ref.into(),
        }
    }

    /// Read both identifiers from the process environment. Fails before any
    /// network call, naming every missing variable and its expected format.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Variant taking an explicit variable lookup, for callers that do not
    /// read the real process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let stack_ref = lookup(STACK_REF_VAR).filter(|v| !v.trim().is_empty());
        let secret_ref = lookup(SECRET_REF_VAR).filter(|v| !v.trim().is_empty());

        match (stack_ref, secret_ref) {
            (Some(stack_ref), Some(secret_ref)) => Ok(Self {
                stack_ref,
                secret_ref,
            }),
            (stack_ref, secret_ref) => {
                let mut absent = Vec::new();
                let mut details = Vec::new();
                if stack_ref.is_none() {
                    absent.push(STACK_REF_VAR);
                    details.push(format!("{STACK_REF_VAR}: expected {STACK_REF_FORMAT}"));
                }
                if secret_ref.is_none() {
                    absent.push(SECRET_REF_VAR);
                    details.push(format!("{SECRET_REF_VAR}: expected {SECRET_REF_FORMAT}"));
                }
                Err(ConfigError::new(
                    ErrorCategory::MissingEnvironmentInput,
                    format!("required environment input missing: {}", absent.join(", ")),
                )
                .with_details(details)
                .with_suggestion(
                    "both identifiers are published by provisioning; redeploy or set them by hand",
                ))
            }
        }
    }
}
