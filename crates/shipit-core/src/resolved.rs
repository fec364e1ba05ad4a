//! The resolved runtime configuration assembled once at process startup.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::stack_ref::StackRef;
use crate::{ConfigError, ErrorCategory};

/// Operational log level carried in the secret payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[display("error")]
    Error,
    #[display("warn")]
    Warn,
    #[display("info")]
    Info,
    #[display("debug")]
    Debug,
    #[display("trace")]
    Trace,
}

impl LogLevel {
    /// Accepted textual forms, matched case-sensitively.
    pub const ALLOWED: [&'static str; 5] = ["error", "warn", "info", "debug", "trace"];
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ConfigError::new(
                ErrorCategory::InvalidFieldValue,
                format!("'{other}' is not a valid log level"),
            )
            .with_suggestion(format!("use one of [{}]", LogLevel::ALLOWED.join(", ")))),
        }
    }
}

/// Split a comma-separated host list into trimmed entries.
pub fn split_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect()
}

/// Named values extracted from the infrastructure-description service.
/// All required; none is defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraOutputs {
    /// Primary datastore name.
    pub database: String,
    /// Work queue locator.
    pub queue: String,
    /// Public catalog endpoint.
    pub catalog_endpoint: String,
}

/// Runtime parameters sourced from the secret payload. All ten fields are
/// required; absence of any one fails resolution.
#[derive(Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub app_id: String,
    pub package_scope: String,
    pub package_prefix: String,
    pub api_base_url: Url,
    pub log_level: LogLevel,
    pub verify_webhooks: bool,
    pub allowed_hosts: Vec<String>,
}

// The service-account secret never reaches logs.
impl fmt::Debug for RuntimeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("package_scope", &self.package_scope)
            .field("package_prefix", &self.package_prefix)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("log_level", &self.log_level)
            .field("verify_webhooks", &self.verify_webhooks)
            .field("allowed_hosts", &self.allowed_hosts)
            .finish()
    }
}

/// The immutable configuration aggregate produced once per process.
///
/// Either every field is populated from an external source or construction
/// fails; a partially-populated value is never handed out. Changing
/// configuration requires a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub infra: InfraOutputs,
    pub settings: RuntimeSettings,
    /// When resolution completed. Diagnostics only.
    pub resolved_at: DateTime<Utc>,
    /// The stack reference resolution started from. Diagnostics only.
    pub stack_ref: StackRef,
    /// The secret reference resolution started from. Diagnostics only.
    pub secret_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_rejects_unknown_and_wrong_case() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("DEBUG".parse::<LogLevel>().is_err());
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn host_list_splits_and_trims() {
        assert_eq!(
            split_host_list("api.example.com, registry.example.com ,,"),
            vec!["api.example.com".to_string(), "registry.example.com".to_string()]
        );
        assert!(split_host_list("").is_empty());
    }

    #[test]
    fn debug_redacts_the_secret() {
        let settings = RuntimeSettings {
            tenant_id: "t-1".to_string(),
            client_id: "c-1".to_string(),
            client_secret: "hunter2".to_string(),
            app_id: "app-1".to_string(),
            package_scope: "shipit".to_string(),
            package_prefix: "svc".to_string(),
            api_base_url: Url::parse("https://api.example.com").unwrap(),
            log_level: LogLevel::Info,
            verify_webhooks: true,
            allowed_hosts: vec!["api.example.com".to_string()],
        };

        let printed = format!("{settings:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("t-1"));
    }
}
