//! Compound stack reference parsing.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ErrorCategory};

/// Expected shape of a stack reference, quoted in diagnostics.
pub const STACK_REF_FORMAT: &str = "<provider>:<service>:<region>:<account>:stack/<name>/<id>";

static STACK_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-z][a-z0-9-]*):([a-z][a-z0-9-]*):([a-z0-9-]+):([0-9]{6,16}):stack/([A-Za-z][A-Za-z0-9-]*)/([A-Za-z0-9-]+)$",
    )
    .unwrap()
});

/// A parsed reference to a deployed infrastructure stack, e.g.
/// `aws:cloudformation:us-east-1:123456789012:stack/shipit-prod/1f9e2ab0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRef {
    pub provider: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub name: String,
    pub id: String,
}

impl StackRef {
    /// Check a candidate against the structural pattern without building one.
    /// No semantic verification against the remote system is attempted.
    pub fn matches(raw: &str) -> bool {
        STACK_REF_REGEX.is_match(raw)
    }
}

impl FromStr for StackRef {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let caps = STACK_REF_REGEX.captures(raw).ok_or_else(|| {
            ConfigError::new(
                ErrorCategory::MalformedReference,
                format!("stack reference '{raw}' does not match the expected format"),
            )
            .with_suggestion(format!("expected {STACK_REF_FORMAT}"))
        })?;

        Ok(Self {
            provider: caps[1].to_string(),
            service: caps[2].to_string(),
            region: caps[3].to_string(),
            account: caps[4].to_string(),
            name: caps[5].to_string(),
            id: caps[6].to_string(),
        })
    }
}

impl std::fmt::Display for StackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:stack/{}/{}",
            self.provider, self.service, self.region, self.account, self.name, self.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "aws:cloudformation:us-east-1:123456789012:stack/shipit-prod/1f9e2ab0";

    #[test]
    fn parse_extracts_components() {
        let stack: StackRef = GOOD.parse().unwrap();
        assert_eq!(stack.provider, "aws");
        assert_eq!(stack.service, "cloudformation");
        assert_eq!(stack.region, "us-east-1");
        assert_eq!(stack.account, "123456789012");
        assert_eq!(stack.name, "shipit-prod");
        assert_eq!(stack.id, "1f9e2ab0");
    }

    #[test]
    fn display_roundtrips() {
        let stack: StackRef = GOOD.parse().unwrap();
        assert_eq!(stack.to_string(), GOOD);
    }

    #[test]
    fn rejects_malformed_references() {
        for raw in [
            "",
            "aws:cloudformation:us-east-1:123456789012",
            "aws:cloudformation:us-east-1:not-an-account:stack/x/1",
            "aws:cloudformation:us-east-1:123456789012:queue/x/1",
            "AWS:cloudformation:us-east-1:123456789012:stack/x/1",
        ] {
            let err = raw.parse::<StackRef>().unwrap_err();
            assert_eq!(err.category, ErrorCategory::MalformedReference);
            assert!(err.suggestions[0].contains(STACK_REF_FORMAT));
        }
    }
}
