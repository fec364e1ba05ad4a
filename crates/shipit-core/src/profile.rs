//! Profile tiers and the persisted document format.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConfigError, ErrorCategory};

/// Current version of the persisted profile document format.
pub const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Field carrying a profile's inheritance pointer.
pub const INHERITS_FIELD: &str = "inherits";

/// Configuration provenance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Hand-entered or wizard-collected values.
    #[display("user")]
    User,
    /// Values inferred from external discovery; advisory only.
    #[display("derived")]
    Derived,
    /// Facts recorded after a successful provisioning action.
    #[display("deploy")]
    Deploy,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::User, Tier::Derived, Tier::Deploy];

    /// File name of this tier inside a profile directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Tier::User => "user.json",
            Tier::Derived => "derived.json",
            Tier::Deploy => "deploy.json",
        }
    }
}

/// Metadata block stamped onto user-tier writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub schema_version: u32,
    pub written_at: DateTime<Utc>,
    pub writer: String,
}

/// One persisted tier file: a flat field map plus an optional metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierDocument {
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<DocumentMeta>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TierDocument {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { meta: None, fields }
    }

    /// String view of a field, if present and string-typed.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// The inheritance pointer, if declared.
    pub fn inherits(&self) -> Option<&str> {
        self.get_str(INHERITS_FIELD)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Deployment environment a profile targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[display("dev")]
    Dev,
    #[display("staging")]
    Staging,
    #[display("prod")]
    Prod,
}

impl Environment {
    /// Accepted textual forms, matched case-sensitively.
    pub const ALLOWED: [&'static str; 3] = ["dev", "staging", "prod"];
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::new(
                ErrorCategory::InvalidFieldValue,
                format!("'{other}' is not a valid environment"),
            )
            .with_suggestion(format!("use one of [{}]", Environment::ALLOWED.join(", ")))),
        }
    }
}

/// A profile's three tiers assembled for projection. User fields are already
/// inheritance-resolved; derived and deploy are this profile's own records.
#[derive(Debug, Clone)]
pub struct FullProfile {
    pub name: String,
    pub user: TierDocument,
    pub derived: TierDocument,
    pub deploy: TierDocument,
}
