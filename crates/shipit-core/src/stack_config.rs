//! Minimal configuration view handed to infrastructure provisioning.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::profile::Environment;

/// Identity of the application and its secret record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackIdentity {
    pub app_id: String,
    pub account_id: String,
    pub secret_name: String,
}

/// Endpoints discovered for the target infrastructure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackEndpoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<Url>,
}

/// Where the stack is deployed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackPlacement {
    pub region: String,
    pub environment: Environment,
}

/// Optional security knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackSecurity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_webhooks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,
}

/// The only configuration artifact provisioning code ever sees.
///
/// Derived from a profile by an explicit field allow-list and re-derivable at
/// any time; it owns no storage of its own. Wizard provenance and inheritance
/// pointers never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub identity: StackIdentity,
    pub endpoints: StackEndpoints,
    pub placement: StackPlacement,
    pub security: StackSecurity,
}
