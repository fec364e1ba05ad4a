//! External service boundaries for startup resolution.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use shipit_core::{ConfigResult, StackRef};

/// Reports the exported outputs of a deployed infrastructure stack.
#[async_trait]
pub trait StackDescriber: Send + Sync {
    /// Fetch the stack's named output map.
    async fn describe(&self, stack: &StackRef) -> ConfigResult<HashMap<String, String>>;
}

/// Retrieves a secret payload by reference.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    /// Fetch the raw payload stored under `secret_ref`.
    async fn fetch(&self, secret_ref: &str) -> ConfigResult<Value>;
}

/// A logical infrastructure field and the output names that satisfy it, in
/// priority order. The first present name wins; a stack exporting several
/// alternates at once is fine (templates commonly do mid-migration).
#[derive(Debug, Clone, Copy)]
pub struct OutputField {
    pub logical: &'static str,
    pub alternates: &'static [&'static str],
}

impl OutputField {
    /// First alternate present in `outputs`, by priority.
    pub fn pick<'a>(&self, outputs: &'a HashMap<String, String>) -> Option<&'a str> {
        self.alternates
            .iter()
            .find_map(|name| outputs.get(*name).map(String::as_str))
    }
}

pub const DATABASE_OUTPUT: OutputField = OutputField {
    logical: "database",
    alternates: &["Database", "DatabaseName", "TableName"],
};

pub const QUEUE_OUTPUT: OutputField = OutputField {
    logical: "queue",
    alternates: &["QueueArn", "QueueUrl"],
};

pub const CATALOG_OUTPUT: OutputField = OutputField {
    logical: "catalog endpoint",
    alternates: &["CatalogEndpoint", "CatalogUrl", "ApiEndpoint"],
};

/// Outputs every resolved stack must export.
pub const REQUIRED_OUTPUTS: &[OutputField] = &[DATABASE_OUTPUT, QUEUE_OUTPUT, CATALOG_OUTPUT];
