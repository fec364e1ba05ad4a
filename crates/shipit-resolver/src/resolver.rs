//! The startup resolution pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{error, info};
use url::Url;

use shipit_config::schema::{RUNTIME_SECRET, coerce_bool, validate};
use shipit_core::resolved::{InfraOutputs, LogLevel, ResolvedConfig, RuntimeSettings, split_host_list};
use shipit_core::{ConfigError, ConfigResult, ErrorCategory, StackRef};

use crate::env::EnvInputs;
use crate::sources::{
    CATALOG_OUTPUT, DATABASE_OUTPUT, OutputField, QUEUE_OUTPUT, REQUIRED_OUTPUTS, SecretFetcher,
    StackDescriber,
};

/// How long each external call may take before resolution fails.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves the process configuration exactly once.
///
/// Construct one at startup, call [`Resolver::resolve`], and pass the result
/// down to whatever needs it; there is no global. A later call returns the
/// same value. Picking up changed configuration requires a restart.
///
/// No retries, no partial fallback: the first failure is the answer, raised
/// before the process serves any work.
pub struct Resolver {
    inputs: EnvInputs,
    describer: Arc<dyn StackDescriber>,
    secrets: Arc<dyn SecretFetcher>,
    fetch_timeout: Duration,
    resolved: OnceCell<Arc<ResolvedConfig>>,
}

impl Resolver {
    pub fn new(
        inputs: EnvInputs,
        describer: Arc<dyn StackDescriber>,
        secrets: Arc<dyn SecretFetcher>,
    ) -> Self {
        Self {
            inputs,
            describer,
            secrets,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            resolved: OnceCell::new(),
        }
    }

    /// Override the per-call timeout on the external fetches.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Resolve the configuration, or return the value already resolved in
    /// this process.
    pub async fn resolve(&self) -> ConfigResult<Arc<ResolvedConfig>> {
        let result = self
            .resolved
            .get_or_try_init(|| async { self.resolve_fresh().await.map(Arc::new) })
            .await
            .cloned();

        if let Err(err) = &result {
            error!(category = %err.category, report = %err.render(), "refusing to start with unresolved configuration");
        }
        result
    }

    async fn resolve_fresh(&self) -> ConfigResult<ResolvedConfig> {
        let stack: StackRef = self.inputs.stack_ref.parse()?;
        info!(stack = %stack, secret = %self.inputs.secret_ref, "resolving startup configuration");

        // Neither fetch depends on the other; issue both, then require both.
        let describe = timeout(self.fetch_timeout, self.describer.describe(&stack));
        let fetch = timeout(self.fetch_timeout, self.secrets.fetch(&self.inputs.secret_ref));
        let (outputs, payload) = tokio::join!(describe, fetch);

        let outputs = outputs
            .map_err(|_| timeout_error("infrastructure description service", self.fetch_timeout))??;
        let payload = payload.map_err(|_| timeout_error("secret store", self.fetch_timeout))??;

        let infra = extract_outputs(&stack, &outputs)?;
        let settings = build_settings(&self.inputs.secret_ref, payload)?;

        info!(
            database = %infra.database,
            queue = %infra.queue,
            catalog = %infra.catalog_endpoint,
            "startup configuration resolved"
        );

        Ok(ResolvedConfig {
            infra,
            settings,
            resolved_at: Utc::now(),
            stack_ref: stack,
            secret_ref: self.inputs.secret_ref.clone(),
        })
    }
}

fn timeout_error(service: &str, limit: Duration) -> ConfigError {
    ConfigError::new(
        ErrorCategory::ExternalServiceUnavailable,
        format!("{service} did not answer within {}s", limit.as_secs_f64()),
    )
    .with_suggestion("check network reachability and service health, then restart")
}

/// Pick every required logical output, failing with the complete missing set
/// and the acceptable names for each.
fn extract_outputs(
    stack: &StackRef,
    outputs: &HashMap<String, String>,
) -> ConfigResult<InfraOutputs> {
    if let (Some(database), Some(queue), Some(catalog_endpoint)) = (
        DATABASE_OUTPUT.pick(outputs),
        QUEUE_OUTPUT.pick(outputs),
        CATALOG_OUTPUT.pick(outputs),
    ) {
        return Ok(InfraOutputs {
            database: database.to_string(),
            queue: queue.to_string(),
            catalog_endpoint: catalog_endpoint.to_string(),
        });
    }

    let missing: Vec<&OutputField> = REQUIRED_OUTPUTS
        .iter()
        .filter(|field| field.pick(outputs).is_none())
        .collect();

    Err(ConfigError::new(
        ErrorCategory::MissingInfrastructureOutput,
        format!(
            "stack '{}' does not export {} required output(s)",
            stack.name,
            missing.len()
        ),
    )
    .with_details(
        missing
            .iter()
            .map(|field| format!("{}: any of [{}]", field.logical, field.alternates.join(", ")))
            .collect(),
    )
    .with_suggestion("update the stack template to export the missing outputs, then redeploy"))
}

/// Validate the secret payload against the closed schema and build the typed
/// settings. Every defect is reported in one pass.
fn build_settings(secret_ref: &str, payload: Value) -> ConfigResult<RuntimeSettings> {
    let Value::Object(fields) = payload else {
        return Err(ConfigError::new(
            ErrorCategory::MalformedSecretPayload,
            format!("secret '{secret_ref}' is not a JSON object"),
        )
        .with_suggestion("store the runtime parameters as a flat JSON object"));
    };

    let outcome = validate(&RUNTIME_SECRET, &fields);
    if !outcome.ok {
        let category = if !RUNTIME_SECRET.unknown_keys(&fields).is_empty() {
            ErrorCategory::UnknownSecretField
        } else if !RUNTIME_SECRET.missing_required(&fields).is_empty() {
            ErrorCategory::MissingSecretField
        } else {
            ErrorCategory::InvalidFieldValue
        };
        return Err(ConfigError::new(
            category,
            format!(
                "secret '{secret_ref}' does not satisfy schema '{}'",
                RUNTIME_SECRET.id
            ),
        )
        .with_details(outcome.errors)
        .with_suggestion("fix every listed field in the secret payload, then restart"));
    }

    Ok(RuntimeSettings {
        tenant_id: text(&fields, "tenant_id")?,
        client_id: text(&fields, "client_id")?,
        client_secret: text(&fields, "client_secret")?,
        app_id: text(&fields, "app_id")?,
        package_scope: text(&fields, "package_scope")?,
        package_prefix: text(&fields, "package_prefix")?,
        api_base_url: parse_url(&fields, "api_base_url")?,
        log_level: text(&fields, "log_level")?.parse::<LogLevel>()?,
        verify_webhooks: fields
            .get("verify_webhooks")
            .and_then(coerce_bool)
            .ok_or_else(|| field_error("verify_webhooks"))?,
        allowed_hosts: split_host_list(&text(&fields, "allowed_hosts")?),
    })
}

fn text(fields: &Map<String, Value>, name: &str) -> ConfigResult<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| field_error(name))
}

fn parse_url(fields: &Map<String, Value>, name: &str) -> ConfigResult<Url> {
    let raw = text(fields, name)?;
    Url::parse(&raw).map_err(|e| {
        ConfigError::new(
            ErrorCategory::InvalidFieldValue,
            format!("secret field '{name}' is not a valid URL: {e}"),
        )
    })
}

fn field_error(name: &str) -> ConfigError {
    ConfigError::new(
        ErrorCategory::InvalidFieldValue,
        format!("secret field '{name}' has an unusable value"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    const STACK: &str = "aws:cloudformation:us-east-1:123456789012:stack/shipit-dev/abc123";

    struct FakeDescriber(HashMap<String, String>);

    #[async_trait]
    impl StackDescriber for FakeDescriber {
        async fn describe(&self, _stack: &StackRef) -> ConfigResult<HashMap<String, String>> {
            Ok(self.0.clone())
        }
    }

    struct FakeSecrets(Value);

    #[async_trait]
    impl SecretFetcher for FakeSecrets {
        async fn fetch(&self, _secret_ref: &str) -> ConfigResult<Value> {
            Ok(self.0.clone())
        }
    }

    struct SlowSecrets;

    #[async_trait]
    impl SecretFetcher for SlowSecrets {
        async fn fetch(&self, _secret_ref: &str) -> ConfigResult<Value> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(json!({}))
        }
    }

    fn good_outputs() -> HashMap<String, String> {
        [
            ("Database".to_string(), "db1".to_string()),
            ("QueueArn".to_string(), "arn:x".to_string()),
            ("CatalogEndpoint".to_string(), "https://catalog.example.com".to_string()),
        ]
        .into_iter()
        .collect()
    }

    fn good_secret() -> Value {
        json!({
            "tenant_id": "t-1",
            "client_id": "c-1",
            "client_secret": "s3cr3t",
            "app_id": "app-1",
            "package_scope": "shipit",
            "package_prefix": "svc",
            "api_base_url": "https://api.example.com",
            "log_level": "info",
            "verify_webhooks": true,
            "allowed_hosts": "api.example.com,registry.example.com",
        })
    }

    fn resolver(outputs: HashMap<String, String>, secret: Value) -> Resolver {
        Resolver::new(
            EnvInputs::new(STACK, "shipit/dev/runtime"),
            Arc::new(FakeDescriber(outputs)),
            Arc::new(FakeSecrets(secret)),
        )
    }

    #[tokio::test]
    async fn happy_path_populates_every_field() {
        let config = resolver(good_outputs(), good_secret()).resolve().await.unwrap();

        assert_eq!(config.infra.database, "db1");
        assert_eq!(config.infra.queue, "arn:x");
        assert_eq!(config.infra.catalog_endpoint, "https://catalog.example.com");
        assert_eq!(config.settings.tenant_id, "t-1");
        assert_eq!(config.settings.log_level, LogLevel::Info);
        assert!(config.settings.verify_webhooks);
        assert_eq!(config.settings.allowed_hosts.len(), 2);
        assert_eq!(config.stack_ref.name, "shipit-dev");
        assert_eq!(config.secret_ref, "shipit/dev/runtime");
    }

    #[tokio::test]
    async fn resolution_happens_once_per_process() {
        let resolver = resolver(good_outputs(), good_secret());
        let first = resolver.resolve().await.unwrap();
        let second = resolver.resolve().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn alternate_output_names_satisfy_logical_fields() {
        let outputs: HashMap<String, String> = [
            ("TableName".to_string(), "db-legacy".to_string()),
            ("QueueUrl".to_string(), "https://q".to_string()),
            ("ApiEndpoint".to_string(), "https://api".to_string()),
        ]
        .into_iter()
        .collect();

        let config = resolver(outputs, good_secret()).resolve().await.unwrap();
        assert_eq!(config.infra.database, "db-legacy");
        assert_eq!(config.infra.queue, "https://q");
        assert_eq!(config.infra.catalog_endpoint, "https://api");
    }

    #[tokio::test]
    async fn missing_outputs_are_named_with_their_alternates() {
        let outputs: HashMap<String, String> =
            [("Database".to_string(), "db1".to_string())].into_iter().collect();

        let err = resolver(outputs, good_secret()).resolve().await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::MissingInfrastructureOutput);
        assert_eq!(err.details.len(), 2);
        assert!(err.details.iter().any(|d| d.contains("QueueArn") && d.contains("QueueUrl")));
        assert!(err.details.iter().any(|d| d.contains("CatalogEndpoint")));
    }

    #[tokio::test]
    async fn unknown_secret_key_is_rejected_by_name() {
        let mut secret = good_secret();
        secret["rotation_days"] = json!(30);

        let err = resolver(good_outputs(), secret).resolve().await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::UnknownSecretField);
        assert!(err.details.iter().any(|d| d.contains("rotation_days")));
    }

    #[tokio::test]
    async fn missing_secret_fields_are_listed_exactly() {
        let mut secret = good_secret();
        secret.as_object_mut().unwrap().remove("tenant_id");
        secret.as_object_mut().unwrap().remove("verify_webhooks");

        let err = resolver(good_outputs(), secret).resolve().await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::MissingSecretField);
        assert_eq!(err.details.len(), 2);
        assert!(err.details.iter().any(|d| d.starts_with("tenant_id")));
        assert!(err.details.iter().any(|d| d.starts_with("verify_webhooks")));
    }

    #[tokio::test]
    async fn invalid_secret_values_fail_without_defaults() {
        let mut secret = good_secret();
        secret["log_level"] = json!("loud");

        let err = resolver(good_outputs(), secret).resolve().await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::InvalidFieldValue);
        assert!(err.details.iter().any(|d| d.contains("log_level")));
    }

    #[tokio::test]
    async fn non_object_secret_payload_is_malformed() {
        let err = resolver(good_outputs(), json!(["not", "an", "object"]))
            .resolve()
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::MalformedSecretPayload);
    }

    #[tokio::test]
    async fn malformed_stack_reference_fails_before_any_fetch() {
        let resolver = Resolver::new(
            EnvInputs::new("just-a-name", "shipit/dev/runtime"),
            Arc::new(FakeDescriber(good_outputs())),
            Arc::new(FakeSecrets(good_secret())),
        );

        let err = resolver.resolve().await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::MalformedReference);
    }

    #[tokio::test]
    async fn slow_external_service_times_out_as_unavailable() {
        let resolver = Resolver::new(
            EnvInputs::new(STACK, "shipit/dev/runtime"),
            Arc::new(FakeDescriber(good_outputs())),
            Arc::new(SlowSecrets),
        )
        .with_fetch_timeout(Duration::from_millis(10));

        let err = resolver.resolve().await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::ExternalServiceUnavailable);
    }

    #[tokio::test]
    async fn string_boolean_forms_coerce_in_the_merge() {
        let mut secret = good_secret();
        secret["verify_webhooks"] = json!("0");

        let config = resolver(good_outputs(), secret).resolve().await.unwrap();
        assert!(!config.settings.verify_webhooks);
    }
}
