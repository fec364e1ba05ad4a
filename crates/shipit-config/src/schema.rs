//! Named schemas and the collect-all validator.
//!
//! Validation is a pure function over a field map: every defect in the
//! payload is reported in one pass, never just the first. Errors block
//! progress; warnings do not.

use serde_json::{Map, Value};
use shipit_core::profile::{Environment, Tier};
use shipit_core::resolved::LogLevel;
use shipit_core::stack_ref::{STACK_REF_FORMAT, StackRef};
use url::Url;

/// Outcome of one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Value type a field must satisfy.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Non-empty string.
    Text,
    /// Native boolean or one of "true"/"false"/"1"/"0", any case.
    Bool,
    /// One of a fixed set of strings, matched case-sensitively.
    Enum(&'static [&'static str]),
    /// Absolute URL.
    Url,
    /// Compound stack reference.
    StackRef,
}

/// One field of a named schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// A named schema. Closed schemas reject unknown keys; open schemas surface
/// them as warnings.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub id: &'static str,
    pub closed: bool,
    pub fields: &'static [FieldSpec],
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind, required: true }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind, required: false }
}

/// The closed runtime-secret payload schema: ten required keys, nothing else.
pub static RUNTIME_SECRET: Schema = Schema {
    id: "runtime-secret",
    closed: true,
    fields: &[
        required("tenant_id", FieldKind::Text),
        required("client_id", FieldKind::Text),
        required("client_secret", FieldKind::Text),
        required("app_id", FieldKind::Text),
        required("package_scope", FieldKind::Text),
        required("package_prefix", FieldKind::Text),
        required("api_base_url", FieldKind::Url),
        required("log_level", FieldKind::Enum(&LogLevel::ALLOWED)),
        required("verify_webhooks", FieldKind::Bool),
        required("allowed_hosts", FieldKind::Text),
    ],
};

/// The user-tier profile schema. Fields are optional per file because
/// inheritance may supply them; formats are still enforced when present.
pub static PROFILE_USER: Schema = Schema {
    id: "profile-user",
    closed: false,
    fields: &[
        optional("inherits", FieldKind::Text),
        optional("app_id", FieldKind::Text),
        optional("account_id", FieldKind::Text),
        optional("secret_name", FieldKind::Text),
        optional("region", FieldKind::Text),
        optional("environment", FieldKind::Enum(&Environment::ALLOWED)),
        optional("package_scope", FieldKind::Text),
        optional("package_prefix", FieldKind::Text),
        optional("verify_webhooks", FieldKind::Bool),
        optional("allowed_hosts", FieldKind::Text),
        optional("setup_source", FieldKind::Text),
    ],
};

/// Advisory fields recorded by discovery.
pub static PROFILE_DERIVED: Schema = Schema {
    id: "profile-derived",
    closed: false,
    fields: &[
        optional("catalog_url", FieldKind::Url),
        optional("api_endpoint", FieldKind::Url),
        optional("queue_url", FieldKind::Text),
    ],
};

/// Facts recorded after a successful provisioning action.
pub static PROFILE_DEPLOY: Schema = Schema {
    id: "profile-deploy",
    closed: false,
    fields: &[
        optional("deployment_id", FieldKind::Text),
        optional("stack_ref", FieldKind::StackRef),
        optional("service_url", FieldKind::Url),
        optional("deployed_at", FieldKind::Text),
    ],
};

/// Look up a schema by id.
pub fn schema(id: &str) -> Option<&'static Schema> {
    [&RUNTIME_SECRET, &PROFILE_USER, &PROFILE_DERIVED, &PROFILE_DEPLOY]
        .into_iter()
        .find(|s| s.id == id)
}

/// Schema applied when reading a tier file.
pub fn tier_schema(tier: Tier) -> &'static Schema {
    match tier {
        Tier::User => &PROFILE_USER,
        Tier::Derived => &PROFILE_DERIVED,
        Tier::Deploy => &PROFILE_DEPLOY,
    }
}

impl Schema {
    /// Required fields absent from the payload, in schema order.
    pub fn missing_required(&self, payload: &Map<String, Value>) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|spec| spec.required && !payload.contains_key(spec.name))
            .map(|spec| spec.name)
            .collect()
    }

    /// Payload keys this schema does not declare, in payload order.
    pub fn unknown_keys(&self, payload: &Map<String, Value>) -> Vec<String> {
        payload
            .keys()
            .filter(|key| !self.fields.iter().any(|spec| spec.name == key.as_str()))
            .cloned()
            .collect()
    }
}

/// Validate a payload against a schema, reporting every defect in one pass.
pub fn validate(schema: &Schema, payload: &Map<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for name in schema.missing_required(payload) {
        errors.push(format!("{name}: required field is missing"));
    }

    for spec in schema.fields {
        let Some(value) = payload.get(spec.name) else {
            continue;
        };
        if let Err(problem) = check_kind(spec.kind, value) {
            errors.push(format!("{}: {problem}", spec.name));
        }
    }

    for key in schema.unknown_keys(payload) {
        if schema.closed {
            errors.push(format!(
                "{key}: unknown field not allowed by schema '{}'",
                schema.id
            ));
        } else {
            warnings.push(format!(
                "{key}: not a recognized field of schema '{}'",
                schema.id
            ));
        }
    }

    ValidationResult {
        ok: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Lenient boolean coercion shared by the validator, the projector, and the
/// resolver merge. Anything outside the canonical set is rejected.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn check_kind(kind: FieldKind, value: &Value) -> Result<(), String> {
    match kind {
        FieldKind::Text => match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(()),
            Some(_) => Err("must not be empty".to_string()),
            None => Err(format!("expected a string, got {}", type_name(value))),
        },
        FieldKind::Bool => match coerce_bool(value) {
            Some(_) => Ok(()),
            None => Err(format!(
                "expected a boolean or one of \"true\"/\"false\"/\"1\"/\"0\", got {value}"
            )),
        },
        FieldKind::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => Ok(()),
            Some(s) => Err(format!("'{s}' is not one of [{}]", allowed.join(", "))),
            None => Err(format!("expected a string, got {}", type_name(value))),
        },
        FieldKind::Url => match value.as_str() {
            Some(s) => Url::parse(s)
                .map(|_| ())
                .map_err(|e| format!("'{s}' is not a valid URL: {e}")),
            None => Err(format!("expected a URL string, got {}", type_name(value))),
        },
        FieldKind::StackRef => match value.as_str() {
            Some(s) if StackRef::matches(s) => Ok(()),
            Some(s) => Err(format!("'{s}' does not match {STACK_REF_FORMAT}")),
            None => Err(format!(
                "expected a stack reference string, got {}",
                type_name(value)
            )),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret_payload() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "tenant_id": "t-1",
            "client_id": "c-1",
            "client_secret": "s3cr3t",
            "app_id": "app-1",
            "package_scope": "shipit",
            "package_prefix": "svc",
            "api_base_url": "https://api.example.com",
            "log_level": "info",
            "verify_webhooks": "true",
            "allowed_hosts": "api.example.com,registry.example.com",
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn complete_secret_payload_passes() {
        let outcome = validate(&RUNTIME_SECRET, &secret_payload());
        assert!(outcome.ok, "unexpected errors: {:?}", outcome.errors);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn missing_fields_are_all_reported_in_one_pass() {
        let mut payload = secret_payload();
        payload.remove("tenant_id");
        payload.remove("log_level");
        payload.remove("allowed_hosts");

        let outcome = validate(&RUNTIME_SECRET, &payload);
        assert!(!outcome.ok);
        assert_eq!(
            RUNTIME_SECRET.missing_required(&payload),
            vec!["tenant_id", "log_level", "allowed_hosts"]
        );
        assert_eq!(outcome.errors.len(), 3);
        for field in ["tenant_id", "log_level", "allowed_hosts"] {
            assert!(
                outcome.errors.iter().any(|e| e.starts_with(field)),
                "missing error for {field}: {:?}",
                outcome.errors
            );
        }
    }

    #[test]
    fn unknown_key_fails_a_closed_schema() {
        let mut payload = secret_payload();
        payload.insert("rotation_days".to_string(), json!(30));

        let outcome = validate(&RUNTIME_SECRET, &payload);
        assert!(!outcome.ok);
        assert!(outcome.errors.iter().any(|e| e.contains("rotation_days")));
        assert_eq!(RUNTIME_SECRET.unknown_keys(&payload), vec!["rotation_days"]);
    }

    #[test]
    fn unknown_key_only_warns_on_an_open_schema() {
        let Value::Object(payload) = json!({"region": "us-east-1", "color": "teal"}) else {
            unreachable!()
        };
        let outcome = validate(&PROFILE_USER, &payload);
        assert!(outcome.ok);
        assert!(outcome.warnings.iter().any(|w| w.contains("color")));
    }

    #[test]
    fn invalid_values_collect_alongside_missing_ones() {
        let mut payload = secret_payload();
        payload.remove("client_id");
        payload.insert("log_level".to_string(), json!("verbose"));
        payload.insert("verify_webhooks".to_string(), json!("yes"));
        payload.insert("api_base_url".to_string(), json!("not a url"));

        let outcome = validate(&RUNTIME_SECRET, &payload);
        assert_eq!(outcome.errors.len(), 4);
    }

    #[test]
    fn enum_membership_is_case_sensitive() {
        let mut payload = secret_payload();
        payload.insert("log_level".to_string(), json!("INFO"));
        assert!(!validate(&RUNTIME_SECRET, &payload).ok);
    }

    #[test]
    fn bool_coercion_accepts_canonical_forms_and_is_idempotent() {
        for raw in [
            json!(true),
            json!(false),
            json!("true"),
            json!("False"),
            json!("TRUE"),
            json!("1"),
            json!("0"),
        ] {
            let first = coerce_bool(&raw).expect("canonical form accepted");
            assert_eq!(coerce_bool(&Value::Bool(first)), Some(first));
        }
        for raw in [json!("yes"), json!("no"), json!(1), json!(0), json!(null), json!([true])] {
            assert_eq!(coerce_bool(&raw), None);
        }
    }

    #[test]
    fn stack_ref_fields_are_format_checked() {
        let Value::Object(payload) = json!({
            "stack_ref": "aws:cloudformation:us-east-1:123456789012:stack/shipit-dev/abc123",
        }) else {
            unreachable!()
        };
        assert!(validate(&PROFILE_DEPLOY, &payload).ok);

        let Value::Object(bad) = json!({"stack_ref": "just-a-name"}) else {
            unreachable!()
        };
        assert!(!validate(&PROFILE_DEPLOY, &bad).ok);
    }

    #[test]
    fn schema_lookup_by_id() {
        assert!(schema("runtime-secret").is_some());
        assert!(schema("profile-user").is_some());
        assert!(schema("nope").is_none());
    }
}
