//! Projection of a full profile into the minimal provisioning view.

use serde_json::Value;
use tracing::warn;
use url::Url;

use shipit_core::profile::{Environment, FullProfile, Tier};
use shipit_core::resolved::split_host_list;
use shipit_core::stack_config::{
    StackConfig, StackEndpoints, StackIdentity, StackPlacement, StackSecurity,
};
use shipit_core::{ConfigError, ConfigResult, ErrorCategory};

use crate::schema::coerce_bool;

/// The fields a projection may read, and the only fields it may read. A newly
/// added profile field stays out of the stack view until it is added here.
pub const STACK_ALLOW_LIST: &[(Tier, &str)] = &[
    (Tier::User, "app_id"),
    (Tier::User, "account_id"),
    (Tier::User, "secret_name"),
    (Tier::User, "region"),
    (Tier::User, "environment"),
    (Tier::User, "verify_webhooks"),
    (Tier::User, "allowed_hosts"),
    (Tier::Derived, "catalog_url"),
    (Tier::Derived, "api_endpoint"),
];

/// Derive the provisioning view from a full profile.
///
/// Pure over its input. Required target fields with no source value fail as
/// one `ProjectionFieldMissing` listing every gap; they are never silently
/// omitted.
pub fn project(profile: &FullProfile) -> ConfigResult<StackConfig> {
    let mut missing: Vec<String> = Vec::new();

    let app_id = require_text(profile, "app_id", &mut missing);
    let account_id = require_text(profile, "account_id", &mut missing);
    let secret_name = require_text(profile, "secret_name", &mut missing);
    let region = require_text(profile, "region", &mut missing);

    let environment = match require_text(profile, "environment", &mut missing) {
        Some(raw) => Some(raw.parse::<Environment>().map_err(|e| {
            e.with_detail(format!("profile '{}' field 'environment'", profile.name))
        })?),
        None => None,
    };

    let verify_webhooks = match allowed(profile, Tier::User, "verify_webhooks") {
        Some(value) => match coerce_bool(value) {
            Some(flag) => Some(flag),
            None => {
                return Err(ConfigError::new(
                    ErrorCategory::InvalidFieldValue,
                    format!(
                        "profile '{}' field 'verify_webhooks' is not a boolean",
                        profile.name
                    ),
                ));
            }
        },
        None => None,
    };

    let allowed_hosts = allowed(profile, Tier::User, "allowed_hosts")
        .and_then(Value::as_str)
        .map(split_host_list);

    let catalog_url = advisory_url(profile, "catalog_url");
    let api_endpoint = advisory_url(profile, "api_endpoint");

    if let (Some(app_id), Some(account_id), Some(secret_name), Some(region), Some(environment)) =
        (app_id, account_id, secret_name, region, environment)
    {
        return Ok(StackConfig {
            identity: StackIdentity {
                app_id: app_id.to_string(),
                account_id: account_id.to_string(),
                secret_name: secret_name.to_string(),
            },
            endpoints: StackEndpoints {
                catalog_url,
                api_endpoint,
            },
            placement: StackPlacement {
                region: region.to_string(),
                environment,
            },
            security: StackSecurity {
                verify_webhooks,
                allowed_hosts,
            },
        });
    }

    Err(ConfigError::new(
        ErrorCategory::ProjectionFieldMissing,
        format!(
            "profile '{}' is missing {} field(s) required for provisioning",
            profile.name,
            missing.len()
        ),
    )
    .with_details(
        missing
            .iter()
            .map(|field| format!("{field} has no value in the profile or its inheritance chain"))
            .collect(),
    )
    .with_suggestion("set the missing fields on the profile or one of its parents"))
}

/// Read an allow-listed field from its tier. Any field read through here must
/// appear in [`STACK_ALLOW_LIST`].
fn allowed<'a>(profile: &'a FullProfile, tier: Tier, field: &'static str) -> Option<&'a Value> {
    debug_assert!(
        STACK_ALLOW_LIST.contains(&(tier, field)),
        "field '{field}' is not allow-listed for projection"
    );
    let doc = match tier {
        Tier::User => &profile.user,
        Tier::Derived => &profile.derived,
        Tier::Deploy => &profile.deploy,
    };
    doc.fields.get(field)
}

fn require_text<'a>(
    profile: &'a FullProfile,
    field: &'static str,
    missing: &mut Vec<String>,
) -> Option<&'a str> {
    match allowed(profile, Tier::User, field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Some(s),
        _ => {
            missing.push(field.to_string());
            None
        }
    }
}

fn advisory_url(profile: &FullProfile, field: &'static str) -> Option<Url> {
    let raw = allowed(profile, Tier::Derived, field)?.as_str()?;
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(profile = %profile.name, field, error = %e, "ignoring advisory endpoint that is not a URL");
            None
        }
    }
}
