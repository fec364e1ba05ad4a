//! Durable, profile-scoped persistence for tiered configuration.
//!
//! Layout: one directory per profile under the storage root, one JSON file
//! per tier (`user.json`, `derived.json`, `deploy.json`), and a `.bak` backup
//! beside each tier file holding the previous version.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shipit_core::profile::{
    DocumentMeta, FullProfile, INHERITS_FIELD, PROFILE_SCHEMA_VERSION, Tier, TierDocument,
};
use shipit_core::{ConfigError, ConfigResult, ErrorCategory};

use crate::schema::{PROFILE_USER, tier_schema, validate};

/// Longest supported inheritance chain, counting the starting profile.
pub const MAX_INHERITANCE_DEPTH: usize = 8;

static PROFILE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap());

/// Backup location for a tier file: the same path with `.bak` appended.
pub fn backup_path(target: &Path) -> PathBuf {
    target.with_extension("json.bak")
}

/// Filesystem-backed store for tiered profile configuration.
///
/// Writes are atomic: the payload lands in a uniquely-named temporary file,
/// the previous version is copied to the backup path, and the temporary file
/// is renamed over the target. A reader never observes a torn file.
pub struct ProfileStore {
    root: PathBuf,
    writer: String,
}

impl ProfileStore {
    /// Open a store rooted at `root`. The directory is created lazily on the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let writer = std::env::var("USER").unwrap_or_else(|_| "shipit".to_string());
        Self { root: root.into(), writer }
    }

    /// Override the writer identity stamped onto user-tier writes.
    pub fn with_writer(mut self, writer: impl Into<String>) -> Self {
        self.writer = writer.into();
        self
    }

    /// Whether at least one tier file is present and parseable for `profile`.
    pub fn exists(&self, profile: &str) -> bool {
        if !PROFILE_NAME_REGEX.is_match(profile) {
            return false;
        }
        Tier::ALL.iter().any(|tier| {
            fs::read_to_string(self.tier_path(profile, *tier))
                .ok()
                .is_some_and(|raw| serde_json::from_str::<TierDocument>(&raw).is_ok())
        })
    }

    /// Read one tier of a profile. Returns `Ok(None)` when the tier file does
    /// not exist.
    ///
    /// User-tier reads are strict: unparseable or invalid content is a
    /// `ProfileCorrupt` error, never silently treated as absent. Derived and
    /// deploy tiers are advisory and degrade to `Ok(None)` with a warning.
    pub fn read_tier(&self, tier: Tier, profile: &str) -> ConfigResult<Option<TierDocument>> {
        check_name(profile)?;
        let path = self.tier_path(profile, tier);

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if tier == Tier::User => {
                return Err(ConfigError::new(
                    ErrorCategory::ProfileCorrupt,
                    format!("cannot read user configuration for profile '{profile}': {e}"),
                )
                .with_detail(path.display().to_string()));
            }
            Err(e) => {
                warn!(profile, %tier, error = %e, "skipping unreadable advisory tier");
                return Ok(None);
            }
        };

        let doc = match serde_json::from_str::<TierDocument>(&raw) {
            Ok(doc) => doc,
            Err(e) if tier == Tier::User => {
                return Err(ConfigError::new(
                    ErrorCategory::ProfileCorrupt,
                    format!("user configuration for profile '{profile}' is not valid JSON: {e}"),
                )
                .with_detail(path.display().to_string())
                .with_suggestion(format!(
                    "restore the previous version from {}",
                    backup_path(&path).display()
                )));
            }
            Err(e) => {
                warn!(profile, %tier, error = %e, "skipping unparseable advisory tier");
                return Ok(None);
            }
        };

        let outcome = validate(tier_schema(tier), &doc.fields);
        if tier == Tier::User {
            if !outcome.ok {
                return Err(ConfigError::new(
                    ErrorCategory::ProfileCorrupt,
                    format!("user configuration for profile '{profile}' failed validation"),
                )
                .with_details(outcome.errors)
                .with_suggestion(format!(
                    "fix {} or restore the previous version from {}",
                    path.display(),
                    backup_path(&path).display()
                )));
            }
            for warning in outcome.warnings {
                warn!(profile, %warning, "ignoring unrecognized profile field");
            }
        } else {
            for finding in outcome.errors.into_iter().chain(outcome.warnings) {
                warn!(profile, %tier, %finding, "advisory tier field looks off");
            }
        }

        Ok(Some(doc))
    }

    /// Write one tier of a profile atomically. User-tier payloads are
    /// validated first and stamped with a metadata block recording the schema
    /// version, write time, and writer identity.
    pub fn write_tier(
        &self,
        tier: Tier,
        profile: &str,
        fields: Map<String, Value>,
    ) -> ConfigResult<()> {
        check_name(profile)?;

        let mut doc = TierDocument::from_fields(fields);
        if tier == Tier::User {
            let outcome = validate(&PROFILE_USER, &doc.fields);
            if !outcome.ok {
                return Err(ConfigError::new(
                    ErrorCategory::InvalidFieldValue,
                    format!("refusing to write invalid user configuration for profile '{profile}'"),
                )
                .with_details(outcome.errors));
            }
            for warning in outcome.warnings {
                warn!(profile, %warning, "writing unrecognized profile field");
            }
            doc.meta = Some(DocumentMeta {
                schema_version: PROFILE_SCHEMA_VERSION,
                written_at: Utc::now(),
                writer: self.writer.clone(),
            });
        }

        let target = self.tier_path(profile, tier);
        let dir = target.parent().expect("tier path has a parent");
        fs::create_dir_all(dir)
            .map_err(|e| storage_error(profile, tier, "create profile directory", e))?;

        let payload = serde_json::to_string_pretty(&doc).map_err(|e| {
            ConfigError::new(
                ErrorCategory::InvalidFieldValue,
                format!("cannot serialize {tier} configuration for profile '{profile}': {e}"),
            )
        })?;

        let tmp = target.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, format!("{payload}\n"))
            .map_err(|e| storage_error(profile, tier, "stage write", e))?;

        if target.exists() {
            if let Err(e) = fs::copy(&target, backup_path(&target)) {
                let _ = fs::remove_file(&tmp);
                return Err(storage_error(profile, tier, "back up previous version", e));
            }
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(storage_error(profile, tier, "commit write", e));
        }

        info!(profile, %tier, path = %target.display(), "wrote profile tier");
        Ok(())
    }

    /// Resolve a profile's user-tier configuration, defaulting unset fields
    /// from its inheritance chain. A profile's own fields always win over an
    /// ancestor's.
    ///
    /// The chain is walked iteratively with a visited list before any field
    /// is merged: a repeated name is an `InheritanceCycle` naming the loop,
    /// and the walk never exceeds [`MAX_INHERITANCE_DEPTH`] profiles.
    pub fn resolve_with_inheritance(&self, profile: &str) -> ConfigResult<TierDocument> {
        let mut visited: Vec<String> = Vec::new();
        let mut chain: Vec<TierDocument> = Vec::new();
        let mut current = profile.to_string();

        loop {
            if visited.iter().any(|seen| *seen == current) {
                return Err(ConfigError::new(
                    ErrorCategory::InheritanceCycle,
                    format!(
                        "profile inheritance loops: {} -> {current}",
                        visited.join(" -> ")
                    ),
                )
                .with_suggestion(format!(
                    "remove the '{INHERITS_FIELD}' pointer from one profile in the loop"
                )));
            }
            if visited.len() >= MAX_INHERITANCE_DEPTH {
                return Err(ConfigError::new(
                    ErrorCategory::InheritanceCycle,
                    format!(
                        "profile inheritance chain starting at '{profile}' exceeds {MAX_INHERITANCE_DEPTH} links"
                    ),
                )
                .with_detail(visited.join(" -> ")));
            }

            let doc = self.read_tier(Tier::User, &current)?.ok_or_else(|| {
                let mut err = ConfigError::new(
                    ErrorCategory::ProfileNotFound,
                    format!("profile '{current}' has no user configuration"),
                );
                if let Some(child) = visited.last() {
                    err = err.with_detail(format!("inherited by profile '{child}'"));
                } else {
                    err = err.with_suggestion("run the setup wizard to create it");
                }
                err
            })?;

            visited.push(current.clone());
            let next = doc.inherits().map(str::to_string);
            chain.push(doc);

            match next {
                Some(parent) => current = parent,
                None => break,
            }
        }

        // Field-level union, nearest profile first so its fields win.
        let mut merged = Map::new();
        for doc in chain {
            for (key, value) in doc.fields {
                if key == INHERITS_FIELD {
                    continue;
                }
                merged.entry(key).or_insert(value);
            }
        }

        debug!(profile, chain = ?visited, "resolved profile inheritance");
        Ok(TierDocument::from_fields(merged))
    }

    /// Assemble the full view of a profile for projection:
    /// inheritance-resolved user fields plus this profile's own derived and
    /// deploy records. Missing advisory tiers resolve to empty records.
    pub fn load_full(&self, profile: &str) -> ConfigResult<FullProfile> {
        let user = self.resolve_with_inheritance(profile)?;
        let derived = self.read_tier(Tier::Derived, profile)?.unwrap_or_default();
        let deploy = self.read_tier(Tier::Deploy, profile)?.unwrap_or_default();
        Ok(FullProfile {
            name: profile.to_string(),
            user,
            derived,
            deploy,
        })
    }

    /// Enumerate profile names known to the storage root, sorted.
    pub fn list_profiles(&self) -> ConfigResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ConfigError::new(
                    ErrorCategory::ProfileCorrupt,
                    format!("cannot enumerate profiles under {}: {e}", self.root.display()),
                ));
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ConfigError::new(
                    ErrorCategory::ProfileCorrupt,
                    format!("cannot enumerate profiles under {}: {e}", self.root.display()),
                )
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir
                && PROFILE_NAME_REGEX.is_match(&name)
                && Tier::ALL
                    .iter()
                    .any(|tier| self.tier_path(&name, *tier).exists())
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn tier_path(&self, profile: &str, tier: Tier) -> PathBuf {
        self.root.join(profile).join(tier.file_name())
    }
}

fn check_name(profile: &str) -> ConfigResult<()> {
    if PROFILE_NAME_REGEX.is_match(profile) {
        Ok(())
    } else {
        Err(ConfigError::new(
            ErrorCategory::InvalidFieldValue,
            format!("'{profile}' is not a valid profile name"),
        )
        .with_suggestion(
            "profile names use letters, digits, '-' and '_', and start with a letter or digit",
        ))
    }
}

fn storage_error(profile: &str, tier: Tier, action: &str, e: std::io::Error) -> ConfigError {
    ConfigError::new(
        ErrorCategory::ProfileCorrupt,
        format!("cannot {action} for profile '{profile}' tier '{tier}': {e}"),
    )
}
