// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./lifeline.toml` > `~/.config/lifeline/lifeline.toml`
//! > `/etc/lifeline/lifeline.toml` with environment variable overrides via the
//! `LIFELINE_` prefix.

// figment::Error is external and cannot be boxed without a wrapper.
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LifelineConfig;

/// Sections that environment variables may address, as `LIFELINE_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &["app", "checkin", "pings", "sync", "storage"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/lifeline/lifeline.toml` (system-wide)
/// 3. `~/.config/lifeline/lifeline.toml` (user XDG config)
/// 4. `./lifeline.toml` (local directory)
/// 5. `LIFELINE_*` environment variables
pub fn load_config() -> Result<LifelineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<LifelineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LifelineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LifelineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LifelineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files in merge order, lowest precedence first. Missing files are
/// skipped by figment.
pub fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/lifeline/lifeline.toml")];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("lifeline").join("lifeline.toml"));
    }
    files.push(
        std::env::current_dir()
            .map(|d| d.join("lifeline.toml"))
            .unwrap_or_else(|_| PathBuf::from("lifeline.toml")),
    );
    files
}

/// The full layered figment: defaults, each of [`config_files`], then env.
pub fn build_figment() -> Figment {
    config_files()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(LifelineConfig::default())),
            |figment, file| figment.merge(Toml::file(file)),
        )
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys contain
/// underscores: `LIFELINE_SYNC_RETRY_MAX_ATTEMPTS` must map to
/// `sync.retry_max_attempts`, not `sync.retry.max.attempts`.
fn env_provider() -> Env {
    Env::prefixed("LIFELINE_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env key onto its dotted config path.
fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
