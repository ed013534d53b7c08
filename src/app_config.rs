//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use chomikbox_core::{Credentials, MAX_CONCURRENCY};

/// File configuration for chomikbox defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default account name.
    pub user: Option<String>,
    /// MD5 hash of the account password (32 hex chars).
    pub hash: Option<String>,
    /// Default destination directory.
    pub output_dir: Option<PathBuf>,
    /// Default extension allow-list.
    pub extensions: Option<Vec<String>>,
    /// Descend into subfolders by default.
    pub recursive: Option<bool>,
    /// Recreate remote folders by default.
    pub structure: Option<bool>,
    /// Replace existing files by default.
    pub overwrite: Option<bool>,
    /// Default simultaneous transfers (same range as CLI).
    pub concurrency: Option<u8>,
    /// Connect timeout in seconds for file downloads.
    pub connect_timeout_secs: Option<u64>,
    /// Read timeout in seconds for file downloads.
    pub read_timeout_secs: Option<u64>,
    /// Service endpoint override.
    pub service_url: Option<String>,
    /// Site root override.
    pub site_url: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=MAX_CONCURRENCY).contains(&usize::from(concurrency))
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: 1..={MAX_CONCURRENCY}"
            );
        }
        if let Some(hash) = &self.hash {
            Credentials::from_hash("config", hash)
                .map_err(|e| anyhow::anyhow!("Invalid config value for `hash`: {e}"))?;
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/chomikbox/config.toml`
/// 2. `$HOME/.config/chomikbox/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("chomikbox")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("chomikbox")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` or the default path, if present.
///
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = read_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(read_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn read_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = without_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let (key, value) = (key.trim(), value.trim());
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "user" => cfg.user = Some(quoted(value).with_context(context)?),
            "hash" => cfg.hash = Some(quoted(value).with_context(context)?),
            "output_dir" => cfg.output_dir = Some(quoted(value).with_context(context)?.into()),
            "extensions" => {
                cfg.extensions = Some(split_extensions(&quoted(value).with_context(context)?));
            }
            "service_url" => cfg.service_url = Some(quoted(value).with_context(context)?),
            "site_url" => cfg.site_url = Some(quoted(value).with_context(context)?),
            "recursive" => cfg.recursive = Some(scalar(value).with_context(context)?),
            "structure" => cfg.structure = Some(scalar(value).with_context(context)?),
            "overwrite" => cfg.overwrite = Some(scalar(value).with_context(context)?),
            "concurrency" => cfg.concurrency = Some(scalar(value).with_context(context)?),
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(scalar(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(scalar(value).with_context(context)?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Splits a comma-separated extension list, dropping blanks and leading dots.
#[must_use]
pub fn split_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cuts a line at the first `#` that is not inside a quoted value.
fn without_comment(line: &str) -> &str {
    let mut offset = 0;
    for (index, segment) in line.split('"').enumerate() {
        if index % 2 == 0
            && let Some(pos) = segment.find('#')
        {
            return &line[..offset + pos];
        }
        offset += segment.len() + 1;
    }
    line
}

fn quoted(value: &str) -> Result<String> {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .context("Expected double-quoted string")
}

/// Bare `true`/`false` or unsigned integer, parsed with `FromStr`.
fn scalar<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Unexpected value `{value}`"))
}
