//! Harness configuration.
//!
//! The configuration is read from the environment exactly once at process
//! start and passed by reference from then on; no component reads ambient
//! state. Variable names match the original harness (`IMAGE`, `TAGS`,
//! `META_TAG`, `PORT`, `SSL`, `BASE`, `DELAY_START`, `ACCESS_KEY`,
//! `SECRET_KEY`), with additional knobs for per-stage timeouts and dry-run
//! mode.

use crate::errors::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default readiness marker emitted by s6-based images when init finishes.
pub const DEFAULT_READY_MARKER: &str = r"\[services\.d\] done\.";

/// The base distribution of the image under test, used to label the
/// software-inventory fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseDistro {
    /// Alpine-based image (`apk` package database).
    Alpine,
    /// Debian-based image (`apt` package database).
    Debian,
}

impl FromStr for BaseDistro {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alpine" => Ok(Self::Alpine),
            "debian" => Ok(Self::Debian),
            other => Err(ConfigError::InvalidValue {
                var: "BASE".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Credentials and location of the durable object store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Access key id.
    pub access_key: String,
    /// Secret access key. Never logged.
    pub secret_key: String,
    /// Region name (default `nyc3`).
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Endpoint URL, e.g. `https://nyc3.digitaloceanspaces.com`.
    pub endpoint: String,
}

/// Immutable harness configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Image repository, e.g. `linuxserver/heimdall`.
    pub image: String,
    /// Tags to validate, each with its own pipeline run.
    pub tags: Vec<String>,
    /// Build metadata tag used in artifact keys.
    pub meta_tag: String,
    /// Port the container's web interface listens on.
    pub port: u16,
    /// Whether the web interface serves TLS.
    pub tls: bool,
    /// Base distribution of the image.
    pub base: BaseDistro,

    /// Regex matched against container logs to detect readiness.
    pub ready_marker: String,
    /// Timeout for the container launch stage.
    pub launch_timeout: Duration,
    /// Timeout for the readiness-wait stage.
    pub readiness_timeout: Duration,
    /// Timeout for the log-capture stage.
    pub logs_timeout: Duration,

    /// Whether the screenshot stage is included at all.
    pub screenshot_enabled: bool,
    /// Settle delay before the screenshot is taken.
    pub screenshot_delay: Duration,
    /// Timeout for the screenshot stage.
    pub screenshot_timeout: Duration,

    /// Timeout for the software-inventory stage.
    pub sbom_timeout: Duration,

    /// Publish to a local directory instead of the remote store.
    pub dry_run: bool,
    /// Destination directory for dry-run publishing.
    pub dry_run_dir: PathBuf,

    /// Remote store settings; absent only in dry-run mode.
    pub storage: Option<StorageConfig>,
}

impl Config {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Exists so tests can supply variables without touching the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        let image = require("IMAGE")?;
        let meta_tag = require("META_TAG")?;
        let tags: Vec<String> = require("TAGS")?
            .split('|')
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "TAGS".to_string(),
                value: String::new(),
            });
        }

        let port = parse_var(&lookup, "PORT", None::<u16>)?;
        let tls = require("SSL")? == "true";
        let base = require("BASE")?.parse()?;

        let dry_run = lookup("DRY_RUN").as_deref() == Some("true");
        let storage = if dry_run {
            None
        } else {
            let region = lookup("S3_REGION").unwrap_or_else(|| "nyc3".to_string());
            let endpoint = lookup("S3_ENDPOINT")
                .unwrap_or_else(|| format!("https://{region}.digitaloceanspaces.com"));
            Some(StorageConfig {
                access_key: require("ACCESS_KEY")?,
                secret_key: require("SECRET_KEY")?,
                bucket: lookup("S3_BUCKET").unwrap_or_else(|| "ls-ci".to_string()),
                region,
                endpoint,
            })
        };

        Ok(Self {
            image,
            tags,
            meta_tag,
            port,
            tls,
            base,
            ready_marker: lookup("READY_MARKER")
                .unwrap_or_else(|| DEFAULT_READY_MARKER.to_string()),
            launch_timeout: duration_var(&lookup, "LAUNCH_TIMEOUT", 60)?,
            readiness_timeout: duration_var(&lookup, "READINESS_TIMEOUT", 120)?,
            logs_timeout: duration_var(&lookup, "LOGS_TIMEOUT", 30)?,
            screenshot_enabled: lookup("SCREENSHOT").as_deref() != Some("false"),
            screenshot_delay: duration_var(&lookup, "DELAY_START", 5)?,
            screenshot_timeout: duration_var(&lookup, "SCREENSHOT_TIMEOUT", 60)?,
            sbom_timeout: duration_var(&lookup, "SBOM_TIMEOUT", 120)?,
            dry_run,
            dry_run_dir: lookup("DRY_RUN_DIR")
                .map_or_else(|| PathBuf::from("output"), PathBuf::from),
            storage,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: key.to_string(),
            value: raw,
        }),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

fn duration_var<F>(lookup: &F, key: &str, default_secs: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, key, Some(default_secs)).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("IMAGE", "linuxserver/heimdall"),
            ("TAGS", "amd64-latest|arm64v8-latest"),
            ("META_TAG", "2.4.13"),
            ("PORT", "443"),
            ("SSL", "true"),
            ("BASE", "alpine"),
            ("ACCESS_KEY", "AKIATEST"),
            ("SECRET_KEY", "shhh"),
        ])
    }

    fn config_from(vars: &HashMap<&str, &str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).map(ToString::to_string))
    }

    #[test]
    fn parses_complete_environment() {
        let config = config_from(&base_vars()).unwrap();
        assert_eq!(config.image, "linuxserver/heimdall");
        assert_eq!(config.tags, vec!["amd64-latest", "arm64v8-latest"]);
        assert_eq!(config.port, 443);
        assert!(config.tls);
        assert_eq!(config.base, BaseDistro::Alpine);
        assert_eq!(config.readiness_timeout, Duration::from_secs(120));

        let storage = config.storage.unwrap();
        assert_eq!(storage.region, "nyc3");
        assert_eq!(storage.endpoint, "https://nyc3.digitaloceanspaces.com");
    }

    #[test]
    fn single_tag_without_separator() {
        let mut vars = base_vars();
        vars.insert("TAGS", "latest");
        let config = config_from(&vars).unwrap();
        assert_eq!(config.tags, vec!["latest"]);
    }

    #[test]
    fn missing_variable_is_named() {
        let mut vars = base_vars();
        vars.remove("IMAGE");
        let err = config_from(&vars).unwrap_err();
        assert_eq!(err.to_string(), "IMAGE is not set in the environment");
    }

    #[test]
    fn dry_run_does_not_require_credentials() {
        let mut vars = base_vars();
        vars.remove("ACCESS_KEY");
        vars.remove("SECRET_KEY");
        vars.insert("DRY_RUN", "true");
        let config = config_from(&vars).unwrap();
        assert!(config.dry_run);
        assert!(config.storage.is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut vars = base_vars();
        vars.insert("PORT", "not-a-port");
        let err = config_from(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "PORT"));
    }

    #[test]
    fn invalid_base_is_rejected() {
        let mut vars = base_vars();
        vars.insert("BASE", "gentoo");
        assert!(config_from(&vars).is_err());
    }

    #[test]
    fn screenshot_disabled_by_flag() {
        let mut vars = base_vars();
        vars.insert("SCREENSHOT", "false");
        let config = config_from(&vars).unwrap();
        assert!(!config.screenshot_enabled);
    }
}
