//! Environment-driven configuration

use crate::error::{Error, Result};
use crate::retry::{
    RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_CRITICAL_ATTEMPTS, DEFAULT_MAX_ATTEMPTS,
};
use crate::types::{OperationContext, SpaceKind};
use std::{env, path::PathBuf, time::Duration};

/// Space used when none is configured
pub const DEFAULT_SPACE: &str = "tencent/Hunyuan3D-2";

/// Configuration for talking to a space and storing its output.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceConfig {
    /// Space id (`owner/name`) or base URL.
    pub space: String,
    /// Backend to assume when probing the space's endpoints fails.
    pub space_type: Option<SpaceKind>,
    /// Bearer token forwarded to the space and its file downloads.
    pub token: Option<String>,
    /// Working directory; debug snapshots go to `{work_dir}/debug`.
    pub work_dir: PathBuf,
    /// Directory the mesh and image artifacts are written to.
    pub assets_dir: PathBuf,
    pub retry: RetryPolicy,
    pub generation_retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        let work_dir = PathBuf::from(".");
        Self {
            space: DEFAULT_SPACE.to_string(),
            space_type: None,
            token: None,
            assets_dir: work_dir.join("assets"),
            work_dir,
            retry: RetryPolicy::default(),
            generation_retry: RetryPolicy::critical(),
            request_timeout: Duration::from_secs(600),
        }
    }
}

impl SpaceConfig {
    /// Loads `.env` if present, then reads the environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Builds a configuration from environment variables while falling back to
    /// the defaults above.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let space = get("SPACEMESH_SPACE").unwrap_or_else(|| DEFAULT_SPACE.to_string());
        let space_type = get("SPACEMESH_SPACE_TYPE")
            .map(|v| v.parse::<SpaceKind>().map_err(Error::Config))
            .transpose()?;
        let token = get("HF_TOKEN");
        let work_dir = get("SPACEMESH_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let assets_dir = get("SPACEMESH_ASSETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join("assets"));

        let max_retries = parse_number(&get, "SPACEMESH_MAX_RETRIES", DEFAULT_MAX_ATTEMPTS)?;
        let generation_retries = parse_number(
            &get,
            "SPACEMESH_GENERATION_RETRIES",
            DEFAULT_CRITICAL_ATTEMPTS,
        )?;
        let base_delay_ms = parse_number(&get, "SPACEMESH_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS)?;
        let timeout_secs = parse_number(&get, "SPACEMESH_TIMEOUT_SECS", 600u64)?;

        if max_retries == 0 || generation_retries == 0 {
            return Err(Error::Config("retry counts must be >= 1".to_string()));
        }
        if generation_retries < max_retries {
            tracing::warn!(
                "Generation retry ceiling ({}) is below the ordinary ceiling ({})",
                generation_retries,
                max_retries
            );
        }

        let base_delay = Duration::from_millis(base_delay_ms);
        Ok(Self {
            space,
            space_type,
            token,
            work_dir,
            assets_dir,
            retry: RetryPolicy::default()
                .with_max_attempts(max_retries)
                .with_base_delay(base_delay),
            generation_retry: RetryPolicy::critical()
                .with_max_attempts(generation_retries)
                .with_base_delay(base_delay),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Fresh context for one run of `tool_name` in the configured directories.
    pub fn operation_context(&self, tool_name: &str) -> OperationContext {
        OperationContext::new(tool_name, &self.work_dir, &self.assets_dir)
    }
}

fn parse_number<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", key, raw))),
        None => Ok(default),
    }
}
