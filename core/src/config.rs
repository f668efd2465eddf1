//! Configuration loading and validation for the warden service
//!
//! This module parses an optional TOML file into `schema::ServiceConfig`,
//! relies on serde defaults for every missing key, applies environment
//! overrides, and validates the result with field-path error messages.

use crate::{CoreError, Result};
use schema::ServiceConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Overrides the kill-switch socket path
pub const ENV_KILL_SOCKET: &str = "WARDEN_KILL_SOCKET";
/// Overrides the diagnostics log file
pub const ENV_LOG_FILE: &str = "WARDEN_LOG_FILE";
/// Overrides the worker executable
pub const ENV_WORKER_COMMAND: &str = "WARDEN_WORKER_COMMAND";

/// Load service config from a TOML file path
pub fn load_service_config_from_toml_path(path: impl AsRef<Path>) -> Result<ServiceConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_service_config_from_toml_str(&data)
}

/// Load service config from a TOML string
pub fn load_service_config_from_toml_str(input: &str) -> Result<ServiceConfig> {
    let cfg: ServiceConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate the configuration and return `Result<()>` with field-path errors
pub fn validate(cfg: &ServiceConfig) -> Result<()> {
    fn non_empty(field: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "{}: cannot be empty",
                field
            )));
        }
        Ok(())
    }

    non_empty("serviceName", &cfg.service_name)?;
    non_empty("workerProcessName", &cfg.worker_process_name)?;
    non_empty("channelName", &cfg.channel_name)?;
    non_empty("logLevel", &cfg.log_level)?;

    if cfg.channel_name.contains(['/', '\\']) {
        return Err(CoreError::ValidationError(
            "channelName: must not contain path separators".to_string(),
        ));
    }
    if cfg.socket_path.as_os_str().is_empty() {
        return Err(CoreError::ValidationError(
            "socketPath: cannot be empty".to_string(),
        ));
    }
    if cfg.log_file.as_os_str().is_empty() || cfg.log_file.file_name().is_none() {
        return Err(CoreError::ValidationError(
            "logFile: must name a file".to_string(),
        ));
    }
    if let Some(cmd) = &cfg.worker_command {
        non_empty("workerCommand", cmd)?;
    }
    if cfg.backoff_millis == 0 {
        return Err(CoreError::ValidationError(
            "backoffMillis: must be > 0".to_string(),
        ));
    }
    if cfg.stop_timeout_secs == 0 {
        return Err(CoreError::ValidationError(
            "stopTimeoutSecs: must be > 0".to_string(),
        ));
    }
    if cfg.worker_exit_timeout_secs == 0 {
        return Err(CoreError::ValidationError(
            "workerExitTimeoutSecs: must be > 0".to_string(),
        ));
    }
    if cfg.worker_exit_timeout_secs >= cfg.stop_timeout_secs {
        return Err(CoreError::ValidationError(format!(
            "workerExitTimeoutSecs: must be less than stopTimeoutSecs ({})",
            cfg.stop_timeout_secs
        )));
    }
    Ok(())
}

/// Apply environment overrides using `lookup` to read variables
///
/// Empty values are ignored.
pub fn apply_overrides_from<F>(cfg: &mut ServiceConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(socket) = get(ENV_KILL_SOCKET) {
        debug!("{} overrides socketPath", ENV_KILL_SOCKET);
        cfg.socket_path = PathBuf::from(socket);
    }
    if let Some(log_file) = get(ENV_LOG_FILE) {
        debug!("{} overrides logFile", ENV_LOG_FILE);
        cfg.log_file = PathBuf::from(log_file);
    }
    if let Some(command) = get(ENV_WORKER_COMMAND) {
        debug!("{} overrides workerCommand", ENV_WORKER_COMMAND);
        cfg.worker_command = Some(command);
    }
}

/// Load the config file if given, apply process environment overrides,
/// and validate the result
pub fn resolve_service_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut cfg = match path {
        Some(path) => load_service_config_from_toml_path(path)?,
        None => ServiceConfig::default(),
    };
    apply_overrides_from(&mut cfg, |key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}
