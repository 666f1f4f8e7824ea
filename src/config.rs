//! Engine configuration.
//!
//! Every field here defaults to the literal constants the design calls
//! for, so a submission run with no config file present behaves exactly
//! as spec'd. An operator can override any of them via a small TOML file
//! (`judge-core.toml` at the repo root, see [`load_config`]) without a
//! rebuild — useful for retargeting the sandbox image, or loosening the
//! test timeout on slower hardware.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tunable knobs for the execution pipeline.
///
/// # Example
///
/// ```
/// use judge_core::config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.cpus, 1);
/// assert_eq!(config.memory_mb, 512);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Container image used for both the restore and test phases.
    pub sandbox_image: String,
    /// Prefix used when naming containers: `<prefix>-restore-<id>` / `<prefix>-test-<id>`.
    pub container_name_prefix: String,
    /// Non-root uid the sandbox process runs as.
    pub uid: u32,
    /// Non-root gid the sandbox process runs as.
    pub gid: u32,
    /// CPU share allotted to each phase (`--cpus=`).
    pub cpus: u32,
    /// Memory limit in MiB; swap is always pinned equal to this (no swap).
    pub memory_mb: u32,
    /// Maximum live processes inside the sandbox (`--pids-limit`).
    pub pids_limit: u32,
    /// Wall-clock budget for the restore phase.
    pub restore_timeout_secs: u64,
    /// Wall-clock budget for the test phase.
    pub test_timeout_secs: u64,
    /// Per-stream captured-output cap, in characters.
    pub stdout_cap_chars: usize,
    /// Per-stream captured-output cap, in characters.
    pub stderr_cap_chars: usize,
    /// Per-field cap applied to every string in the emitted verdict.
    pub verdict_field_cap_chars: usize,
    /// Artifact files larger than this are treated as a resource-limit event.
    pub max_trx_bytes: u64,
    /// Grace period given to output-drain tasks after the child exits.
    pub drain_grace_secs: u64,
    /// Budget given to each best-effort container kill/rm call on timeout.
    pub cleanup_kill_budget_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sandbox_image: "tracepoint-judge-runtime:latest".to_string(),
            container_name_prefix: "tracepoint".to_string(),
            uid: 1000,
            gid: 1000,
            cpus: 1,
            memory_mb: 512,
            pids_limit: 128,
            restore_timeout_secs: 60,
            test_timeout_secs: 6,
            stdout_cap_chars: 64_000,
            stderr_cap_chars: 64_000,
            verdict_field_cap_chars: 16_000,
            max_trx_bytes: 2_000_000,
            drain_grace_secs: 5,
            cleanup_kill_budget_secs: 5,
        }
    }
}

/// Loads engine configuration, falling back to [`EngineConfig::default`]
/// field-by-field when `path` does not exist.
///
/// # Errors
///
/// Returns an error if `path` exists but is not valid TOML or does not
/// match the [`EngineConfig`] schema.
pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    if !path.exists() {
        tracing::debug!("no config file at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    let config: EngineConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.restore_timeout_secs, 60);
        assert_eq!(config.test_timeout_secs, 6);
        assert_eq!(config.stdout_cap_chars, 64_000);
        assert_eq!(config.verdict_field_cap_chars, 16_000);
        assert_eq!(config.max_trx_bytes, 2_000_000);
        assert_eq!(config.pids_limit, 128);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/judge-core.toml")).unwrap();
        assert_eq!(config.memory_mb, 512);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judge-core.toml");
        std::fs::write(&path, "test_timeout_secs = 30\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.test_timeout_secs, 30);
        assert_eq!(config.restore_timeout_secs, 60);
    }
}
