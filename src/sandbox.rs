//! Argument-vector construction for the two sandboxed container phases.
//!
//! `SandboxCommandBuilder` owns no process-spawning logic of its own — it
//! only assembles the argv that [`crate::process::ProcessExecutor`] will
//! later hand to the container runtime binary (e.g. `docker`, `podman`).
//! Keeping construction and execution separate makes the exact flag
//! surface independently testable without spawning anything.

use std::path::Path;

use crate::config::EngineConfig;

/// Which of the two sandboxed phases a command vector is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Dependency restore: network access, no init process.
    Restore,
    /// Test execution: no network, PID 1 reaper present.
    Test,
}

impl Phase {
    /// The `diagnostics.phase` / error-taxonomy token for this phase.
    pub fn token(self) -> &'static str {
        match self {
            Phase::Restore => "restore",
            Phase::Test => "test",
        }
    }

    fn name_segment(self) -> &'static str {
        match self {
            Phase::Restore => "restore",
            Phase::Test => "test",
        }
    }
}

/// Builds the `docker run ...` argument vectors for both phases, pinned
/// to a fixed image and resource policy.
pub struct SandboxCommandBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> SandboxCommandBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// The container name this phase will run under for `submission_id`:
    /// `<prefix>-<phase>-<id>`.
    pub fn container_name(&self, phase: Phase, submission_id: &str) -> String {
        format!(
            "{}-{}-{}",
            self.config.container_name_prefix,
            phase.name_segment(),
            submission_id
        )
    }

    /// Builds the restore-phase argv: network-enabled, no init, runs
    /// `dotnet restore` against the mounted workspace.
    pub fn restore_args(
        &self,
        submission_id: &str,
        work_dir: &Path,
        package_cache_dir: &Path,
    ) -> Vec<String> {
        let mut args = self.common_args(
            Phase::Restore,
            submission_id,
            work_dir,
            package_cache_dir,
        );
        args.extend(["dotnet".to_string(), "restore".to_string()]);
        args
    }

    /// Builds the test-phase argv: `--network none`, `--init`, invokes
    /// the test command with `--no-restore` and directs its log output
    /// to `results.trx`.
    pub fn test_args(
        &self,
        submission_id: &str,
        work_dir: &Path,
        package_cache_dir: &Path,
    ) -> Vec<String> {
        let mut args = self.common_args(Phase::Test, submission_id, work_dir, package_cache_dir);

        // Insert --network none / --init ahead of the image+cmd tail that
        // common_args already appended the mounts/env for.
        let image_index = args
            .iter()
            .position(|a| a == &self.config.sandbox_image)
            .expect("common_args always appends the image");
        args.splice(
            image_index..image_index,
            ["--network".to_string(), "none".to_string(), "--init".to_string()],
        );

        args.extend([
            "dotnet".to_string(),
            "test".to_string(),
            "--no-restore".to_string(),
            "--logger".to_string(),
            "trx;LogFileName=results.trx".to_string(),
        ]);
        args
    }

    /// Flags shared by both phases: name, resource limits, mounts, env,
    /// working directory, and the image — everything up to (but not
    /// including) the in-container command.
    fn common_args(
        &self,
        phase: Phase,
        submission_id: &str,
        work_dir: &Path,
        package_cache_dir: &Path,
    ) -> Vec<String> {
        let c = self.config;
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name(phase, submission_id),
            "--user".to_string(),
            format!("{}:{}", c.uid, c.gid),
            format!("--cpus={}", c.cpus),
            format!("--memory={}m", c.memory_mb),
            format!("--memory-swap={}m", c.memory_mb),
            format!("--pids-limit={}", c.pids_limit),
            "-v".to_string(),
            format!("{}:/workspace", work_dir.display()),
            "-v".to_string(),
            format!("{}:/nuget", package_cache_dir.display()),
            "-e".to_string(),
            "NUGET_PACKAGES=/nuget".to_string(),
            "-e".to_string(),
            "DOTNET_SKIP_WORKLOAD_INTEGRITY_CHECK=1".to_string(),
            "-e".to_string(),
            "DOTNET_CLI_TELEMETRY_OPTOUT=1".to_string(),
            "-e".to_string(),
            "DOTNET_NOLOGO=1".to_string(),
            "-w".to_string(),
            "/workspace".to_string(),
            c.sandbox_image.clone(),
        ]
    }

    /// Best-effort cleanup argv for a container that may still be
    /// running after a timeout: `kill <name>` then `rm -f <name>`.
    pub fn kill_and_remove_args(&self, phase: Phase, submission_id: &str) -> (Vec<String>, Vec<String>) {
        let name = self.container_name(phase, submission_id);
        (
            vec!["kill".to_string(), name.clone()],
            vec!["rm".to_string(), "-f".to_string(), name],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn builder_fixture() -> (EngineConfig, PathBuf, PathBuf) {
        (
            EngineConfig::default(),
            PathBuf::from("/tmp/ws/work"),
            PathBuf::from("/tmp/ws/work/_nuget-cache"),
        )
    }

    #[test]
    fn restore_has_network_and_no_init() {
        let (config, work, cache) = builder_fixture();
        let builder = SandboxCommandBuilder::new(&config);
        let args = builder.restore_args("abc123", &work, &cache);

        assert!(!args.iter().any(|a| a == "--network"));
        assert!(!args.iter().any(|a| a == "--init"));
        assert!(args.contains(&"dotnet".to_string()));
        assert!(args.contains(&"restore".to_string()));
        assert!(args.iter().any(|a| a.contains("restore-abc123")));
    }

    #[test]
    fn test_phase_has_no_network_and_init_and_trx_logger() {
        let (config, work, cache) = builder_fixture();
        let builder = SandboxCommandBuilder::new(&config);
        let args = builder.test_args("abc123", &work, &cache);

        let network_pos = args.iter().position(|a| a == "--network").unwrap();
        assert_eq!(args[network_pos + 1], "none");
        assert!(args.iter().any(|a| a == "--init"));
        assert!(args.iter().any(|a| a.contains("results.trx")));
        assert!(args.iter().any(|a| a.contains("test-abc123")));
    }

    #[test]
    fn resource_limits_match_spec() {
        let (config, work, cache) = builder_fixture();
        let builder = SandboxCommandBuilder::new(&config);
        let args = builder.restore_args("id", &work, &cache);

        assert!(args.contains(&"--cpus=1".to_string()));
        assert!(args.contains(&"--memory=512m".to_string()));
        assert!(args.contains(&"--memory-swap=512m".to_string()));
        assert!(args.contains(&"--pids-limit=128".to_string()));
        assert!(args.contains(&"--user".to_string()));
    }

    #[test]
    fn mounts_and_env_are_present() {
        let (config, work, cache) = builder_fixture();
        let builder = SandboxCommandBuilder::new(&config);
        let args = builder.restore_args("id", &work, &cache);

        assert!(args.iter().any(|a| a.ends_with(":/workspace")));
        assert!(args.iter().any(|a| a.ends_with(":/nuget")));
        assert!(args.contains(&"NUGET_PACKAGES=/nuget".to_string()));
        assert!(args.contains(&"DOTNET_CLI_TELEMETRY_OPTOUT=1".to_string()));
    }

    #[test]
    fn kill_and_remove_target_the_same_container_name() {
        let (config, _, _) = builder_fixture();
        let builder = SandboxCommandBuilder::new(&config);
        let (kill, rm) = builder.kill_and_remove_args(Phase::Test, "id");

        assert_eq!(kill[1], "tracepoint-test-id");
        assert_eq!(rm[2], "tracepoint-test-id");
    }
}
