use crate::command::{BoundedCommand, CommandError, Interrupt};
use cfgmend_schema::ConfigSnapshot;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to write working config {}: {source}", .path.display())]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read normalized config {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("normalizer '{command}' exited with {}: {stderr}", describe_exit(.code))]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("normalizer {0}")]
    Command(#[from] CommandError),
    #[error("normalizer failed: {0}")]
    Failed(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_owned(),
    }
}

/// The external dependency-aware tool that expands and prunes a configuration.
///
/// Implementations may add entries (dependency closure) and remove entries
/// (unmet dependencies) in the same call. The reconciler only sees the
/// returned snapshot.
pub trait NormalizationOracle {
    fn name(&self) -> &str;

    fn normalize(&self, snapshot: &ConfigSnapshot) -> Result<ConfigSnapshot, OracleError>;
}

/// Oracle backed by a build tree: writes the config file in place, runs the
/// configured program (normally `make defconfig`) there, reads the file back.
pub struct CommandOracle {
    tree_dir: PathBuf,
    config_path: PathBuf,
    command: BoundedCommand,
}

impl CommandOracle {
    pub fn new(
        tree_dir: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Self {
        let tree_dir = tree_dir.into();
        let command = BoundedCommand::new(program, timeout)
            .args(args.iter().cloned())
            .current_dir(&tree_dir);
        Self {
            tree_dir,
            config_path: config_path.into(),
            command,
        }
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.command = self.command.interrupt(interrupt);
        self
    }

    pub fn tree_dir(&self) -> &Path {
        &self.tree_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn program(&self) -> &str {
        &self.command.program
    }
}

impl NormalizationOracle for CommandOracle {
    fn name(&self) -> &str {
        "command"
    }

    fn normalize(&self, snapshot: &ConfigSnapshot) -> Result<ConfigSnapshot, OracleError> {
        snapshot
            .write_to_file(&self.config_path)
            .map_err(|source| OracleError::WriteConfig {
                path: self.config_path.clone(),
                source,
            })?;

        info!("normalizing with '{}'", self.command.display());
        let output = self.command.run()?;
        if !output.status.success() {
            return Err(OracleError::ExitStatus {
                command: self.command.display(),
                code: output.status.code(),
                stderr: output.stderr_tail().to_owned(),
            });
        }

        let parsed = ConfigSnapshot::read_from_file(&self.config_path, 0).map_err(|source| {
            OracleError::ReadConfig {
                path: self.config_path.clone(),
                source,
            }
        })?;
        if !parsed.warnings.is_empty() {
            debug!(
                "normalized config had {} unparseable lines",
                parsed.warnings.len()
            );
        }

        let mut normalized = parsed.snapshot;
        normalized.inherit_origins(snapshot);
        Ok(normalized)
    }
}
