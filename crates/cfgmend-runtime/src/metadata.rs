use crate::command::{BoundedCommand, CommandError, Interrupt};
use cfgmend_schema::PackageName;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Exit status a metadata command uses to say "no such package".
pub const UNKNOWN_PACKAGE_EXIT: i32 = 2;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("package '{0}' is unknown to the metadata service")]
    Unknown(String),
    #[error("metadata lookup for '{package}' failed: {reason}")]
    Failed { package: String, reason: String },
}

/// Source of declared package dependencies.
///
/// Returns the raw dependency tokens the service reports (e.g. `+libbaz`,
/// `@TARGET_x86`); the caller decides which of them are feature entries.
pub trait MetadataService {
    fn name(&self) -> &str;

    fn dependencies(&self, package: &PackageName) -> Result<Vec<String>, MetadataError>;
}

/// Runs `program args... <package>` and reads dependency tokens from stdout.
///
/// Exit status [`UNKNOWN_PACKAGE_EXIT`] or a bare `unknown` on stdout means
/// the package is unknown; any other failure is reported as `Failed`.
pub struct CommandMetadata {
    command: BoundedCommand,
}

impl CommandMetadata {
    pub fn new(program: &str, args: &[String], timeout: Duration) -> Self {
        Self {
            command: BoundedCommand::new(program, timeout).args(args.iter().cloned()),
        }
    }

    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.command = self.command.current_dir(dir);
        self
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.command = self.command.interrupt(interrupt);
        self
    }
}

impl MetadataService for CommandMetadata {
    fn name(&self) -> &str {
        "command"
    }

    fn dependencies(&self, package: &PackageName) -> Result<Vec<String>, MetadataError> {
        let cmd = self.command.clone().args([package.as_str()]);
        let output = cmd.run().map_err(|e| failed(package, &e))?;

        if output.status.code() == Some(UNKNOWN_PACKAGE_EXIT) {
            return Err(MetadataError::Unknown(package.to_string()));
        }
        if !output.status.success() {
            return Err(MetadataError::Failed {
                package: package.to_string(),
                reason: format!(
                    "'{}' exited with {:?}: {}",
                    cmd.display(),
                    output.status.code(),
                    output.stderr_tail()
                ),
            });
        }
        if output.stdout.trim() == "unknown" {
            return Err(MetadataError::Unknown(package.to_string()));
        }

        let deps: Vec<String> = output
            .stdout
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        debug!("{package}: {} declared dependencies", deps.len());
        Ok(deps)
    }
}

fn failed(package: &PackageName, err: &CommandError) -> MetadataError {
    MetadataError::Failed {
        package: package.to_string(),
        reason: err.to_string(),
    }
}

/// Used when no metadata service is configured: every package is unknown.
#[derive(Debug, Default)]
pub struct NoMetadata;

impl MetadataService for NoMetadata {
    fn name(&self) -> &str {
        "none"
    }

    fn dependencies(&self, package: &PackageName) -> Result<Vec<String>, MetadataError> {
        Err(MetadataError::Unknown(package.to_string()))
    }
}
