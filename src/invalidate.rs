//! Post-import cache invalidation.
//!
//! After an import commits, the host's derived caches for the item (compiled
//! stylesheets and the like) are stale. The host knows how to rebuild them;
//! this module only knows how to ask it.

use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum InvalidateError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Tells the host that an item's derived caches must be rebuilt.
pub trait CacheInvalidator {
    fn invalidate(&self, id: &str) -> Result<(), InvalidateError>;
}

/// Does nothing. Used when no post-import command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, id: &str) -> Result<(), InvalidateError> {
        debug!("No cache invalidation configured for {}", id);
        Ok(())
    }
}

/// Runs an external command, with `{id}` in any argument replaced by the
/// content id. A non-zero exit status is a failure.
#[derive(Debug, Clone)]
pub struct CommandInvalidator {
    program: String,
    args: Vec<String>,
}

impl CommandInvalidator {
    /// Build from `argv`; `None` if it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn args_for(&self, id: &str) -> Vec<String> {
        self.args.iter().map(|a| a.replace("{id}", id)).collect()
    }
}

impl CacheInvalidator for CommandInvalidator {
    fn invalidate(&self, id: &str) -> Result<(), InvalidateError> {
        let args = self.args_for(id);
        debug!("Running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| InvalidateError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(InvalidateError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// The invalidator for a configured `after_import` command line.
pub fn from_config(after_import: &[String]) -> Box<dyn CacheInvalidator> {
    match CommandInvalidator::from_argv(after_import) {
        Some(cmd) => Box::new(cmd),
        None => Box::new(NoopInvalidator),
    }
}
