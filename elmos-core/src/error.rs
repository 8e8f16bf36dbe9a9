//! Error types for module discovery, builds and queue persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating or creating module projects
#[derive(Error, Debug)]
pub enum ModuleError {
    /// The named module directory does not exist
    #[error("module not found: {name}")]
    NotFound { name: String },

    /// The module exists but its C source file is missing
    #[error("source file missing for module '{name}': {}", .path.display())]
    SourceMissing { name: String, path: PathBuf },

    /// A module with this name already exists
    #[error("module already exists: {name}")]
    AlreadyExists { name: String },

    /// The name cannot be used as a module directory
    #[error("invalid module name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The modules directory could not be read
    #[error("failed to read modules directory {}: {source}", .path.display())]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ModuleError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means "the thing asked for is not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::SourceMissing { .. })
    }
}

/// Errors raised by the build driver
#[derive(Error, Debug)]
pub enum BuildError {
    /// `make` ran and exited non-zero for a build target
    #[error("failed to build module: {module} (exit code {})", format_code(.code))]
    Failed { module: String, code: Option<i32> },

    /// `make` could not be started at all
    #[error("failed to spawn `{program}` for {label}: {source}")]
    Spawn {
        label: String,
        program: String,
        #[source]
        source: io::Error,
    },

    /// The build was interrupted by the user
    #[error("build of {label} interrupted")]
    Interrupted { label: String },

    #[error(transparent)]
    Module(#[from] ModuleError),
}

fn format_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none, killed by signal".to_string(),
    }
}

/// Errors raised while reading or writing the queue file
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue file could not be written; the mutation is lost
    #[error("failed to write queue file {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The queue file exists but could not be read
    #[error("failed to read queue file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failure_names_module() {
        let err = BuildError::Failed {
            module: "hello".into(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "failed to build module: hello (exit code 2)");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ModuleError::not_found("nope").is_not_found());
        assert!(
            ModuleError::SourceMissing {
                name: "x".into(),
                path: PathBuf::from("x/x.c"),
            }
            .is_not_found()
        );
        assert!(!ModuleError::invalid_name("a/b", "contains '/'").is_not_found());
    }
}
