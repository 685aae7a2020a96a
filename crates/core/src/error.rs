use std::path::PathBuf;
use thiserror::Error;

/// Result type for treewatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for treewatch operations
///
/// Variants fall into three groups. `Io` and `FileSystemLoop` are data errors:
/// they travel inside traversal events and never abort a walk or a scan.
/// `Config`, `NotSupported` and `NotDirectory` are configuration errors raised
/// by the call that introduced them. `ClosedWalker` and `ClosedWatchService`
/// are lifecycle errors returned by every call made after a close.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A symbolic link leads back to one of its ancestor directories
    #[error("File system loop detected at {}", .0.display())]
    FileSystemLoop(PathBuf),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested event kind, modifier or attribute view is not available
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Watch target is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotDirectory(PathBuf),

    /// Traversal engine used after close
    #[error("Traversal engine is closed")]
    ClosedWalker,

    /// Watch registry used after close
    #[error("Watch service is closed")]
    ClosedWatchService,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a not-supported error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Adds context to any error
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Returns the underlying I/O error, if this is one
    pub fn as_io(&self) -> Option<&std::io::Error> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this error describes a problem with the file system contents
    /// rather than with how the API was used
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Io(_) | Self::FileSystemLoop(_))
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_context(context, e))
    }
}
