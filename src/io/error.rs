//! Error types and context management for training operations

use std::fmt;
use std::path::PathBuf;

/// Main error type for all training and inference operations
#[derive(Debug)]
pub enum TrainingError {
    /// Failed to load an image from the filesystem
    ImageLoad {
        /// Path to the image file
        path: PathBuf,
        /// Underlying image loading error
        source: image::ImageError,
    },

    /// Failed to save an image to disk
    ImageExport {
        /// Path where export was attempted
        path: PathBuf,
        /// Underlying image export error
        source: image::ImageError,
    },

    /// General file system operation failure
    FileSystem {
        /// Path involved in the operation
        path: PathBuf,
        /// Description of the operation that failed
        operation: &'static str,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration or hyperparameter validation failed
    InvalidParameter {
        /// Name of the invalid parameter
        parameter: &'static str,
        /// Provided value that failed validation
        value: String,
        /// Explanation of why the value is invalid
        reason: String,
    },

    /// Frozen backbone weights are missing or unreadable
    MissingWeights {
        /// Path where the weights were expected
        path: PathBuf,
        /// Description of what went wrong
        reason: String,
    },

    /// Checkpoint is missing, malformed or incompatible with the networks
    Checkpoint {
        /// Path of the checkpoint file
        path: PathBuf,
        /// Description of the incompatibility
        reason: String,
    },

    /// Two tensors disagree in shape at the point of an operation
    ShapeMismatch {
        /// Name of the operation that received the tensors
        operation: &'static str,
        /// Expected shape
        expected: Vec<usize>,
        /// Shape that was actually provided
        actual: Vec<usize>,
    },

    /// A gradient was requested for a value that does not influence the output
    NotDifferentiable {
        /// Name of the computation that requested the gradient
        operation: &'static str,
    },

    /// An optimizer step was attempted on a parameter group without write access
    FrozenParameters {
        /// Name of the parameter group
        group: String,
    },

    /// Dataset contents do not meet the loader's requirements
    InvalidDataset {
        /// Description of what's wrong with the dataset
        reason: String,
    },

    /// JSON serialization or deserialization failure
    Serialization {
        /// Path of the document involved, if any
        path: PathBuf,
        /// Underlying serde error
        source: serde_json::Error,
    },

    /// Numerical computation produced invalid result
    Computation {
        /// Name of the computation that failed
        operation: &'static str,
        /// Description of the failure
        reason: String,
    },
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageLoad { path, source } => {
                write!(f, "Failed to load image '{}': {source}", path.display())
            }
            Self::ImageExport { path, source } => {
                write!(
                    f,
                    "Failed to export image to '{}': {source}",
                    path.display()
                )
            }
            Self::FileSystem {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "File system error during {operation} on '{}': {source}",
                    path.display()
                )
            }
            Self::InvalidParameter {
                parameter,
                value,
                reason,
            } => {
                write!(f, "Invalid parameter '{parameter}' = '{value}': {reason}")
            }
            Self::MissingWeights { path, reason } => {
                write!(
                    f,
                    "Backbone weights at '{}' are unusable: {reason}",
                    path.display()
                )
            }
            Self::Checkpoint { path, reason } => {
                write!(f, "Checkpoint '{}' rejected: {reason}", path.display())
            }
            Self::ShapeMismatch {
                operation,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Shape mismatch in {operation}: expected {expected:?}, got {actual:?}"
                )
            }
            Self::NotDifferentiable { operation } => {
                write!(
                    f,
                    "Output of {operation} does not depend on the requested input"
                )
            }
            Self::FrozenParameters { group } => {
                write!(f, "Parameter group '{group}' is frozen and cannot be updated")
            }
            Self::InvalidDataset { reason } => {
                write!(f, "Invalid dataset: {reason}")
            }
            Self::Serialization { path, source } => {
                write!(f, "Serialization error on '{}': {source}", path.display())
            }
            Self::Computation { operation, reason } => {
                write!(f, "Computation error in {operation}: {reason}")
            }
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ImageLoad { source, .. } | Self::ImageExport { source, .. } => Some(source),
            Self::FileSystem { source, .. } => Some(source),
            Self::Serialization { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience type alias for training results
pub type Result<T> = std::result::Result<T, TrainingError>;

/// Additional context to enrich error messages
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Epoch being trained when the error occurred
    pub epoch: Option<usize>,
    /// Batch index within the epoch
    pub batch: Option<usize>,
    /// Path of the file being processed
    pub path: Option<PathBuf>,
}

/// Enriches error messages with training state information
pub trait WithContext<T> {
    /// Add error context to a Result
    ///
    /// # Errors
    ///
    /// Propagates the original error with additional context applied
    fn with_context(self, context: ErrorContext) -> Result<T>;

    /// Attach the path of the file being processed
    ///
    /// # Errors
    ///
    /// Propagates the original error with the path applied
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T, E> WithContext<T> for std::result::Result<T, E>
where
    E: Into<TrainingError>,
{
    fn with_context(self, context: ErrorContext) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();
            // Only errors that carry a placeholder path benefit from file context
            if let Some(new_path) = context.path {
                match &mut error {
                    TrainingError::ImageLoad { path, .. }
                    | TrainingError::ImageExport { path, .. }
                    | TrainingError::FileSystem { path, .. }
                    | TrainingError::Serialization { path, .. } => *path = new_path,
                    _ => {}
                }
            }
            if let (TrainingError::Computation { reason, .. }, Some(epoch)) =
                (&mut error, context.epoch)
            {
                match context.batch {
                    Some(batch) => *reason = format!("{reason} (epoch {epoch}, batch {batch})"),
                    None => *reason = format!("{reason} (epoch {epoch})"),
                }
            }
            error
        })
    }

    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.with_context(ErrorContext {
            path: Some(path.into()),
            ..Default::default()
        })
    }
}

impl From<image::ImageError> for TrainingError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageLoad {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

impl From<std::io::Error> for TrainingError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("<unknown>"),
            operation: "unknown",
            source: err,
        }
    }
}

impl From<serde_json::Error> for TrainingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

/// Create an invalid parameter error
pub fn invalid_parameter(
    parameter: &'static str,
    value: &impl ToString,
    reason: &impl ToString,
) -> TrainingError {
    TrainingError::InvalidParameter {
        parameter,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Create a computation error
pub fn computation_error(operation: &'static str, reason: &impl ToString) -> TrainingError {
    TrainingError::Computation {
        operation,
        reason: reason.to_string(),
    }
}

/// Create a shape mismatch error
pub fn shape_mismatch(operation: &'static str, expected: &[usize], actual: &[usize]) -> TrainingError {
    TrainingError::ShapeMismatch {
        operation,
        expected: expected.to_vec(),
        actual: actual.to_vec(),
    }
}
