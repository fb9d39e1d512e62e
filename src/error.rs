//! Crate-wide error type.
//!
//! Every fallible operation returns `AppError`. The `kind` drives both the
//! process exit code and how the batch orchestrator reacts (most kinds are
//! fatal for a single file, never for the batch).

/// Failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid options, manifests or dataset names.
    Config,
    /// File system failures (open, list, create).
    Io,
    /// Malformed byte sequences in a raw export.
    Encoding,
    /// A cell in the data region is not a number.
    Parse,
    /// The parsed grid is smaller than the layout/sample count requires.
    ShapeMismatch,
    /// The solver did not converge.
    FitNonConvergence,
    /// An optional collaborator (plotting) is not available.
    MissingOptionalDependency,
    /// Writing a report, table or export failed.
    Export,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Parse => "parse",
            ErrorKind::ShapeMismatch => "shape-mismatch",
            ErrorKind::FitNonConvergence => "fit-non-convergence",
            ErrorKind::MissingOptionalDependency => "missing-optional-dependency",
            ErrorKind::Export => "export",
        }
    }

    fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Config | ErrorKind::Io | ErrorKind::Export => 2,
            ErrorKind::Encoding | ErrorKind::Parse | ErrorKind::ShapeMismatch => 3,
            ErrorKind::FitNonConvergence => 4,
            ErrorKind::MissingOptionalDependency => 5,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ShapeMismatch, message)
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Export, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(AppError::config("x").exit_code(), 2);
        assert_eq!(AppError::shape("x").exit_code(), 3);
        assert_eq!(AppError::new(ErrorKind::FitNonConvergence, "x").exit_code(), 4);
        assert_eq!(AppError::shape("too few rows").to_string(), "too few rows");
    }
}
