use std::error::Error;
use std::fmt::Display;

/// Failure reported by a fitting engine. Never escapes the executor: it is
/// folded into an error-shaped `NormalizedResult`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Unavailable(String),
    UnsupportedFormula(String),
    EmptyWindow { xmin: f64, xmax: f64 },
    Failed(String),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Unavailable(x) => write!(f, "Fit engine is not available: {}", x),
            EngineError::UnsupportedFormula(x) => {
                write!(f, "Fit engine cannot evaluate formula '{}'", x)
            }
            EngineError::EmptyWindow { xmin, xmax } => {
                write!(f, "Fit window [{}, {}] contains no bins", xmin, xmax)
            }
            EngineError::Failed(x) => write!(f, "Fit engine error: {}", x),
        }
    }
}

impl Error for EngineError {}

#[derive(Debug)]
pub enum ExportError {
    File(std::io::Error),
    Json(serde_json::Error),
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> ExportError {
        ExportError::File(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> ExportError {
        ExportError::Json(err)
    }
}

impl Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::File(x) => write!(f, "Export had a file I/O error: {}", x),
            ExportError::Json(x) => write!(f, "Export had a JSON error: {}", x),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExportError::File(x) => Some(x),
            ExportError::Json(x) => Some(x),
        }
    }
}

/// Failure while reading a histogram or a batch configuration from disk.
#[derive(Debug)]
pub enum LoadError {
    File(std::io::Error),
    Json(serde_json::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> LoadError {
        LoadError::File(err)
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> LoadError {
        LoadError::Json(err)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(err: serde_yaml::Error) -> LoadError {
        LoadError::Yaml(err)
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::File(x) => write!(f, "Load had a file I/O error: {}", x),
            LoadError::Json(x) => write!(f, "Load had a JSON error: {}", x),
            LoadError::Yaml(x) => write!(f, "Load had a YAML error: {}", x),
            LoadError::Invalid(x) => write!(f, "Loaded data is invalid: {}", x),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::File(x) => Some(x),
            LoadError::Json(x) => Some(x),
            LoadError::Yaml(x) => Some(x),
            LoadError::Invalid(_) => None,
        }
    }
}
