use std::fmt;

#[derive(Debug)]
pub enum FolioError {
    /// A custom margin-box worker finalized into something that is not a
    /// usable layout element. Continuing would corrupt the margin tiling.
    MarginBoxContent(String),
    /// `position: running(...)` with no parseable name.
    InvalidRunningName(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for FolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolioError::MarginBoxContent(name) => {
                write!(f, "margin box '{}' produced unusable content", name)
            }
            FolioError::InvalidRunningName(value) => {
                write!(f, "unparseable running element name in '{}'", value)
            }
            FolioError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            FolioError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for FolioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FolioError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FolioError {
    fn from(value: std::io::Error) -> Self {
        FolioError::Io(value)
    }
}
