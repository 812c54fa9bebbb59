use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviserError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Failed to load package dependencies for {dir}: {message}")]
    DependencyLoad { dir: String, message: String },

    #[error("Corrupted cache record {path}: {message}")]
    CacheCorruption { path: String, message: String },

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Module error: {0}")]
    Module(String),

    #[error("Walk error: {0}")]
    Walk(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to fix {path}: {source}")]
    File {
        path: String,
        #[source]
        source: Box<ReviserError>,
    },
}

impl ReviserError {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        ReviserError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attaches the path of the unit that failed, used by batch runs so the
    /// retained first error names its file.
    pub fn in_file(self, path: impl Into<String>) -> Self {
        ReviserError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviserError>;
