use std::io;
use thiserror::Error;

/// Error type shared by every gtrack crate.
#[derive(Error, Debug)]
pub enum GtrackError {
    /// Bad magic number, truncated header/footer or a corrupt block.
    #[error("Invalid track data: {0}")]
    Format(String),

    /// An input stream was not sorted the way the algorithm requires.
    #[error("Unsorted input: {0}")]
    Ordering(String),

    /// An optional field was read without checking its presence first.
    #[error("Field is not present in this record: {0}")]
    MissingField(&'static str),

    /// The underlying byte source failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A caller-supplied value broke a documented precondition.
    #[error("Invalid argument: {0}")]
    Precondition(String),
}

impl GtrackError {
    ///
    /// Classify an io error raised while reading a fixed-size section.
    ///
    /// Running out of bytes means the file itself is malformed, so it is
    /// reported as a format error; everything else stays an io error.
    ///
    pub fn from_read(err: io::Error, section: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            GtrackError::Format(format!("truncated {section}"))
        } else {
            GtrackError::Io(err)
        }
    }
}

/// Result type alias for gtrack operations.
pub type Result<T> = std::result::Result<T, GtrackError>;
