/// Result alias that carries the custom [`ShowError`] type.
pub type Result<T> = std::result::Result<T, ShowError>;

/// Common error type for the core crate.
///
/// Nothing in the per-frame path returns this type to the caller: the show
/// degrades to demo or zeroed features instead. Errors surface only while
/// loading configuration, reading or writing persisted state, and building
/// the analyser.
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    /// Free-form message, mostly used for poisoned shared state.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed configuration or state file.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// A caller handed the core something it cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The FFT backend rejected a buffer.
    #[error("fft: {0}")]
    Fft(#[from] realfft::FftError),
}

impl ShowError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for ShowError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ShowError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
