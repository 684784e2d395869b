/// Result alias used throughout the crate.
pub type LumastaticResult<T> = Result<T, LumastaticError>;

/// Error returned by every fallible operation in the crate.
///
/// Each variant identifies the stage that failed; all of them end the current run.
#[derive(thiserror::Error, Debug)]
pub enum LumastaticError {
    /// The source is missing, unreadable, or not decodable.
    #[error("open error: {0}")]
    Open(String),

    /// The sink path is unwritable or the encoder is misconfigured.
    #[error("write error: {0}")]
    Write(String),

    /// The external transcoder failed, timed out, or found no usable streams.
    #[error("remux error: {0}")]
    Remux(String),

    /// The source produced zero decodable frames.
    #[error("empty stream: {0}")]
    EmptyStream(String),

    /// Invalid configuration or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Source acquisition failed.
    #[error("acquire error: {0}")]
    Acquire(String),

    /// Context-wrapped I/O and other internal failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LumastaticError {
    /// Build an [`LumastaticError::Open`].
    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }

    /// Build an [`LumastaticError::Write`].
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Build an [`LumastaticError::Remux`].
    pub fn remux(msg: impl Into<String>) -> Self {
        Self::Remux(msg.into())
    }

    /// Build an [`LumastaticError::EmptyStream`].
    pub fn empty_stream(msg: impl Into<String>) -> Self {
        Self::EmptyStream(msg.into())
    }

    /// Build an [`LumastaticError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an [`LumastaticError::Acquire`].
    pub fn acquire(msg: impl Into<String>) -> Self {
        Self::Acquire(msg.into())
    }

    /// Short name of the pipeline stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Open(_) | Self::EmptyStream(_) => "decode",
            Self::Write(_) => "encode",
            Self::Remux(_) => "remux",
            Self::Validation(_) => "config",
            Self::Acquire(_) => "acquire",
            Self::Other(_) => "internal",
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
