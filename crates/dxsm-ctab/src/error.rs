use thiserror::Error;

/// Errors produced while parsing `CTAB` or preshader blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CtabError {
    /// The block header is missing, truncated or carries an unexpected size/magic.
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    /// An offset or count points outside the block.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    /// The block is structurally valid but its contents are inconsistent.
    #[error("corrupt data: {0}")]
    Corrupt(String),
}

impl CtabError {
    pub(crate) fn malformed_header(context: impl Into<String>) -> Self {
        Self::MalformedHeader(context.into())
    }

    pub(crate) fn out_of_bounds(context: impl Into<String>) -> Self {
        Self::OutOfBounds(context.into())
    }

    pub(crate) fn corrupt(context: impl Into<String>) -> Self {
        Self::Corrupt(context.into())
    }

    /// Returns the human-readable context without the error-kind prefix.
    pub fn context(&self) -> &str {
        match self {
            Self::MalformedHeader(s) | Self::OutOfBounds(s) | Self::Corrupt(s) => s,
        }
    }
}
