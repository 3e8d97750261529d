use crate::foundation::core::FrameSize;

pub type FlowResult<T> = Result<T, FlowError>;

#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    /// The frame source cannot supply a frame (stream ended, spawn failure, permission denied).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A frame, image or motion field does not match the fixed working size.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: FrameSize,
        actual: FrameSize,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn dimension_mismatch(expected: FrameSize, actual: FrameSize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}

/// Fails with [`FlowError::DimensionMismatch`] unless `actual == expected`.
pub fn ensure_size(expected: FrameSize, actual: FrameSize) -> FlowResult<()> {
    if expected != actual {
        return Err(FlowError::dimension_mismatch(expected, actual));
    }
    Ok(())
}
