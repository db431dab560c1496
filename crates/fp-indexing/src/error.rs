use fp_columnar::ColumnError;
use fp_frame::FrameError;
use fp_index::IndexError;
use fp_join::JoinError;
use fp_types::DType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingErrorKind {
    Arity,
    KeyNotFound,
    TypeMismatch,
    OutOfBounds,
    ValueCoercion,
    Rejected,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexingError {
    #[error("too many indexers: got {got}, expected at most {expected}")]
    TooManyIndexers { got: usize, expected: usize },
    #[error("too many indexers: tuple sub-keys cannot be nested")]
    NestedTuple,
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("position {position} is out of bounds for axis with {len} rows")]
    OutOfBounds { position: i64, len: usize },
    #[error("boolean mask of length {actual} does not match frame length {expected}")]
    MaskLengthMismatch { expected: usize, actual: usize },
    #[error("cannot coerce key to index dtype {dtype:?}: {detail}")]
    ValueCoercion { dtype: DType, detail: String },
    #[error("label lookup rejected: join would produce {estimated_rows} rows, cap is {cap}")]
    JoinRejected { estimated_rows: usize, cap: usize },
    #[error("scalar column key selected {selected} columns")]
    ScalarColumnInvariant { selected: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Join(#[from] JoinError),
}

impl IndexingError {
    #[must_use]
    pub fn kind(&self) -> IndexingErrorKind {
        match self {
            Self::TooManyIndexers { .. } | Self::NestedTuple => IndexingErrorKind::Arity,
            Self::KeyNotFound(_) => IndexingErrorKind::KeyNotFound,
            Self::TypeMismatch(_) | Self::MaskLengthMismatch { .. } => {
                IndexingErrorKind::TypeMismatch
            }
            Self::OutOfBounds { .. } => IndexingErrorKind::OutOfBounds,
            Self::ValueCoercion { .. } => IndexingErrorKind::ValueCoercion,
            Self::JoinRejected { .. } => IndexingErrorKind::Rejected,
            Self::ScalarColumnInvariant { .. } => IndexingErrorKind::Internal,
            Self::Column(err) => match err {
                ColumnError::OutOfBounds { .. } => IndexingErrorKind::OutOfBounds,
                ColumnError::Type(_) => IndexingErrorKind::TypeMismatch,
                _ => IndexingErrorKind::Internal,
            },
            Self::Index(err) => match err {
                IndexError::BoundNotFound { .. }
                | IndexError::NonUniqueBound { .. }
                | IndexError::IncomparableBound { .. } => IndexingErrorKind::KeyNotFound,
                IndexError::ZeroSliceStep => IndexingErrorKind::TypeMismatch,
                _ => IndexingErrorKind::Internal,
            },
            Self::Frame(err) => match err {
                FrameError::ColumnLabelNotFound(_) | FrameError::NonUniqueColumnBound(_) => {
                    IndexingErrorKind::KeyNotFound
                }
                FrameError::ColumnPositionOutOfBounds { .. } => IndexingErrorKind::OutOfBounds,
                FrameError::MaskLengthMismatch { .. } => IndexingErrorKind::TypeMismatch,
                _ => IndexingErrorKind::Internal,
            },
            Self::Join(_) => IndexingErrorKind::Internal,
        }
    }

    pub(crate) fn dtype_mismatch() -> Self {
        Self::KeyNotFound("dtype mismatch in label lookup".to_owned())
    }
}
