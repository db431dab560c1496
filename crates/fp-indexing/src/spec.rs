//! Structured row indexers produced by the classifiers.

use fp_columnar::Column;
use fp_index::PositionSlice;
use fp_types::{DType, Scalar};
use serde::{Deserialize, Serialize};

use crate::error::IndexingError;

/// Stepped position range over rows, already resolved against the frame.
pub type RowSlice = PositionSlice;

/// Ordered row positions valid against a frame of `frame_len` rows.
///
/// `None` entries only occur when `nullify` is set; they gather as missing
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherMap {
    positions: Vec<Option<usize>>,
    frame_len: usize,
    nullify: bool,
}

impl GatherMap {
    /// Validate an integer column as a gather map.
    ///
    /// Negative positions count back from `frame_len`. Without `nullify`,
    /// missing entries are a type error and out-of-range positions are
    /// out of bounds; with it, both become `None`.
    pub fn new(column: &Column, frame_len: usize, nullify: bool) -> Result<Self, IndexingError> {
        if !(column.dtype().is_integer() || column.dtype() == DType::Null) {
            return Err(IndexingError::TypeMismatch(format!(
                "gather map must have integer dtype, found {:?}",
                column.dtype()
            )));
        }
        let len = i64::try_from(frame_len).unwrap_or(i64::MAX);
        let positions = column
            .values()
            .iter()
            .map(|value| {
                if value.is_missing() {
                    return if nullify {
                        Ok(None)
                    } else {
                        Err(IndexingError::TypeMismatch(
                            "gather map contains missing positions".to_owned(),
                        ))
                    };
                }
                // Unsigned values past i64::MAX are out of range for any frame.
                let raw = value.as_position().unwrap_or(i64::MAX);
                let wrapped = if raw < 0 { raw.saturating_add(len) } else { raw };
                if (0..len).contains(&wrapped) {
                    Ok(usize::try_from(wrapped).ok())
                } else if nullify {
                    Ok(None)
                } else {
                    Err(IndexingError::OutOfBounds {
                        position: raw,
                        len: frame_len,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            positions,
            frame_len,
            nullify,
        })
    }

    pub fn from_positions(
        positions: &[i64],
        frame_len: usize,
        nullify: bool,
    ) -> Result<Self, IndexingError> {
        Self::new(&Column::from_i64(positions.to_vec()), frame_len, nullify)
    }

    /// Wrap positions already known to be valid, skipping bounds checks.
    #[must_use]
    pub fn from_column_unchecked(column: &Column, frame_len: usize, nullify: bool) -> Self {
        let positions = column
            .values()
            .iter()
            .map(|value| value.as_position().and_then(|p| usize::try_from(p).ok()))
            .collect();
        Self {
            positions,
            frame_len,
            nullify,
        }
    }

    #[must_use]
    pub fn positions(&self) -> &[Option<usize>] {
        &self.positions
    }

    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    #[must_use]
    pub fn nullify(&self) -> bool {
        self.nullify
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Boolean row selector whose length matches the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanMask {
    column: Column,
    frame_len: usize,
}

impl BooleanMask {
    pub fn new(column: Column, frame_len: usize) -> Result<Self, IndexingError> {
        if !column.dtype().is_bool() {
            return Err(IndexingError::TypeMismatch(format!(
                "boolean mask must have bool dtype, found {:?}",
                column.dtype()
            )));
        }
        if column.len() != frame_len {
            return Err(IndexingError::MaskLengthMismatch {
                expected: frame_len,
                actual: column.len(),
            });
        }
        Ok(Self { column, frame_len })
    }

    #[must_use]
    pub fn column(&self) -> &Column {
        &self.column
    }

    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Positions where the mask is `true`. Missing entries do not select.
    #[must_use]
    pub fn selected_positions(&self) -> Vec<usize> {
        self.column
            .values()
            .iter()
            .enumerate()
            .filter(|(_, value)| matches!(value, Scalar::Bool(true)))
            .map(|(pos, _)| pos)
            .collect()
    }
}

/// Classified row key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum IndexingSpec {
    Empty,
    Map(GatherMap),
    Mask(BooleanMask),
    Slice(RowSlice),
    /// Exactly one row; drops a dimension when applied.
    Scalar(GatherMap),
}

impl IndexingSpec {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Map(_) => "map",
            Self::Mask(_) => "mask",
            Self::Slice(_) => "slice",
            Self::Scalar(_) => "scalar",
        }
    }
}
