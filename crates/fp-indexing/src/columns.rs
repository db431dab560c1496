//! Column-axis key resolution for two-dimensional frames.

use fp_columnar::Column;
use fp_frame::{ColumnAccessor, LabelSelector, PositionSelector};
use fp_index::IndexLabel;
use fp_types::Scalar;

use crate::error::IndexingError;
use crate::iloc::position_slice;
use crate::key::{AxisKey, SliceKey};

/// Columns picked by the column half of a frame key.
///
/// `is_scalar` marks a key that named exactly one column; applying the row
/// spec then drops the column dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSelection {
    pub is_scalar: bool,
    pub columns: ColumnAccessor,
}

impl ColumnSelection {
    fn new(is_scalar: bool, columns: ColumnAccessor) -> Result<Self, IndexingError> {
        if is_scalar && columns.len() != 1 {
            return Err(IndexingError::ScalarColumnInvariant {
                selected: columns.len(),
            });
        }
        Ok(Self { is_scalar, columns })
    }
}

fn bool_values(column: &Column) -> Vec<bool> {
    column
        .values()
        .iter()
        .map(|value| matches!(value, Scalar::Bool(true)))
        .collect()
}

fn integer_positions(column: &Column) -> Result<Vec<i64>, IndexingError> {
    column
        .values()
        .iter()
        .map(|value| {
            value.as_position().ok_or_else(|| {
                IndexingError::TypeMismatch(format!(
                    "column positions must be integers, found {value:?}"
                ))
            })
        })
        .collect()
}

fn column_label(value: &Scalar) -> Result<IndexLabel, IndexingError> {
    IndexLabel::from_scalar(value).ok_or_else(|| {
        IndexingError::TypeMismatch(format!("{value:?} cannot be a column label"))
    })
}

/// Resolve a positional column key.
pub fn resolve_iloc_columns(
    key: &AxisKey,
    columns: &ColumnAccessor,
) -> Result<ColumnSelection, IndexingError> {
    let (is_scalar, selector) = match key {
        AxisKey::Ellipsis => (false, PositionSelector::All),
        AxisKey::Slice(slice) => (
            false,
            PositionSelector::Slice(position_slice(slice, columns.len())?),
        ),
        AxisKey::Scalar(Scalar::Bool(_)) => {
            return Err(IndexingError::TypeMismatch(
                "cannot select a column by location with a boolean scalar".to_owned(),
            ));
        }
        AxisKey::Scalar(value) => {
            let position = value.as_position().ok_or_else(|| {
                IndexingError::TypeMismatch(format!(
                    "cannot select a column by location with {value:?}"
                ))
            })?;
            (true, PositionSelector::Position(position))
        }
        AxisKey::Array(array) => {
            let column = array.codes_or_plain();
            if column.dtype().is_bool() {
                (false, PositionSelector::Mask(bool_values(column)))
            } else if column.is_empty() || column.dtype().is_integer() {
                (false, PositionSelector::Positions(integer_positions(column)?))
            } else {
                return Err(IndexingError::TypeMismatch(format!(
                    "cannot select columns by location with dtype {:?}",
                    column.dtype()
                )));
            }
        }
        AxisKey::LevelTuple(_) => {
            return Err(IndexingError::TypeMismatch(
                "tuple keys are not valid column positions".to_owned(),
            ));
        }
    };
    ColumnSelection::new(is_scalar, columns.select_by_index(&selector)?)
}

fn label_slice(slice: &SliceKey) -> Result<LabelSelector, IndexingError> {
    let step = slice.step.unwrap_or(1);
    if step == 0 {
        return Err(IndexingError::TypeMismatch(
            "slice step cannot be zero".to_owned(),
        ));
    }
    let bound = |value: Option<&Scalar>| match value {
        Some(value) if !value.is_null() => column_label(value).map(Some),
        _ => Ok(None),
    };
    Ok(LabelSelector::Slice {
        start: bound(slice.start.as_ref())?,
        stop: bound(slice.stop.as_ref())?,
        step,
    })
}

/// Resolve a label column key. Labels absent from `columns` fail with
/// `KeyNotFound`; a label repeated across columns cannot be a scalar key.
pub fn resolve_loc_columns(
    key: &AxisKey,
    columns: &ColumnAccessor,
) -> Result<ColumnSelection, IndexingError> {
    let (is_scalar, selector) = match key {
        AxisKey::Ellipsis => (false, LabelSelector::All),
        AxisKey::Slice(slice) => (false, label_slice(slice)?),
        AxisKey::Scalar(value) => (true, LabelSelector::Label(column_label(value)?)),
        AxisKey::Array(array) => {
            let values = array.decoded()?;
            if values.dtype().is_bool() {
                (false, LabelSelector::Mask(bool_values(&values)))
            } else {
                let labels = values
                    .values()
                    .iter()
                    .map(column_label)
                    .collect::<Result<Vec<_>, _>>()?;
                (false, LabelSelector::Labels(labels))
            }
        }
        AxisKey::LevelTuple(_) => {
            return Err(IndexingError::TypeMismatch(
                "tuple keys are not valid column labels".to_owned(),
            ));
        }
    };
    ColumnSelection::new(is_scalar, columns.select_by_label(&selector)?)
}
