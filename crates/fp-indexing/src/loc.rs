//! Label-mode row key classification.

use fp_columnar::Column;
use fp_index::{Index, PositionSlice};
use fp_runtime::{EvidenceLedger, RuntimePolicy};
use fp_types::{DType, Scalar};

use crate::error::IndexingError;
use crate::key::{AxisKey, KeyShape, SliceKey, classify_shape};
use crate::ordered_find::{ordered_find_multi_with_policy, reconcile_needles};
use crate::spec::{BooleanMask, IndexingSpec};

/// Parse string (or integer nanosecond) labels into a datetime level's dtype.
fn coerce_to_datetime(column: &Column) -> Result<Column, IndexingError> {
    column
        .astype(DType::Datetime64)
        .map_err(|err| IndexingError::ValueCoercion {
            dtype: DType::Datetime64,
            detail: err.to_string(),
        })
}

/// Needles ready to be looked up in `level`.
fn prepare_needles(needles: &Column, level: &Column) -> Result<Column, IndexingError> {
    if level.dtype() == DType::Datetime64 {
        coerce_to_datetime(needles)
    } else {
        Ok(needles.clone())
    }
}

/// Reconcile a label slice bound to the leading level's dtype.
///
/// On a sorted level a numeric bound only has to be ordered against the
/// labels, so it is passed through uncast and may fall between them. An
/// unsorted level locates bounds by equality and needs a lossless cast.
fn slice_bound(bound: Option<&Scalar>, index: &Index) -> Result<Option<Scalar>, IndexingError> {
    let Some(value) = bound.filter(|value| !value.is_null()) else {
        return Ok(None);
    };
    let Some(level) = index.level(0) else {
        return Ok(Some(value.clone()));
    };
    let column = prepare_needles(&Column::from_values(vec![value.clone()])?, level)?;
    let sorted = index.is_monotonic_increasing() || index.is_monotonic_decreasing();
    let numeric = column.dtype().kind().is_numeric_family()
        && level.dtype().kind().is_numeric_family();
    if sorted && numeric {
        return Ok(column.values().first().cloned());
    }
    let reconciled = reconcile_needles(&column, level.dtype())?;
    Ok(reconciled.values().first().cloned())
}

fn label_slice(slice: &SliceKey, index: &Index) -> Result<IndexingSpec, IndexingError> {
    let step = slice.step.unwrap_or(1);
    if step == 0 {
        return Err(IndexingError::TypeMismatch(
            "slice step cannot be zero".to_owned(),
        ));
    }
    let start = slice_bound(slice.start.as_ref(), index)?;
    let stop = slice_bound(slice.stop.as_ref(), index)?;
    let range = index.find_label_range(start.as_ref(), stop.as_ref(), step)?;
    if range.is_empty() {
        Ok(IndexingSpec::Empty)
    } else {
        Ok(IndexingSpec::Slice(range))
    }
}

/// Look up one label per level (for the first `needles.len()` levels).
/// Collapses to `Scalar` only when every level is keyed, the key was a
/// scalar and exactly one row matched.
fn lookup(
    needles: &[Column],
    collapse: bool,
    index: &Index,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<IndexingSpec, IndexingError> {
    let prepared = needles
        .iter()
        .zip(index.levels())
        .map(|(needle, level)| prepare_needles(needle, level))
        .collect::<Result<Vec<_>, _>>()?;
    let needle_refs: Vec<&Column> = prepared.iter().collect();
    let haystack_refs: Vec<&Column> = index.levels().iter().take(needles.len()).collect();
    let map = ordered_find_multi_with_policy(&needle_refs, &haystack_refs, policy, ledger)?;

    let covers_all_levels = needles.len() == index.nlevels();
    if collapse && covers_all_levels && map.len() == 1 {
        Ok(IndexingSpec::Scalar(map))
    } else {
        Ok(IndexingSpec::Map(map))
    }
}

pub fn parse_row_loc_indexer(key: &AxisKey, index: &Index) -> Result<IndexingSpec, IndexingError> {
    parse_row_loc_indexer_with_policy(key, index, &RuntimePolicy::default(), &mut EvidenceLedger::new())
}

/// Classify a label row key against `index`.
///
/// Label slices are closed on both ends. Boolean vectors are masks; a
/// boolean scalar is a label. Other keys are looked up in order, failing
/// with `KeyNotFound` when any label is absent.
pub fn parse_row_loc_indexer_with_policy(
    key: &AxisKey,
    index: &Index,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<IndexingSpec, IndexingError> {
    let n = index.len();
    let spec = match (classify_shape(key), key) {
        (KeyShape::Ellipsis, _) => IndexingSpec::Slice(PositionSlice::full(n)),
        (KeyShape::Slice, AxisKey::Slice(slice)) => label_slice(slice, index)?,
        (KeyShape::Scalar, AxisKey::Scalar(value)) => {
            let needles = Column::from_values(vec![value.clone()])?;
            lookup(&[needles], true, index, policy, ledger)?
        }
        (KeyShape::LevelTuple, AxisKey::LevelTuple(parts)) => {
            if parts.len() > index.nlevels() {
                return Err(IndexingError::TooManyIndexers {
                    got: parts.len(),
                    expected: index.nlevels(),
                });
            }
            if parts.is_empty() {
                IndexingSpec::Slice(PositionSlice::full(n))
            } else {
                let needles = parts
                    .iter()
                    .map(|part| Column::from_values(vec![part.clone()]))
                    .collect::<Result<Vec<_>, _>>()?;
                lookup(&needles, true, index, policy, ledger)?
            }
        }
        (KeyShape::BooleanVector, AxisKey::Array(array)) => {
            IndexingSpec::Mask(BooleanMask::new(array.decoded()?.into_owned(), n)?)
        }
        (KeyShape::Vector, AxisKey::Array(array)) if array.is_empty() => IndexingSpec::Empty,
        (KeyShape::Vector, AxisKey::Array(array)) => {
            let needles = array.decoded()?.into_owned();
            lookup(&[needles], false, index, policy, ledger)?
        }
        (shape, _) => {
            return Err(IndexingError::TypeMismatch(format!(
                "unsupported label key shape {shape:?}"
            )));
        }
    };
    tracing::debug!(spec = spec.name(), rows = n, "classified label row key");
    Ok(spec)
}
