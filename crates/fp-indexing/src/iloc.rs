//! Position-mode row key classification.

use fp_index::{IndexError, PositionSlice};
use fp_types::Scalar;

use crate::error::IndexingError;
use crate::key::{AxisKey, SliceKey};
use crate::spec::{BooleanMask, GatherMap, IndexingSpec};

fn slice_bound(bound: Option<&Scalar>) -> Result<Option<i64>, IndexingError> {
    match bound {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value.as_position().map(Some).ok_or_else(|| {
            IndexingError::TypeMismatch(format!("slice indices must be integers, found {value:?}"))
        }),
    }
}

/// Resolve a positional slice against `len`: negative bounds count from the end, out-of-range bounds clamp.
pub(crate) fn position_slice(slice: &SliceKey, len: usize) -> Result<PositionSlice, IndexingError> {
    let start = slice_bound(slice.start.as_ref())?;
    let stop = slice_bound(slice.stop.as_ref())?;
    PositionSlice::from_bounds(start, stop, slice.step, len).map_err(|err| match err {
        IndexError::ZeroSliceStep => IndexingError::TypeMismatch("slice step cannot be zero".to_owned()),
        other => IndexingError::Index(other),
    })
}

/// Classify a positional row key against a frame of `n` rows.
///
/// Vector keys keep their order and repeats. Negative positions count from
/// the end; out-of-range positions fail here rather than at gather time.
pub fn parse_row_iloc_indexer(key: &AxisKey, n: usize) -> Result<IndexingSpec, IndexingError> {
    let spec = match key {
        AxisKey::Ellipsis => IndexingSpec::Slice(PositionSlice::full(n)),
        AxisKey::Slice(slice) => IndexingSpec::Slice(position_slice(slice, n)?),
        AxisKey::Scalar(Scalar::Bool(_)) => {
            return Err(IndexingError::TypeMismatch(
                "cannot index by location with a boolean scalar".to_owned(),
            ));
        }
        AxisKey::Scalar(value) => {
            let position = value.as_position().ok_or_else(|| {
                IndexingError::TypeMismatch(format!(
                    "cannot index by location with non-integer key {value:?}"
                ))
            })?;
            IndexingSpec::Scalar(GatherMap::from_positions(&[position], n, false)?)
        }
        AxisKey::LevelTuple(_) => return Err(IndexingError::NestedTuple),
        AxisKey::Array(array) => {
            let column = array.codes_or_plain();
            if column.dtype().is_bool() {
                IndexingSpec::Mask(BooleanMask::new(column.clone(), n)?)
            } else if column.is_empty() {
                IndexingSpec::Empty
            } else if column.dtype().is_integer() {
                IndexingSpec::Map(GatherMap::new(column, n, false)?)
            } else {
                return Err(IndexingError::TypeMismatch(format!(
                    "cannot index by location with non-integer key of dtype {:?}",
                    column.dtype()
                )));
            }
        }
    };
    tracing::debug!(spec = spec.name(), rows = n, "classified positional row key");
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use fp_columnar::{Categorical, Column};
    use fp_index::PositionSlice;
    use fp_types::{NullKind, Scalar};

    use super::parse_row_iloc_indexer;
    use crate::error::{IndexingError, IndexingErrorKind};
    use crate::key::{ArrayKey, AxisKey, SliceKey};
    use crate::spec::IndexingSpec;

    fn array(column: Column) -> AxisKey {
        AxisKey::Array(ArrayKey::Plain(column))
    }

    fn slice_positions(spec: &IndexingSpec) -> Vec<usize> {
        match spec {
            IndexingSpec::Slice(slice) => slice.positions().collect(),
            other => panic!("expected slice, got {other:?}"),
        }
    }

    #[test]
    fn ellipsis_selects_every_row() {
        let spec = parse_row_iloc_indexer(&AxisKey::Ellipsis, 4).expect("ellipsis");
        assert_eq!(spec, IndexingSpec::Slice(PositionSlice::full(4)));
    }

    #[test]
    fn slice_is_half_open() {
        let key = AxisKey::Slice(SliceKey::between(1_i64, 4_i64));
        let spec = parse_row_iloc_indexer(&key, 5).expect("slice");
        assert_eq!(slice_positions(&spec), vec![1, 2, 3]);
    }

    #[test]
    fn slice_bounds_wrap_and_clamp() {
        let key = AxisKey::Slice(SliceKey::starting_at(-2_i64));
        assert_eq!(
            slice_positions(&parse_row_iloc_indexer(&key, 5).expect("negative")),
            vec![3, 4]
        );
        let key = AxisKey::Slice(SliceKey::full().with_step(-2));
        assert_eq!(
            slice_positions(&parse_row_iloc_indexer(&key, 5).expect("reverse")),
            vec![4, 2, 0]
        );
        let key = AxisKey::Slice(SliceKey::between(3_i64, 1_i64));
        assert_eq!(
            slice_positions(&parse_row_iloc_indexer(&key, 5).expect("empty")),
            Vec::<usize>::new()
        );
    }

    #[test]
    fn slice_rejects_zero_step_and_label_bounds() {
        let key = AxisKey::Slice(SliceKey::full().with_step(0));
        let err = parse_row_iloc_indexer(&key, 5).expect_err("zero step");
        assert_eq!(err.kind(), IndexingErrorKind::TypeMismatch);
        let key = AxisKey::Slice(SliceKey::between("a", "b"));
        let err = parse_row_iloc_indexer(&key, 5).expect_err("labels");
        assert_eq!(err.kind(), IndexingErrorKind::TypeMismatch);
    }

    #[test]
    fn integer_scalar_is_a_single_position() {
        let spec = parse_row_iloc_indexer(&AxisKey::Scalar(Scalar::Int64(-1)), 3).expect("scalar");
        match spec {
            IndexingSpec::Scalar(map) => assert_eq!(map.positions(), &[Some(2)]),
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_scalar_is_out_of_bounds() {
        let err = parse_row_iloc_indexer(&AxisKey::Scalar(Scalar::Int64(3)), 3).expect_err("oob");
        assert_eq!(err, IndexingError::OutOfBounds { position: 3, len: 3 });
    }

    #[test]
    fn non_integer_scalars_are_type_errors() {
        for value in [Scalar::Float64(1.0), Scalar::Bool(true), Scalar::from("a")] {
            let err = parse_row_iloc_indexer(&AxisKey::Scalar(value), 3).expect_err("type");
            assert_eq!(err.kind(), IndexingErrorKind::TypeMismatch);
        }
    }

    #[test]
    fn integer_vector_keeps_order_and_repeats() {
        let spec = parse_row_iloc_indexer(&array(Column::from_i64(vec![2, 0, 2, -1])), 3)
            .expect("map");
        match spec {
            IndexingSpec::Map(map) => {
                assert_eq!(map.positions(), &[Some(2), Some(0), Some(2), Some(2)]);
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn boolean_vector_is_a_mask() {
        let spec = parse_row_iloc_indexer(&array(Column::from_bools(vec![true, false, true])), 3)
            .expect("mask");
        match spec {
            IndexingSpec::Mask(mask) => assert_eq!(mask.selected_positions(), vec![0, 2]),
            other => panic!("expected mask, got {other:?}"),
        }
    }

    #[test]
    fn boolean_vector_of_wrong_length_is_never_truncated() {
        let err = parse_row_iloc_indexer(&array(Column::from_bools(vec![true])), 3)
            .expect_err("length");
        assert_eq!(
            err,
            IndexingError::MaskLengthMismatch {
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn empty_vector_is_empty() {
        let spec = parse_row_iloc_indexer(&array(Column::from_f64(vec![])), 3).expect("empty");
        assert_eq!(spec, IndexingSpec::Empty);
    }

    #[test]
    fn float_vector_is_a_type_error() {
        let err = parse_row_iloc_indexer(&array(Column::from_f64(vec![1.0])), 3).expect_err("type");
        assert_eq!(err.kind(), IndexingErrorKind::TypeMismatch);
    }

    #[test]
    fn null_positions_are_type_errors() {
        let column = Column::from_values(vec![Scalar::Int64(0), Scalar::Null(NullKind::Null)])
            .expect("column");
        let err = parse_row_iloc_indexer(&array(column), 3).expect_err("null");
        assert_eq!(err.kind(), IndexingErrorKind::TypeMismatch);
    }

    #[test]
    fn categorical_keys_use_codes() {
        let cat = Categorical::from_values(&Column::from_utf8(vec!["z", "y", "z"]))
            .expect("categorical");
        let spec = parse_row_iloc_indexer(&AxisKey::Array(ArrayKey::Categorical(cat)), 3)
            .expect("codes");
        match spec {
            IndexingSpec::Map(map) => assert_eq!(map.positions(), &[Some(0), Some(1), Some(0)]),
            other => panic!("expected map, got {other:?}"),
        }
    }
}
