#![forbid(unsafe_code)]

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::fmt;

use fp_columnar::{Column, ColumnError};
use fp_types::{DType, Scalar, compare_scalars};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label of a column in a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

impl IndexLabel {
    /// Interpret a scalar as a label. Only integers and strings name columns.
    #[must_use]
    pub fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Int64(v) => Some(Self::Int64(*v)),
            Scalar::UInt64(v) => i64::try_from(*v).ok().map(Self::Int64),
            Scalar::Utf8(v) => Some(Self::Utf8(v.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_scalar(&self) -> Scalar {
        match self {
            Self::Int64(v) => Scalar::Int64(*v),
            Self::Utf8(v) => Scalar::Utf8(v.clone()),
        }
    }
}

/// Detected ordering of the leading label level. Non-strict: runs of equal
/// labels are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Monotonic {
    Increasing,
    Decreasing,
    Neither,
}

fn detect_monotonic(labels: &[Scalar]) -> Monotonic {
    if labels.iter().any(Scalar::is_missing) {
        return Monotonic::Neither;
    }
    let mut increasing = true;
    let mut decreasing = true;
    for pair in labels.windows(2) {
        match compare_scalars(&pair[0], &pair[1]) {
            Some(Ordering::Less) => decreasing = false,
            Some(Ordering::Greater) => increasing = false,
            Some(Ordering::Equal) => {}
            None => return Monotonic::Neither,
        }
        if !increasing && !decreasing {
            return Monotonic::Neither;
        }
    }
    if increasing {
        Monotonic::Increasing
    } else {
        Monotonic::Decreasing
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("an index needs at least one label level")]
    NoLevels,
    #[error("index level length mismatch: expected {expected}, found {actual}")]
    LevelLengthMismatch { expected: usize, actual: usize },
    #[error("slice step cannot be zero")]
    ZeroSliceStep,
    #[error("slice bound {bound} not found in index")]
    BoundNotFound { bound: String },
    #[error("cannot get slice bound for non-unique label {bound}")]
    NonUniqueBound { bound: String },
    #[error("slice bound {bound} is not comparable with index dtype {dtype:?}")]
    IncomparableBound { bound: String, dtype: DType },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Normalized stepped position range, `range(start, stop, step)` semantics.
///
/// Endpoints are already resolved against the axis length: `stop` may be `-1`
/// for a descending walk that ends at position 0, and is never reinterpreted
/// as counting from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSlice {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl PositionSlice {
    #[must_use]
    pub fn full(len: usize) -> Self {
        Self {
            start: 0,
            stop: len_as_i64(len),
            step: 1,
        }
    }

    /// Resolve semi-open slice bounds against `len`. Negative bounds count
    /// from the end and results are clamped; a negative step walks backwards.
    pub fn from_bounds(
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
        len: usize,
    ) -> Result<Self, IndexError> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(IndexError::ZeroSliceStep);
        }
        let n = len_as_i64(len);
        let (lower, upper) = if step > 0 { (0, n) } else { (-1, n - 1) };
        let clamp = |bound: i64| {
            if bound < 0 {
                (bound.saturating_add(n)).max(lower)
            } else {
                bound.min(upper)
            }
        };
        let start = start.map_or(if step > 0 { lower } else { upper }, clamp);
        let stop = stop.map_or(if step > 0 { upper } else { lower }, clamp);
        Ok(Self { start, stop, step })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            self.stop - self.start
        } else {
            self.start - self.stop
        };
        if span <= 0 {
            return 0;
        }
        let step = self.step.unsigned_abs();
        usize::try_from(span.unsigned_abs().div_ceil(step)).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter_map(move |i| {
            let pos = self.start + (i as i64) * self.step;
            usize::try_from(pos).ok()
        })
    }
}

fn len_as_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

/// Ordered row labels, made of one or more parallel label levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    levels: Vec<Column>,
    #[serde(skip)]
    monotonic_cache: OnceCell<Monotonic>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.levels == other.levels
    }
}

impl Index {
    #[must_use]
    pub fn new(labels: Column) -> Self {
        Self {
            levels: vec![labels],
            monotonic_cache: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::new(Column::from_i64(values))
    }

    #[must_use]
    pub fn from_utf8<S: Into<String>>(values: Vec<S>) -> Self {
        Self::new(Column::from_utf8(values))
    }

    #[must_use]
    pub fn from_datetime_ns(values: Vec<i64>) -> Self {
        Self::new(Column::from_datetime_ns(values))
    }

    /// Default `0..len` integer labels.
    #[must_use]
    pub fn range(len: usize) -> Self {
        Self::new(Column::arange(len))
    }

    /// Multi-level index from parallel level columns of equal length.
    pub fn multi(levels: Vec<Column>) -> Result<Self, IndexError> {
        let expected = levels.first().ok_or(IndexError::NoLevels)?.len();
        if let Some(bad) = levels.iter().find(|level| level.len() != expected) {
            return Err(IndexError::LevelLengthMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(Self {
            levels,
            monotonic_cache: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.levels.len() > 1
    }

    #[must_use]
    pub fn levels(&self) -> &[Column] {
        &self.levels
    }

    #[must_use]
    pub fn level(&self, level: usize) -> Option<&Column> {
        self.levels.get(level)
    }

    /// Dtype of the leading level.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.levels[0].dtype()
    }

    #[must_use]
    pub fn is_datetime(&self) -> bool {
        !self.is_multi() && self.dtype() == DType::Datetime64
    }

    /// `true` if `value` occurs anywhere in the given level.
    #[must_use]
    pub fn level_contains(&self, level: usize, value: &Scalar) -> bool {
        self.levels
            .get(level)
            .is_some_and(|column| column.contains(value))
    }

    fn monotonic(&self) -> Monotonic {
        *self
            .monotonic_cache
            .get_or_init(|| detect_monotonic(self.levels[0].values()))
    }

    #[must_use]
    pub fn is_monotonic_increasing(&self) -> bool {
        matches!(self.monotonic(), Monotonic::Increasing)
    }

    #[must_use]
    pub fn is_monotonic_decreasing(&self) -> bool {
        match self.monotonic() {
            Monotonic::Decreasing => true,
            // An all-equal leading level is detected as increasing first.
            Monotonic::Increasing => self
                .levels[0]
                .values()
                .windows(2)
                .all(|w| w[0].semantic_eq(&w[1])),
            Monotonic::Neither => false,
        }
    }

    /// Gather label rows at `positions` across every level.
    pub fn gather(&self, positions: &[Option<usize>], nullify: bool) -> Result<Self, IndexError> {
        let levels = self
            .levels
            .iter()
            .map(|level| level.gather(positions, nullify))
            .collect::<Result<Vec<_>, _>>()?;
        Self::multi(levels)
    }

    pub fn take(&self, positions: &[usize]) -> Result<Self, IndexError> {
        let levels = self
            .levels
            .iter()
            .map(|level| level.take(positions))
            .collect::<Result<Vec<_>, _>>()?;
        Self::multi(levels)
    }

    /// Resolve a closed label interval `[start, stop]` on the leading level
    /// into a position slice.
    ///
    /// Sorted leading levels (ascending or descending, duplicates allowed)
    /// use binary search, so bounds need not be present. Unsorted levels
    /// require each given bound to occur exactly once. Bounds must already
    /// carry a dtype comparable with the labels.
    pub fn find_label_range(
        &self,
        start: Option<&Scalar>,
        stop: Option<&Scalar>,
        step: i64,
    ) -> Result<PositionSlice, IndexError> {
        if step == 0 {
            return Err(IndexError::ZeroSliceStep);
        }
        let labels = self.levels[0].values();
        let n = len_as_i64(labels.len());

        let (start_pos, stop_pos) = match self.monotonic() {
            Monotonic::Neither => {
                let start_pos = start.map(|b| self.unique_position(b)).transpose()?;
                let stop_pos = stop.map(|b| self.unique_position(b)).transpose()?;
                if step > 0 {
                    (start_pos.unwrap_or(0), stop_pos.map_or(n, |p| p + 1))
                } else {
                    (start_pos.unwrap_or(n - 1), stop_pos.map_or(-1, |p| p - 1))
                }
            }
            order => {
                for bound in [start, stop].into_iter().flatten() {
                    self.check_comparable(bound)?;
                }
                let descending = matches!(order, Monotonic::Decreasing);
                // left: first position not strictly before the bound.
                // right: first position strictly after the bound.
                let left = |bound: &Scalar| {
                    len_as_i64(labels.partition_point(|label| {
                        before(label, bound, descending) == Ordering::Less
                    }))
                };
                let right = |bound: &Scalar| {
                    len_as_i64(labels.partition_point(|label| {
                        before(label, bound, descending) != Ordering::Greater
                    }))
                };
                if step > 0 {
                    (start.map_or(0, left), stop.map_or(n, right))
                } else {
                    (
                        start.map_or(n - 1, |b| right(b) - 1),
                        stop.map_or(-1, |b| left(b) - 1),
                    )
                }
            }
        };

        Ok(PositionSlice {
            start: start_pos,
            stop: stop_pos,
            step,
        })
    }

    fn unique_position(&self, bound: &Scalar) -> Result<i64, IndexError> {
        let mut matches = self.levels[0]
            .values()
            .iter()
            .enumerate()
            .filter(|(_, label)| label.semantic_eq(bound))
            .map(|(pos, _)| pos);
        let first = matches.next().ok_or_else(|| IndexError::BoundNotFound {
            bound: format!("{bound:?}"),
        })?;
        if matches.next().is_some() {
            return Err(IndexError::NonUniqueBound {
                bound: format!("{bound:?}"),
            });
        }
        Ok(len_as_i64(first))
    }

    fn check_comparable(&self, bound: &Scalar) -> Result<(), IndexError> {
        let incomparable = || IndexError::IncomparableBound {
            bound: format!("{bound:?}"),
            dtype: self.dtype(),
        };
        if bound.is_missing() {
            return Err(incomparable());
        }
        match self.levels[0].values().first() {
            Some(label) if compare_scalars(label, bound).is_none() => Err(incomparable()),
            _ => Ok(()),
        }
    }
}

/// Position of `label` relative to `bound` in walk order of the level.
fn before(label: &Scalar, bound: &Scalar, descending: bool) -> Ordering {
    let ord = compare_scalars(label, bound).unwrap_or(Ordering::Equal);
    if descending { ord.reverse() } else { ord }
}

#[cfg(test)]
mod tests {
    use fp_columnar::Column;
    use fp_types::Scalar;

    use super::{Index, IndexError, IndexLabel, PositionSlice};

    fn positions(slice: PositionSlice) -> Vec<usize> {
        slice.positions().collect()
    }

    #[test]
    fn multi_level_requires_equal_lengths() {
        let err = Index::multi(vec![Column::from_i64(vec![1, 2]), Column::from_i64(vec![1])])
            .expect_err("ragged");
        assert_eq!(
            err,
            IndexError::LevelLengthMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(Index::multi(Vec::new()).expect_err("empty"), IndexError::NoLevels);
    }

    #[test]
    fn monotonic_detection_is_non_strict() {
        assert!(Index::from_i64(vec![1, 2, 2, 3]).is_monotonic_increasing());
        assert!(Index::from_i64(vec![3, 2, 2, 1]).is_monotonic_decreasing());
        let unsorted = Index::from_i64(vec![3, 1, 2]);
        assert!(!unsorted.is_monotonic_increasing());
        assert!(!unsorted.is_monotonic_decreasing());
        assert!(Index::from_i64(vec![]).is_monotonic_increasing());
    }

    #[test]
    fn slice_bounds_are_half_open() {
        let slice = PositionSlice::from_bounds(Some(1), Some(4), None, 5).expect("slice");
        assert_eq!(positions(slice), vec![1, 2, 3]);
    }

    #[test]
    fn slice_bounds_wrap_and_clamp() {
        let slice = PositionSlice::from_bounds(Some(-2), Some(100), None, 5).expect("slice");
        assert_eq!(positions(slice), vec![3, 4]);
        let reversed = PositionSlice::from_bounds(None, None, Some(-1), 4).expect("slice");
        assert_eq!(positions(reversed), vec![3, 2, 1, 0]);
        let stepped = PositionSlice::from_bounds(Some(4), Some(0), Some(-2), 5).expect("slice");
        assert_eq!(positions(stepped), vec![4, 2]);
        let empty = PositionSlice::from_bounds(Some(3), Some(1), None, 5).expect("slice");
        assert!(empty.is_empty());
        assert_eq!(
            PositionSlice::from_bounds(None, None, Some(0), 5).expect_err("zero step"),
            IndexError::ZeroSliceStep
        );
    }

    #[test]
    fn label_range_is_closed_on_sorted_index() {
        let index = Index::from_i64(vec![10, 20, 30, 40, 50]);
        let slice = index
            .find_label_range(Some(&Scalar::Int64(20)), Some(&Scalar::Int64(40)), 1)
            .expect("range");
        assert_eq!(positions(slice), vec![1, 2, 3]);
    }

    #[test]
    fn label_range_bounds_need_not_exist_when_sorted() {
        let index = Index::from_i64(vec![10, 20, 30, 40, 50]);
        let slice = index
            .find_label_range(Some(&Scalar::Int64(15)), Some(&Scalar::Int64(45)), 1)
            .expect("range");
        assert_eq!(positions(slice), vec![1, 2, 3]);
        let open = index
            .find_label_range(None, Some(&Scalar::Int64(20)), 1)
            .expect("range");
        assert_eq!(positions(open), vec![0, 1]);
    }

    #[test]
    fn label_range_includes_all_duplicates_of_bounds() {
        let index = Index::from_i64(vec![1, 2, 2, 3, 3, 4]);
        let slice = index
            .find_label_range(Some(&Scalar::Int64(2)), Some(&Scalar::Int64(3)), 1)
            .expect("range");
        assert_eq!(positions(slice), vec![1, 2, 3, 4]);
    }

    #[test]
    fn label_range_negative_step_walks_backwards() {
        let index = Index::from_i64(vec![10, 20, 30, 40, 50]);
        let slice = index
            .find_label_range(Some(&Scalar::Int64(40)), Some(&Scalar::Int64(20)), -1)
            .expect("range");
        assert_eq!(positions(slice), vec![3, 2, 1]);
        let to_start = index
            .find_label_range(Some(&Scalar::Int64(20)), None, -1)
            .expect("range");
        assert_eq!(positions(to_start), vec![1, 0]);
    }

    #[test]
    fn label_range_on_descending_index() {
        let index = Index::from_utf8(vec!["e", "d", "c", "b", "a"]);
        let slice = index
            .find_label_range(Some(&Scalar::from("d")), Some(&Scalar::from("b")), 1)
            .expect("range");
        assert_eq!(positions(slice), vec![1, 2, 3]);
    }

    #[test]
    fn label_range_on_unsorted_index_requires_unique_bounds() {
        let index = Index::from_utf8(vec!["c", "a", "d", "b"]);
        let slice = index
            .find_label_range(Some(&Scalar::from("a")), Some(&Scalar::from("b")), 1)
            .expect("range");
        assert_eq!(positions(slice), vec![1, 2, 3]);

        let err = index
            .find_label_range(Some(&Scalar::from("z")), None, 1)
            .expect_err("missing bound");
        assert!(matches!(err, IndexError::BoundNotFound { .. }));

        let dup = Index::from_utf8(vec!["b", "a", "b"]);
        let err = dup
            .find_label_range(Some(&Scalar::from("b")), None, 1)
            .expect_err("duplicate bound");
        assert!(matches!(err, IndexError::NonUniqueBound { .. }));
    }

    #[test]
    fn label_range_rejects_incomparable_bound() {
        let index = Index::from_i64(vec![1, 2, 3]);
        let err = index
            .find_label_range(Some(&Scalar::from("a")), None, 1)
            .expect_err("incomparable");
        assert!(matches!(err, IndexError::IncomparableBound { .. }));
    }

    #[test]
    fn gather_and_take_cover_every_level() {
        let index = Index::multi(vec![
            Column::from_utf8(vec!["a", "a", "b"]),
            Column::from_i64(vec![1, 2, 1]),
        ])
        .expect("multi");
        let taken = index.take(&[2, 0]).expect("take");
        assert_eq!(taken.level(0), Some(&Column::from_utf8(vec!["b", "a"])));
        assert_eq!(taken.level(1), Some(&Column::from_i64(vec![1, 1])));
        assert!(index.take(&[3]).is_err());
        let gathered = index.gather(&[None, Some(1)], true).expect("gather");
        assert_eq!(gathered.len(), 2);
        assert!(index.level_contains(1, &Scalar::Int64(2)));
        assert!(!index.level_contains(1, &Scalar::Int64(9)));
    }

    #[test]
    fn index_label_scalar_conversion() {
        assert_eq!(
            IndexLabel::from_scalar(&Scalar::from("a")),
            Some(IndexLabel::from("a"))
        );
        assert_eq!(IndexLabel::from_scalar(&Scalar::Float64(1.0)), None);
        assert_eq!(IndexLabel::Int64(3).to_scalar(), Scalar::Int64(3));
    }
}
