//! `iloc` / `loc` entry points: destructure, classify, then apply.

use fp_columnar::Column;
use fp_frame::{DataFrame, FrameError, Series};
use fp_index::{Index, IndexLabel, PositionSlice};
use fp_runtime::{EvidenceLedger, RuntimePolicy};
use fp_types::Scalar;

use crate::columns::ColumnSelection;
use crate::destructure::{
    destructure_dataframe_iloc_indexer, destructure_dataframe_loc_indexer_with_policy,
    destructure_series_iloc_indexer, destructure_series_loc_indexer_with_policy,
};
use crate::error::IndexingError;
use crate::iloc::parse_row_iloc_indexer;
use crate::key::Key;
use crate::loc::parse_row_loc_indexer_with_policy;
use crate::spec::IndexingSpec;

/// Result of indexing a series or frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Scalar(Scalar),
    Series(Series),
    DataFrame(DataFrame),
}

impl Selection {
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_series(&self) -> Option<&Series> {
        match self {
            Self::Series(series) => Some(series),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dataframe(&self) -> Option<&DataFrame> {
        match self {
            Self::DataFrame(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Containers whose rows can be gathered by position.
trait RowGather: Sized {
    fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError>;
    fn gather_rows(&self, positions: &[Option<usize>], nullify: bool) -> Result<Self, FrameError>;
    fn slice_rows(&self, slice: PositionSlice) -> Result<Self, FrameError>;
}

impl RowGather for Series {
    fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        Series::take_rows(self, positions)
    }

    fn gather_rows(&self, positions: &[Option<usize>], nullify: bool) -> Result<Self, FrameError> {
        Series::gather_rows(self, positions, nullify)
    }

    fn slice_rows(&self, slice: PositionSlice) -> Result<Self, FrameError> {
        Series::slice_rows(self, slice)
    }
}

impl RowGather for DataFrame {
    fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        DataFrame::take_rows(self, positions)
    }

    fn gather_rows(&self, positions: &[Option<usize>], nullify: bool) -> Result<Self, FrameError> {
        DataFrame::gather_rows(self, positions, nullify)
    }

    fn slice_rows(&self, slice: PositionSlice) -> Result<Self, FrameError> {
        DataFrame::slice_rows(self, slice)
    }
}

/// Row position of a `Scalar` spec.
fn scalar_row(spec: &IndexingSpec) -> Option<usize> {
    match spec {
        IndexingSpec::Scalar(map) => match map.positions() {
            [Some(row)] => Some(*row),
            _ => None,
        },
        _ => None,
    }
}

/// Apply a non-scalar row spec, keeping the row dimension.
fn gather_rows<T: RowGather>(source: &T, spec: &IndexingSpec) -> Result<T, IndexingError> {
    let out = match spec {
        IndexingSpec::Empty => source.take_rows(&[])?,
        IndexingSpec::Map(map) | IndexingSpec::Scalar(map) => {
            source.gather_rows(map.positions(), map.nullify())?
        }
        IndexingSpec::Mask(mask) => source.take_rows(&mask.selected_positions())?,
        IndexingSpec::Slice(slice) => source.slice_rows(*slice)?,
    };
    Ok(out)
}

fn label_text(value: &Scalar) -> String {
    IndexLabel::from_scalar(value).map_or_else(|| format!("{value:?}"), |label| label.to_string())
}

/// Name of a single row: its label, or the level labels joined for a
/// multi-level index.
fn row_name(index: &Index, row: usize) -> String {
    index
        .levels()
        .iter()
        .filter_map(|level| level.value(row))
        .map(label_text)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Index built from column labels; integer when every label is.
fn label_index(labels: &[IndexLabel]) -> Index {
    let ints: Option<Vec<i64>> = labels
        .iter()
        .map(|label| match label {
            IndexLabel::Int64(v) => Some(*v),
            IndexLabel::Utf8(_) => None,
        })
        .collect();
    match ints {
        Some(ints) => Index::from_i64(ints),
        None => Index::from_utf8(labels.iter().map(ToString::to_string).collect()),
    }
}

fn apply_series(series: &Series, spec: &IndexingSpec) -> Result<Selection, IndexingError> {
    if let Some(row) = scalar_row(spec) {
        let value = series
            .column()
            .value(row)
            .cloned()
            .ok_or(IndexingError::OutOfBounds {
                position: i64::try_from(row).unwrap_or(i64::MAX),
                len: series.len(),
            })?;
        return Ok(Selection::Scalar(value));
    }
    Ok(Selection::Series(gather_rows(series, spec)?))
}

fn apply_dataframe(
    frame: &DataFrame,
    spec: &IndexingSpec,
    selection: ColumnSelection,
) -> Result<Selection, IndexingError> {
    let narrowed = frame.with_columns(selection.columns)?;

    if let Some(row) = scalar_row(spec) {
        let values: Vec<Scalar> = narrowed
            .columns()
            .columns()
            .iter()
            .filter_map(|column| column.value(row).cloned())
            .collect();
        if selection.is_scalar {
            return values
                .into_iter()
                .next()
                .map(Selection::Scalar)
                .ok_or(IndexingError::ScalarColumnInvariant { selected: 0 });
        }
        let series = Series::new(
            row_name(frame.index(), row),
            label_index(narrowed.columns().labels()),
            Column::from_values(values)?,
        )?;
        return Ok(Selection::Series(series));
    }

    let rows = gather_rows(&narrowed, spec)?;
    if selection.is_scalar {
        let Some((label, column)) = rows.columns().iter().next() else {
            return Err(IndexingError::ScalarColumnInvariant { selected: 0 });
        };
        let series = Series::new(label.to_string(), rows.index().clone(), column.clone())?;
        return Ok(Selection::Series(series));
    }
    Ok(Selection::DataFrame(rows))
}

/// `iloc` and `loc` on series and frames.
///
/// A scalar row key drops the row dimension and a scalar column key drops
/// the column dimension, so `frame.loc((row, col))` yields a [`Scalar`].
pub trait IndexingExt {
    fn iloc(&self, key: impl Into<Key>) -> Result<Selection, IndexingError>;

    fn loc_with_policy(
        &self,
        key: impl Into<Key>,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Result<Selection, IndexingError>;

    fn loc(&self, key: impl Into<Key>) -> Result<Selection, IndexingError> {
        self.loc_with_policy(key, &RuntimePolicy::default(), &mut EvidenceLedger::new())
    }
}

impl IndexingExt for Series {
    fn iloc(&self, key: impl Into<Key>) -> Result<Selection, IndexingError> {
        let _span = tracing::debug_span!("series_iloc", rows = self.len()).entered();
        let rows = destructure_series_iloc_indexer(key.into(), self)?;
        let spec = parse_row_iloc_indexer(&rows, self.len())?;
        apply_series(self, &spec)
    }

    fn loc_with_policy(
        &self,
        key: impl Into<Key>,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Result<Selection, IndexingError> {
        let _span = tracing::debug_span!("series_loc", rows = self.len()).entered();
        let rows = destructure_series_loc_indexer_with_policy(key.into(), self, policy, ledger)?;
        let spec = parse_row_loc_indexer_with_policy(&rows, self.index(), policy, ledger)?;
        apply_series(self, &spec)
    }
}

impl IndexingExt for DataFrame {
    fn iloc(&self, key: impl Into<Key>) -> Result<Selection, IndexingError> {
        let _span = tracing::debug_span!(
            "dataframe_iloc",
            rows = self.len(),
            columns = self.num_columns()
        )
        .entered();
        let (rows, selection) = destructure_dataframe_iloc_indexer(key.into(), self)?;
        let spec = parse_row_iloc_indexer(&rows, self.len())?;
        apply_dataframe(self, &spec, selection)
    }

    fn loc_with_policy(
        &self,
        key: impl Into<Key>,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Result<Selection, IndexingError> {
        let _span = tracing::debug_span!(
            "dataframe_loc",
            rows = self.len(),
            columns = self.num_columns()
        )
        .entered();
        let (rows, selection) =
            destructure_dataframe_loc_indexer_with_policy(key.into(), self, policy, ledger)?;
        let spec = parse_row_loc_indexer_with_policy(&rows, self.index(), policy, ledger)?;
        apply_dataframe(self, &spec, selection)
    }
}
