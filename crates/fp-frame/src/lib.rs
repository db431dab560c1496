#![forbid(unsafe_code)]

use fp_columnar::{Column, ColumnError};
use fp_index::{Index, IndexError, IndexLabel, PositionSlice};
use fp_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("index length ({index_len}) does not match column length ({column_len})")]
    LengthMismatch { index_len: usize, column_len: usize },
    #[error("column position {position} out of bounds for {len} columns")]
    ColumnPositionOutOfBounds { position: i64, len: usize },
    #[error("column label not found: {0}")]
    ColumnLabelNotFound(String),
    #[error("boolean column mask has length {actual}, expected {expected}")]
    MaskLengthMismatch { expected: usize, actual: usize },
    #[error("column label slice bound {0} appears more than once")]
    NonUniqueColumnBound(String),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Read-only view shared by one- and two-dimensional containers.
pub trait Frame {
    /// `1` for a series, `2` for a frame.
    fn ndim(&self) -> usize;

    /// Number of rows.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self) -> &Index;

    /// Column labels and data. `None` for one-dimensional containers.
    fn column_accessor(&self) -> Option<&ColumnAccessor>;
}

fn normalize_position(position: i64, len: usize) -> Result<usize, FrameError> {
    let out_of_bounds = || FrameError::ColumnPositionOutOfBounds { position, len };
    let len_i64 = i64::try_from(len).map_err(|_| out_of_bounds())?;
    let normalized = if position < 0 {
        position + len_i64
    } else {
        position
    };
    if normalized < 0 || normalized >= len_i64 {
        return Err(out_of_bounds());
    }
    usize::try_from(normalized).map_err(|_| out_of_bounds())
}

// ── Column accessor ────────────────────────────────────────────────────

/// Position-based column selection, already normalized to concrete forms.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSelector {
    All,
    Position(i64),
    Slice(PositionSlice),
    Positions(Vec<i64>),
    Mask(Vec<bool>),
}

/// Label-based column selection. `Slice` is closed on both ends.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelSelector {
    All,
    Label(IndexLabel),
    Slice {
        start: Option<IndexLabel>,
        stop: Option<IndexLabel>,
        step: i64,
    },
    Labels(Vec<IndexLabel>),
    Mask(Vec<bool>),
}

/// Ordered `(label, column)` pairs. Duplicate labels are allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnAccessor {
    labels: Vec<IndexLabel>,
    columns: Vec<Column>,
}

impl ColumnAccessor {
    /// Build from pairs. All columns must share one length.
    pub fn new(pairs: Vec<(IndexLabel, Column)>) -> Result<Self, FrameError> {
        if let Some(first) = pairs.first() {
            let expected = first.1.len();
            if let Some((_, bad)) = pairs.iter().find(|(_, c)| c.len() != expected) {
                return Err(FrameError::LengthMismatch {
                    index_len: expected,
                    column_len: bad.len(),
                });
            }
        }
        let (labels, columns) = pairs.into_iter().unzip();
        Ok(Self { labels, columns })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexLabel, &Column)> {
        self.labels.iter().zip(&self.columns)
    }

    /// Row count of the stored columns, if there are any.
    #[must_use]
    pub fn row_count(&self) -> Option<usize> {
        self.columns.first().map(Column::len)
    }

    #[must_use]
    pub fn contains_label(&self, label: &IndexLabel) -> bool {
        self.labels.contains(label)
    }

    /// First column stored under `label`.
    #[must_use]
    pub fn get(&self, label: &IndexLabel) -> Option<&Column> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|pos| &self.columns[pos])
    }

    fn pick(&self, positions: impl IntoIterator<Item = usize>) -> Self {
        let (labels, columns) = positions
            .into_iter()
            .map(|pos| (self.labels[pos].clone(), self.columns[pos].clone()))
            .unzip();
        Self { labels, columns }
    }

    fn positions_of(&self, label: &IndexLabel) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| *l == label)
            .map(|(pos, _)| pos)
            .collect()
    }

    fn check_mask(&self, mask: &[bool]) -> Result<(), FrameError> {
        if mask.len() != self.len() {
            return Err(FrameError::MaskLengthMismatch {
                expected: self.len(),
                actual: mask.len(),
            });
        }
        Ok(())
    }

    /// Select columns by position. Negative positions count from the end.
    pub fn select_by_index(&self, selector: &PositionSelector) -> Result<Self, FrameError> {
        let len = self.len();
        match selector {
            PositionSelector::All => Ok(self.clone()),
            PositionSelector::Position(position) => {
                Ok(self.pick([normalize_position(*position, len)?]))
            }
            PositionSelector::Slice(slice) => Ok(self.pick(slice.positions().filter(|&p| p < len))),
            PositionSelector::Positions(positions) => {
                let resolved = positions
                    .iter()
                    .map(|&p| normalize_position(p, len))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.pick(resolved))
            }
            PositionSelector::Mask(mask) => {
                self.check_mask(mask)?;
                Ok(self.pick(mask.iter().enumerate().filter(|(_, m)| **m).map(|(p, _)| p)))
            }
        }
    }

    /// Select columns by label. Missing labels fail closed; a label slice
    /// includes both endpoints.
    pub fn select_by_label(&self, selector: &LabelSelector) -> Result<Self, FrameError> {
        match selector {
            LabelSelector::All => Ok(self.clone()),
            LabelSelector::Label(label) => {
                let positions = self.positions_of(label);
                if positions.is_empty() {
                    return Err(FrameError::ColumnLabelNotFound(label.to_string()));
                }
                Ok(self.pick(positions))
            }
            LabelSelector::Labels(labels) => {
                let mut positions = Vec::with_capacity(labels.len());
                for label in labels {
                    let found = self.positions_of(label);
                    if found.is_empty() {
                        return Err(FrameError::ColumnLabelNotFound(label.to_string()));
                    }
                    positions.extend(found);
                }
                Ok(self.pick(positions))
            }
            LabelSelector::Slice { start, stop, step } => {
                let step = if *step == 0 { 1 } else { *step };
                let n = i64::try_from(self.len()).unwrap_or(i64::MAX);
                let start_pos = start
                    .as_ref()
                    .map(|label| self.unique_position(label))
                    .transpose()?;
                let stop_pos = stop
                    .as_ref()
                    .map(|label| self.unique_position(label))
                    .transpose()?;
                let slice = if step > 0 {
                    PositionSlice {
                        start: start_pos.unwrap_or(0),
                        stop: stop_pos.map_or(n, |p| p + 1),
                        step,
                    }
                } else {
                    PositionSlice {
                        start: start_pos.unwrap_or(n - 1),
                        stop: stop_pos.map_or(-1, |p| p - 1),
                        step,
                    }
                };
                Ok(self.pick(slice.positions().collect::<Vec<_>>()))
            }
            LabelSelector::Mask(mask) => {
                self.check_mask(mask)?;
                Ok(self.pick(mask.iter().enumerate().filter(|(_, m)| **m).map(|(p, _)| p)))
            }
        }
    }

    fn unique_position(&self, label: &IndexLabel) -> Result<i64, FrameError> {
        match self.positions_of(label).as_slice() {
            [] => Err(FrameError::ColumnLabelNotFound(label.to_string())),
            [pos] => Ok(i64::try_from(*pos).unwrap_or(i64::MAX)),
            _ => Err(FrameError::NonUniqueColumnBound(label.to_string())),
        }
    }

    fn map_columns(
        &self,
        f: impl Fn(&Column) -> Result<Column, ColumnError>,
    ) -> Result<Self, FrameError> {
        let columns = self
            .columns
            .iter()
            .map(f)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            labels: self.labels.clone(),
            columns,
        })
    }
}

// ── Series ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: String,
    index: Index,
    column: Column,
}

impl Series {
    pub fn new(name: impl Into<String>, index: Index, column: Column) -> Result<Self, FrameError> {
        if index.len() != column.len() {
            return Err(FrameError::LengthMismatch {
                index_len: index.len(),
                column_len: column.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            index,
            column,
        })
    }

    pub fn from_values(
        name: impl Into<String>,
        index: Index,
        values: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        let column = Column::from_values(values)?;
        Self::new(name, index, column)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn column(&self) -> &Column {
        &self.column
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        self.column.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.column.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    /// Rows at `positions`, in order, duplicates preserved.
    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        Self::new(
            self.name.clone(),
            self.index.take(positions)?,
            self.column.take(positions)?,
        )
    }

    /// Rows at `positions`; with `nullify`, `None` rows become missing
    /// values under a missing label.
    pub fn gather_rows(&self, positions: &[Option<usize>], nullify: bool) -> Result<Self, FrameError> {
        Self::new(
            self.name.clone(),
            self.index.gather(positions, nullify)?,
            self.column.gather(positions, nullify)?,
        )
    }

    pub fn slice_rows(&self, slice: PositionSlice) -> Result<Self, FrameError> {
        let positions: Vec<usize> = slice.positions().collect();
        self.take_rows(&positions)
    }
}

impl Frame for Series {
    fn ndim(&self) -> usize {
        1
    }

    fn len(&self) -> usize {
        self.column.len()
    }

    fn index(&self) -> &Index {
        &self.index
    }

    fn column_accessor(&self) -> Option<&ColumnAccessor> {
        None
    }
}

// ── DataFrame ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    index: Index,
    columns: ColumnAccessor,
}

impl DataFrame {
    pub fn new(index: Index, columns: ColumnAccessor) -> Result<Self, FrameError> {
        match columns.row_count() {
            Some(column_len) if column_len != index.len() => {
                return Err(FrameError::LengthMismatch {
                    index_len: index.len(),
                    column_len,
                });
            }
            _ => {}
        }
        Ok(Self { index, columns })
    }

    /// Build from `(label, column)` pairs, keeping the given column order.
    pub fn from_pairs(index: Index, pairs: Vec<(IndexLabel, Column)>) -> Result<Self, FrameError> {
        Self::new(index, ColumnAccessor::new(pairs)?)
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnAccessor {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, label: &IndexLabel) -> Option<&Column> {
        self.columns.get(label)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Same rows, replaced column set.
    pub fn with_columns(&self, columns: ColumnAccessor) -> Result<Self, FrameError> {
        Self::new(self.index.clone(), columns)
    }

    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        Self::new(
            self.index.take(positions)?,
            self.columns.map_columns(|c| c.take(positions))?,
        )
    }

    pub fn gather_rows(&self, positions: &[Option<usize>], nullify: bool) -> Result<Self, FrameError> {
        Self::new(
            self.index.gather(positions, nullify)?,
            self.columns.map_columns(|c| c.gather(positions, nullify))?,
        )
    }

    pub fn slice_rows(&self, slice: PositionSlice) -> Result<Self, FrameError> {
        let positions: Vec<usize> = slice.positions().collect();
        self.take_rows(&positions)
    }
}

impl Frame for DataFrame {
    fn ndim(&self) -> usize {
        2
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn index(&self) -> &Index {
        &self.index
    }

    fn column_accessor(&self) -> Option<&ColumnAccessor> {
        Some(&self.columns)
    }
}
