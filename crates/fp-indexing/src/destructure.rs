//! Splitting a raw key into one sub-key per frame axis.

use fp_frame::{DataFrame, Frame, Series};
use fp_index::IndexLabel;
use fp_runtime::{EvidenceLedger, RuntimePolicy};
use fp_types::Scalar;

use crate::columns::{ColumnSelection, resolve_iloc_columns, resolve_loc_columns};
use crate::error::IndexingError;
use crate::key::{ArrayKey, AxisKey, Key};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Position,
    Label,
}

/// How an all-scalar tuple key on a multi-level frame was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TupleReading {
    /// Second element found in index level 1.
    RowLabel,
    /// Second element found among the column labels.
    RowAndColumn,
    /// Neither; left to fail as a missing row label.
    Unresolved,
    /// Not a pair; always a row label.
    RowLabelOfOtherLength,
}

impl TupleReading {
    fn describe(self) -> &'static str {
        match self {
            Self::RowLabel => "second element matched index level 1; read as a row label",
            Self::RowAndColumn => "second element matched a column label; read as (row, column)",
            Self::Unresolved => "second element matched nothing; read as a row label",
            Self::RowLabelOfOtherLength => "tuple is not a pair; read as a row label",
        }
    }
}

fn all_scalars(parts: &[Key]) -> bool {
    parts.iter().all(|part| matches!(part, Key::Scalar(_)))
}

/// Best-effort reading of an all-scalar tuple against a multi-level frame.
/// Order matters: index level 1 wins over column labels.
fn read_level_tuple(parts: &[Key], frame: &dyn Frame) -> TupleReading {
    let [_, Key::Scalar(second)] = parts else {
        return TupleReading::RowLabelOfOtherLength;
    };
    if frame.index().level_contains(1, second) {
        return TupleReading::RowLabel;
    }
    let in_columns = frame.column_accessor().is_some_and(|accessor| {
        IndexLabel::from_scalar(second).is_some_and(|label| accessor.contains_label(&label))
    });
    if in_columns {
        TupleReading::RowAndColumn
    } else {
        TupleReading::Unresolved
    }
}

fn disambiguate_loc_key(
    key: Key,
    frame: &dyn Frame,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Key {
    let Key::Tuple(parts) = key else {
        return key;
    };
    if frame.index().nlevels() < 2 || !all_scalars(&parts) {
        return Key::Tuple(parts);
    }
    if frame.ndim() < 2 {
        return Key::Tuple(vec![Key::Tuple(parts)]);
    }

    let reading = read_level_tuple(&parts, frame);
    tracing::debug!(?reading, arity = parts.len(), "multi-level tuple key");
    policy.record_ambiguity("loc_tuple_key", reading.describe(), ledger);
    match reading {
        TupleReading::RowAndColumn => Key::Tuple(parts),
        TupleReading::RowLabel | TupleReading::Unresolved | TupleReading::RowLabelOfOtherLength => {
            Key::Tuple(vec![Key::Tuple(parts)])
        }
    }
}

fn expand(key: Key, ndim: usize) -> Result<Vec<Key>, IndexingError> {
    let mut parts = match key {
        Key::Tuple(parts) => {
            if parts.len() > ndim {
                return Err(IndexingError::TooManyIndexers {
                    got: parts.len(),
                    expected: ndim,
                });
            }
            parts
        }
        other => vec![other],
    };
    parts.resize_with(ndim, || Key::Slice(Default::default()));
    Ok(parts)
}

fn evaluate(key: Key, frame: &dyn Frame) -> Result<Key, IndexingError> {
    match key {
        Key::Callable(f) => match f.call(frame) {
            Key::Callable(_) => Err(IndexingError::TypeMismatch(
                "callable key returned another callable".to_owned(),
            )),
            resolved => Ok(resolved),
        },
        other => Ok(other),
    }
}

fn to_axis_key(key: Key, mode: Mode) -> Result<AxisKey, IndexingError> {
    match key {
        Key::Ellipsis => Ok(AxisKey::Ellipsis),
        Key::Slice(slice) => Ok(AxisKey::Slice(slice)),
        Key::Scalar(value) => Ok(AxisKey::Scalar(value)),
        Key::Array(column) => Ok(AxisKey::Array(ArrayKey::Plain(column))),
        Key::Categorical(cat) => Ok(AxisKey::Array(ArrayKey::Categorical(cat))),
        Key::Tuple(parts) if mode == Mode::Label && all_scalars(&parts) => Ok(AxisKey::LevelTuple(
            parts
                .into_iter()
                .filter_map(|part| match part {
                    Key::Scalar(value) => Some(value),
                    _ => None,
                })
                .collect::<Vec<Scalar>>(),
        )),
        Key::Tuple(_) => Err(IndexingError::NestedTuple),
        Key::Callable(_) => Err(IndexingError::TypeMismatch(
            "callable key returned another callable".to_owned(),
        )),
    }
}

fn destructure(key: Key, frame: &dyn Frame, mode: Mode) -> Result<Vec<AxisKey>, IndexingError> {
    expand(key, frame.ndim())?
        .into_iter()
        .map(|part| to_axis_key(evaluate(part, frame)?, mode))
        .collect()
}

/// Split a positional key into exactly `frame.ndim()` axis keys.
///
/// Tuples are padded with full slices; longer tuples fail with
/// `TooManyIndexers`. Callables are invoked once with the frame. A tuple
/// sub-key after evaluation is `NestedTuple`.
pub fn destructure_iloc_key(key: Key, frame: &dyn Frame) -> Result<Vec<AxisKey>, IndexingError> {
    destructure(key, frame, Mode::Position)
}

pub fn destructure_loc_key(key: Key, frame: &dyn Frame) -> Result<Vec<AxisKey>, IndexingError> {
    destructure_loc_key_with_policy(key, frame, &RuntimePolicy::default(), &mut EvidenceLedger::new())
}

/// Split a label key into exactly `frame.ndim()` axis keys.
///
/// On a two-dimensional frame with a multi-level row index, an all-scalar
/// pair `(a, b)` is ambiguous. It reads as a single row label when `b`
/// occurs in index level 1, as `(row, column)` when `b` names a column,
/// and as a row label otherwise. The chosen reading is recorded in `ledger`.
pub fn destructure_loc_key_with_policy(
    key: Key,
    frame: &dyn Frame,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<Vec<AxisKey>, IndexingError> {
    let key = disambiguate_loc_key(key, frame, policy, ledger);
    destructure(key, frame, Mode::Label)
}

fn into_pair(mut axes: Vec<AxisKey>) -> Result<(AxisKey, AxisKey), IndexingError> {
    match (axes.pop(), axes.pop()) {
        (Some(cols), Some(rows)) if axes.is_empty() => Ok((rows, cols)),
        _ => Err(IndexingError::TooManyIndexers {
            got: axes.len() + 2,
            expected: 2,
        }),
    }
}

fn into_single(mut axes: Vec<AxisKey>) -> Result<AxisKey, IndexingError> {
    match axes.pop() {
        Some(rows) if axes.is_empty() => Ok(rows),
        _ => Err(IndexingError::TooManyIndexers {
            got: axes.len() + 1,
            expected: 1,
        }),
    }
}

/// Row key plus resolved column selection for `df.iloc[key]`.
pub fn destructure_dataframe_iloc_indexer(
    key: Key,
    frame: &DataFrame,
) -> Result<(AxisKey, ColumnSelection), IndexingError> {
    let (rows, cols) = into_pair(destructure_iloc_key(key, frame)?)?;
    let selection = resolve_iloc_columns(&cols, frame.columns())?;
    Ok((rows, selection))
}

pub fn destructure_series_iloc_indexer(key: Key, frame: &Series) -> Result<AxisKey, IndexingError> {
    into_single(destructure_iloc_key(key, frame)?)
}

pub fn destructure_dataframe_loc_indexer(
    key: Key,
    frame: &DataFrame,
) -> Result<(AxisKey, ColumnSelection), IndexingError> {
    destructure_dataframe_loc_indexer_with_policy(
        key,
        frame,
        &RuntimePolicy::default(),
        &mut EvidenceLedger::new(),
    )
}

/// Row key plus resolved column selection for `df.loc[key]`.
pub fn destructure_dataframe_loc_indexer_with_policy(
    key: Key,
    frame: &DataFrame,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<(AxisKey, ColumnSelection), IndexingError> {
    let (rows, cols) = into_pair(destructure_loc_key_with_policy(key, frame, policy, ledger)?)?;
    let selection = resolve_loc_columns(&cols, frame.columns())?;
    Ok((rows, selection))
}

pub fn destructure_series_loc_indexer(key: Key, frame: &Series) -> Result<AxisKey, IndexingError> {
    into_single(destructure_loc_key(key, frame)?)
}

pub fn destructure_series_loc_indexer_with_policy(
    key: Key,
    frame: &Series,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<AxisKey, IndexingError> {
    into_single(destructure_loc_key_with_policy(key, frame, policy, ledger)?)
}
