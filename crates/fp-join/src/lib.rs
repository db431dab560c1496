#![forbid(unsafe_code)]

use std::{collections::HashMap, mem::size_of};

use bumpalo::{Bump, collections::Vec as BumpVec};
use fp_columnar::{Column, ColumnError};
use fp_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
}

/// Matched row pairs, one entry per output row, in left-probe order.
/// `None` on the right marks an unmatched left row of a left join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinedPositions {
    pub left_positions: Vec<Option<usize>>,
    pub right_positions: Vec<Option<usize>>,
}

impl JoinedPositions {
    #[must_use]
    pub fn len(&self) -> usize {
        self.left_positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left_positions.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JoinError {
    #[error("join key arity mismatch: left has {left} key columns, right has {right}")]
    KeyArity { left: usize, right: usize },
    #[error("join key columns differ in length: expected {expected}, found {actual}")]
    KeyLengthMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinExecutionTrace {
    pub used_arena: bool,
    pub output_rows: usize,
    pub estimated_bytes: usize,
}

/// Hashable view of one key cell. Missing values of any kind compare equal,
/// integral floats hash with integers, and `-0.0` folds into `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum JoinKey<'a> {
    Missing,
    Bool(bool),
    Int(i128),
    Float(u64),
    Utf8(&'a str),
    Datetime(i64),
}

const I64_SPAN: f64 = 9_223_372_036_854_775_808.0;

impl<'a> JoinKey<'a> {
    fn from_scalar(value: &'a Scalar) -> Self {
        if value.is_missing() {
            return Self::Missing;
        }
        match value {
            Scalar::Null(_) => Self::Missing,
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int(i128::from(*v)),
            Scalar::UInt64(v) => Self::Int(i128::from(*v)),
            Scalar::Float64(v) if v.fract() == 0.0 && v.abs() < I64_SPAN => {
                Self::Int(*v as i128)
            }
            Scalar::Float64(v) => Self::Float(v.to_bits()),
            Scalar::Utf8(v) => Self::Utf8(v),
            Scalar::Datetime64(v) => Self::Datetime(*v),
        }
    }
}

fn row_keys<'a>(columns: &[&'a Column]) -> Result<Vec<Vec<JoinKey<'a>>>, JoinError> {
    let len = columns.first().map_or(0, |c| c.len());
    if let Some(bad) = columns.iter().find(|c| c.len() != len) {
        return Err(JoinError::KeyLengthMismatch {
            expected: len,
            actual: bad.len(),
        });
    }
    Ok((0..len)
        .map(|row| {
            columns
                .iter()
                .map(|column| JoinKey::from_scalar(&column.values()[row]))
                .collect()
        })
        .collect())
}

/// Hash join over one or more parallel key columns per side.
///
/// Built once, the plan knows its output cardinality before any row pairs
/// are materialized, so callers can admit or reject it up front.
#[derive(Debug)]
pub struct JoinPlan<'a> {
    join_type: JoinType,
    left_keys: Vec<Vec<JoinKey<'a>>>,
    right_map: HashMap<Vec<JoinKey<'a>>, Vec<usize>>,
    output_rows: usize,
}

impl<'a> JoinPlan<'a> {
    pub fn new(
        left: &[&'a Column],
        right: &[&'a Column],
        join_type: JoinType,
    ) -> Result<Self, JoinError> {
        if left.len() != right.len() || left.is_empty() {
            return Err(JoinError::KeyArity {
                left: left.len(),
                right: right.len(),
            });
        }
        let left_keys = row_keys(left)?;

        let mut right_map = HashMap::<Vec<JoinKey<'a>>, Vec<usize>>::new();
        for (pos, key) in row_keys(right)?.into_iter().enumerate() {
            right_map.entry(key).or_default().push(pos);
        }

        let output_rows = estimate_output_rows(&left_keys, &right_map, join_type);
        Ok(Self {
            join_type,
            left_keys,
            right_map,
            output_rows,
        })
    }

    #[must_use]
    pub fn output_rows(&self) -> usize {
        self.output_rows
    }

    /// Materialize the row pairs into owned vectors.
    #[must_use]
    pub fn execute(&self) -> JoinedPositions {
        let mut left_positions = Vec::<Option<usize>>::with_capacity(self.output_rows);
        let mut right_positions = Vec::<Option<usize>>::with_capacity(self.output_rows);
        self.probe(|left, right| {
            left_positions.push(Some(left));
            right_positions.push(right);
        });
        JoinedPositions {
            left_positions,
            right_positions,
        }
    }

    /// Probe into scratch buffers and hand them to `consume` while they are
    /// alive. The buffers live in a bump arena when the plan fits the budget,
    /// so callers that only read the pairs never copy them out.
    pub fn execute_with<R>(
        &self,
        options: JoinExecutionOptions,
        consume: impl FnOnce(&[Option<usize>], &[Option<usize>]) -> R,
    ) -> (R, JoinExecutionTrace) {
        let estimated_bytes = estimate_intermediate_bytes(self.output_rows);
        let use_arena = options.use_arena && estimated_bytes <= options.arena_budget_bytes;

        let out = if use_arena {
            let arena = Bump::new();
            let mut left_positions =
                BumpVec::<Option<usize>>::with_capacity_in(self.output_rows, &arena);
            let mut right_positions =
                BumpVec::<Option<usize>>::with_capacity_in(self.output_rows, &arena);
            self.probe(|left, right| {
                left_positions.push(Some(left));
                right_positions.push(right);
            });
            consume(left_positions.as_slice(), right_positions.as_slice())
        } else {
            let joined = self.execute();
            consume(joined.left_positions.as_slice(), joined.right_positions.as_slice())
        };

        (
            out,
            JoinExecutionTrace {
                used_arena: use_arena,
                output_rows: self.output_rows,
                estimated_bytes,
            },
        )
    }

    fn probe(&self, mut emit: impl FnMut(usize, Option<usize>)) {
        for (left_pos, key) in self.left_keys.iter().enumerate() {
            if let Some(matches) = self.right_map.get(key) {
                for right_pos in matches {
                    emit(left_pos, Some(*right_pos));
                }
                continue;
            }

            if matches!(self.join_type, JoinType::Left) {
                emit(left_pos, None);
            }
        }
    }
}

pub fn join_columns(
    left: &[&Column],
    right: &[&Column],
    join_type: JoinType,
) -> Result<JoinedPositions, JoinError> {
    Ok(JoinPlan::new(left, right, join_type)?.execute())
}

fn estimate_output_rows(
    left_keys: &[Vec<JoinKey<'_>>],
    right_map: &HashMap<Vec<JoinKey<'_>>, Vec<usize>>,
    join_type: JoinType,
) -> usize {
    left_keys
        .iter()
        .map(|key| match right_map.get(key) {
            Some(matches) => matches.len(),
            None if matches!(join_type, JoinType::Left) => 1,
            None => 0,
        })
        .sum()
}

fn estimate_intermediate_bytes(output_rows: usize) -> usize {
    output_rows.saturating_mul(size_of::<Option<usize>>().saturating_mul(2))
}
