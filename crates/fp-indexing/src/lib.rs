#![forbid(unsafe_code)]

//! Positional (`iloc`) and label (`loc`) indexing for series and frames.
//!
//! A raw [`Key`] is split into one [`AxisKey`] per axis, the row key is
//! classified into an [`IndexingSpec`], and the column key is resolved to a
//! [`ColumnSelection`]. [`IndexingExt`] runs all three and applies the
//! result.

mod apply;
mod columns;
mod destructure;
mod error;
mod iloc;
mod key;
mod loc;
mod ordered_find;
mod spec;

pub use apply::{IndexingExt, Selection};
pub use columns::{ColumnSelection, resolve_iloc_columns, resolve_loc_columns};
pub use destructure::{
    destructure_dataframe_iloc_indexer, destructure_dataframe_loc_indexer,
    destructure_dataframe_loc_indexer_with_policy, destructure_iloc_key, destructure_loc_key,
    destructure_loc_key_with_policy, destructure_series_iloc_indexer,
    destructure_series_loc_indexer, destructure_series_loc_indexer_with_policy,
};
pub use error::{IndexingError, IndexingErrorKind};
pub use iloc::parse_row_iloc_indexer;
pub use key::{ArrayKey, AxisKey, Key, KeyFn, KeyShape, SliceKey, classify_shape};
pub use loc::{parse_row_loc_indexer, parse_row_loc_indexer_with_policy};
pub use ordered_find::{
    ordered_find, ordered_find_multi, ordered_find_multi_with_policy, ordered_find_with_policy,
};
pub use spec::{BooleanMask, GatherMap, IndexingSpec, RowSlice};
