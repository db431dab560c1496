//! Raw indexing keys and their per-axis, destructured form.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use fp_columnar::{Categorical, Column, ColumnError};
use fp_frame::Frame;
use fp_types::{DType, Scalar};

/// Slice bounds as supplied by the caller. Position mode requires integer
/// bounds; label mode accepts any label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceKey {
    pub start: Option<Scalar>,
    pub stop: Option<Scalar>,
    pub step: Option<i64>,
}

impl SliceKey {
    /// `slice(None)`: every row.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn between(start: impl Into<Scalar>, stop: impl Into<Scalar>) -> Self {
        Self {
            start: Some(start.into()),
            stop: Some(stop.into()),
            step: None,
        }
    }

    #[must_use]
    pub fn starting_at(start: impl Into<Scalar>) -> Self {
        Self {
            start: Some(start.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ending_at(stop: impl Into<Scalar>) -> Self {
        Self {
            stop: Some(stop.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }
}

/// Deferred key computed from the frame being indexed.
#[derive(Clone)]
pub struct KeyFn(Arc<dyn Fn(&dyn Frame) -> Key + Send + Sync>);

impl KeyFn {
    pub fn new(f: impl Fn(&dyn Frame) -> Key + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn call(&self, frame: &dyn Frame) -> Key {
        (self.0)(frame)
    }
}

impl fmt::Debug for KeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyFn(..)")
    }
}

/// A raw key, as passed to `iloc`/`loc`.
#[derive(Debug, Clone)]
pub enum Key {
    Tuple(Vec<Key>),
    Ellipsis,
    Slice(SliceKey),
    /// A single value. Also stands for a zero-dimensional array.
    Scalar(Scalar),
    Array(Column),
    Categorical(Categorical),
    Callable(KeyFn),
}

impl Key {
    pub fn callable(f: impl Fn(&dyn Frame) -> Key + Send + Sync + 'static) -> Self {
        Self::Callable(KeyFn::new(f))
    }

    #[must_use]
    pub fn tuple(parts: Vec<Key>) -> Self {
        Self::Tuple(parts)
    }

    /// Vector key built from loose values with an inferred dtype.
    pub fn values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        Ok(Self::Array(Column::from_values(values)?))
    }
}

impl From<Scalar> for Key {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int64(value))
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::from(value))
    }
}

impl From<SliceKey> for Key {
    fn from(value: SliceKey) -> Self {
        Self::Slice(value)
    }
}

impl From<Column> for Key {
    fn from(value: Column) -> Self {
        Self::Array(value)
    }
}

impl From<Categorical> for Key {
    fn from(value: Categorical) -> Self {
        Self::Categorical(value)
    }
}

/// Vector-valued axis key.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayKey {
    Plain(Column),
    Categorical(Categorical),
}

impl ArrayKey {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Plain(column) => column.len(),
            Self::Categorical(cat) => cat.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integer codes of a categorical, or the plain column. Used for
    /// positional lookups.
    #[must_use]
    pub fn codes_or_plain(&self) -> &Column {
        match self {
            Self::Plain(column) => column,
            Self::Categorical(cat) => cat.codes(),
        }
    }

    /// Category values of a categorical, or the plain column. Used for
    /// label lookups.
    pub fn decoded(&self) -> Result<Cow<'_, Column>, ColumnError> {
        match self {
            Self::Plain(column) => Ok(Cow::Borrowed(column)),
            Self::Categorical(cat) => Ok(Cow::Owned(cat.decode()?)),
        }
    }

    fn value_dtype(&self) -> DType {
        match self {
            Self::Plain(column) => column.dtype(),
            Self::Categorical(cat) => cat.categories().dtype(),
        }
    }
}

/// One axis of a destructured key.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisKey {
    Ellipsis,
    Slice(SliceKey),
    Scalar(Scalar),
    Array(ArrayKey),
    /// All-scalar tuple used as a row label of a multi-level index.
    LevelTuple(Vec<Scalar>),
}

impl AxisKey {
    /// Padding for axes the caller did not mention.
    #[must_use]
    pub fn everything() -> Self {
        Self::Slice(SliceKey::full())
    }
}

/// Shape of an axis key, decided once before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    Ellipsis,
    Slice,
    Scalar,
    BooleanVector,
    Vector,
    LevelTuple,
}

#[must_use]
pub fn classify_shape(key: &AxisKey) -> KeyShape {
    match key {
        AxisKey::Ellipsis => KeyShape::Ellipsis,
        AxisKey::Slice(_) => KeyShape::Slice,
        AxisKey::Scalar(_) => KeyShape::Scalar,
        AxisKey::LevelTuple(_) => KeyShape::LevelTuple,
        AxisKey::Array(array) if array.value_dtype().is_bool() => KeyShape::BooleanVector,
        AxisKey::Array(_) => KeyShape::Vector,
    }
}
