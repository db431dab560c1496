#![forbid(unsafe_code)]

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    UInt64,
    Float64,
    Utf8,
    /// Nanoseconds since the UNIX epoch.
    Datetime64,
}

/// Coarse dtype family, mirroring the single-letter kind codes used by
/// array libraries (`b`, `i`, `u`, `f`, `O`, `M`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DTypeKind {
    Null,
    Bool,
    SignedInt,
    UnsignedInt,
    Float,
    Object,
    Datetime,
}

impl DTypeKind {
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Null => 'V',
            Self::Bool => 'b',
            Self::SignedInt => 'i',
            Self::UnsignedInt => 'u',
            Self::Float => 'f',
            Self::Object => 'O',
            Self::Datetime => 'M',
        }
    }

    /// Signed, unsigned and floating kinds cast freely between each other
    /// during label reconciliation.
    #[must_use]
    pub fn is_numeric_family(self) -> bool {
        matches!(self, Self::SignedInt | Self::UnsignedInt | Self::Float)
    }
}

impl DType {
    #[must_use]
    pub fn kind(self) -> DTypeKind {
        match self {
            Self::Null => DTypeKind::Null,
            Self::Bool => DTypeKind::Bool,
            Self::Int64 => DTypeKind::SignedInt,
            Self::UInt64 => DTypeKind::UnsignedInt,
            Self::Float64 => DTypeKind::Float,
            Self::Utf8 => DTypeKind::Object,
            Self::Datetime64 => DTypeKind::Datetime,
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int64 | Self::UInt64)
    }

    #[must_use]
    pub fn is_bool(self) -> bool {
        matches!(self, Self::Bool)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Utf8(String),
    Datetime64(i64),
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::UInt64(_) => DType::UInt64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Datetime64(_) => DType::Datetime64,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Null(NullKind::NaN)) || matches!(self, Self::Float64(v) if v.is_nan())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    #[must_use]
    pub fn missing_for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Null(NullKind::NaN),
            DType::Datetime64 => Self::Null(NullKind::NaT),
            DType::Null | DType::Bool | DType::Int64 | DType::UInt64 | DType::Utf8 => {
                Self::Null(NullKind::Null)
            }
        }
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null(NullKind::NaN), Self::Float64(v))
            | (Self::Float64(v), Self::Null(NullKind::NaN)) => v.is_nan(),
            (Self::Null(_), Self::Null(_)) => true,
            _ => self == other,
        }
    }

    /// Interpret this scalar as a signed position, if it is an integer.
    #[must_use]
    pub fn as_position(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("dtype coercion from {left:?} to {right:?} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
    #[error("cannot cast float {value} to {to:?} without loss")]
    LossyFloatToInt { value: f64, to: DType },
    #[error("integer {value} is out of range for {to:?}")]
    IntegerOutOfRange { value: String, to: DType },
    #[error("expected 0/1 for bool cast but found {value}")]
    InvalidBoolInt { value: String },
    #[error("expected 0.0/1.0 for bool cast from float64 but found {value}")]
    InvalidBoolFloat { value: f64 },
    #[error("cannot parse {value:?} as a datetime")]
    InvalidDatetime { value: String },
}

pub fn common_dtype(left: DType, right: DType) -> Result<DType, TypeError> {
    use DType::{Bool, Float64, Int64, Null, UInt64};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Null, other) | (other, Null) => other,
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, UInt64) | (UInt64, Bool) => UInt64,
        (Bool, Float64) | (Float64, Bool) => Float64,
        (Int64, UInt64) | (UInt64, Int64) => Float64,
        (Int64 | UInt64, Float64) | (Float64, Int64 | UInt64) => Float64,
        _ => return Err(TypeError::IncompatibleDtypes { left, right }),
    };

    Ok(out)
}

pub fn infer_dtype(values: &[Scalar]) -> Result<DType, TypeError> {
    let mut current = DType::Null;
    for value in values {
        current = common_dtype(current, value.dtype())?;
    }
    Ok(current)
}

fn float_to_i64(value: f64) -> Result<i64, TypeError> {
    if !value.is_finite() || value != value.trunc() {
        return Err(TypeError::LossyFloatToInt {
            value,
            to: DType::Int64,
        });
    }
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(TypeError::LossyFloatToInt {
            value,
            to: DType::Int64,
        });
    }
    Ok(value as i64)
}

fn float_to_u64(value: f64) -> Result<u64, TypeError> {
    if !value.is_finite() || value != value.trunc() || value < 0.0 || value >= u64::MAX as f64 {
        return Err(TypeError::LossyFloatToInt {
            value,
            to: DType::UInt64,
        });
    }
    Ok(value as u64)
}

/// Parse a datetime string into nanoseconds since the UNIX epoch.
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]`
/// timestamps (interpreted as UTC) and bare `YYYY-MM-DD` dates.
pub fn parse_datetime_ns(value: &str) -> Result<i64, TypeError> {
    let invalid = || TypeError::InvalidDatetime {
        value: value.to_owned(),
    };
    let trimmed = value.trim();

    let naive = if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        dt.naive_utc()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        dt
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        dt
    } else {
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map_err(|_| invalid())?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(invalid)?
    };

    naive.and_utc().timestamp_nanos_opt().ok_or_else(invalid)
}

/// Cast a scalar to a target dtype, taking ownership to avoid redundant clones
/// when the value already has the correct type.
///
/// Every cast is lossless: a value that cannot be represented exactly in the
/// target dtype is an error rather than a silent truncation.
pub fn cast_scalar_owned(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if matches!(value, Scalar::Null(_)) {
        return Ok(Scalar::missing_for_dtype(target));
    }
    if from == target {
        return Ok(value);
    }

    match target {
        DType::Null => Ok(Scalar::Null(NullKind::Null)),
        DType::Bool => match &value {
            Scalar::Int64(v) => match *v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolInt {
                    value: v.to_string(),
                }),
            },
            Scalar::UInt64(v) => match *v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolInt {
                    value: v.to_string(),
                }),
            },
            Scalar::Float64(v) => {
                if *v == 0.0 {
                    Ok(Scalar::Bool(false))
                } else if *v == 1.0 {
                    Ok(Scalar::Bool(true))
                } else {
                    Err(TypeError::InvalidBoolFloat { value: *v })
                }
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Int64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(*v))),
            Scalar::UInt64(v) => i64::try_from(*v).map(Scalar::Int64).map_err(|_| {
                TypeError::IntegerOutOfRange {
                    value: v.to_string(),
                    to: target,
                }
            }),
            Scalar::Float64(v) => float_to_i64(*v).map(Scalar::Int64),
            Scalar::Datetime64(v) => Ok(Scalar::Int64(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::UInt64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::UInt64(u64::from(*v))),
            Scalar::Int64(v) => u64::try_from(*v).map(Scalar::UInt64).map_err(|_| {
                TypeError::IntegerOutOfRange {
                    value: v.to_string(),
                    to: target,
                }
            }),
            Scalar::Float64(v) => float_to_u64(*v).map(Scalar::UInt64),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Float64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if *v { 1.0 } else { 0.0 })),
            Scalar::Int64(v) => Ok(Scalar::Float64(*v as f64)),
            Scalar::UInt64(v) => Ok(Scalar::Float64(*v as f64)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Datetime64 => match &value {
            Scalar::Utf8(v) => parse_datetime_ns(v).map(Scalar::Datetime64),
            Scalar::Int64(v) => Ok(Scalar::Datetime64(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Utf8 => Err(TypeError::InvalidCast { from, to: target }),
    }
}

/// Cast a scalar reference to a target dtype (clones only when conversion is needed).
pub fn cast_scalar(value: &Scalar, target: DType) -> Result<Scalar, TypeError> {
    cast_scalar_owned(value.clone(), target)
}

/// Order two non-missing scalars.
///
/// Numeric values compare across signed, unsigned and floating dtypes.
/// Returns `None` when either side is missing or the dtypes are not
/// mutually ordered (e.g. `Utf8` vs `Int64`).
#[must_use]
pub fn compare_scalars(left: &Scalar, right: &Scalar) -> Option<Ordering> {
    if left.is_missing() || right.is_missing() {
        return None;
    }
    match (left, right) {
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
        (Scalar::Datetime64(a), Scalar::Datetime64(b)) => Some(a.cmp(b)),
        (Scalar::Int64(a), Scalar::Int64(b)) => Some(a.cmp(b)),
        (Scalar::UInt64(a), Scalar::UInt64(b)) => Some(a.cmp(b)),
        (Scalar::Int64(a), Scalar::UInt64(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
        (Scalar::UInt64(a), Scalar::Int64(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
        (Scalar::Float64(a), Scalar::Float64(b)) => a.partial_cmp(b),
        (Scalar::Float64(a), Scalar::Int64(b)) => a.partial_cmp(&(*b as f64)),
        (Scalar::Float64(a), Scalar::UInt64(b)) => a.partial_cmp(&(*b as f64)),
        (Scalar::Int64(a), Scalar::Float64(b)) => (*a as f64).partial_cmp(b),
        (Scalar::UInt64(a), Scalar::Float64(b)) => (*a as f64).partial_cmp(b),
        _ => None,
    }
}
