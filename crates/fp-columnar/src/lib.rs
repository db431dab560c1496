#![forbid(unsafe_code)]

use std::cmp::Ordering;

use fp_types::{DType, Scalar, TypeError, cast_scalar_owned, compare_scalars, infer_dtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq)]
pub struct ValidityMask {
    words: Vec<u64>,
    len: usize,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let len = values.len();
        let word_count = len.div_ceil(64);
        let mut words = vec![0_u64; word_count];
        for (idx, value) in values.iter().enumerate() {
            if !value.is_missing() {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Self { words, len }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        let full_words = self.len / 64;
        let mut count: u32 = self.words[..full_words]
            .iter()
            .map(|w| w.count_ones())
            .sum();
        let remainder = self.len % 64;
        if remainder > 0 && full_words < self.words.len() {
            let mask = (1_u64 << remainder) - 1;
            count += (self.words[full_words] & mask).count_ones();
        }
        count as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }
}

impl PartialEq for ValidityMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Serialize for ValidityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("ValidityMask", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ValidityMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let len = raw.bits.len();
        let word_count = len.div_ceil(64);
        let mut words = vec![0_u64; word_count];
        for (idx, &valid) in raw.bits.iter().enumerate() {
            if valid {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Ok(Self { words, len })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("gather position {position} out of bounds for length {len}")]
    OutOfBounds { position: usize, len: usize },
    #[error("gather map contains a null position but nullify is disabled")]
    NullPosition,
    #[error("category code {code} out of range for {categories} categories")]
    InvalidCategoryCode { code: i64, categories: usize },
    #[error("sort requires one order per key: keys={keys}, orders={orders}")]
    SortKeyArity { keys: usize, orders: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let needs_coercion = values.iter().any(|v| {
            let d = v.dtype();
            d != dtype && d != DType::Null
        });

        let coerced = if needs_coercion {
            values
                .into_iter()
                .map(|value| cast_scalar_owned(value, dtype))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            values
                .into_iter()
                .map(|value| match value {
                    Scalar::Null(_) => Scalar::missing_for_dtype(dtype),
                    other => other,
                })
                .collect()
        };

        let validity = ValidityMask::from_values(&coerced);

        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values)?;
        Self::new(dtype, values)
    }

    /// Build a typed column from values already of the given dtype. These
    /// constructors cannot fail because no coercion takes place.
    fn from_typed(dtype: DType, values: Vec<Scalar>) -> Self {
        let validity = ValidityMask::from_values(&values);
        Self {
            dtype,
            values,
            validity,
        }
    }

    #[must_use]
    pub fn empty(dtype: DType) -> Self {
        Self::from_typed(dtype, Vec::new())
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::from_typed(
            DType::Int64,
            values.into_iter().map(Scalar::Int64).collect(),
        )
    }

    #[must_use]
    pub fn from_u64(values: Vec<u64>) -> Self {
        Self::from_typed(
            DType::UInt64,
            values.into_iter().map(Scalar::UInt64).collect(),
        )
    }

    #[must_use]
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self::from_typed(
            DType::Float64,
            values.into_iter().map(Scalar::Float64).collect(),
        )
    }

    #[must_use]
    pub fn from_bools(values: Vec<bool>) -> Self {
        Self::from_typed(DType::Bool, values.into_iter().map(Scalar::Bool).collect())
    }

    #[must_use]
    pub fn from_utf8<S: Into<String>>(values: Vec<S>) -> Self {
        Self::from_typed(
            DType::Utf8,
            values.into_iter().map(|v| Scalar::Utf8(v.into())).collect(),
        )
    }

    /// Datetime column from nanosecond timestamps.
    #[must_use]
    pub fn from_datetime_ns(values: Vec<i64>) -> Self {
        Self::from_typed(
            DType::Datetime64,
            values.into_iter().map(Scalar::Datetime64).collect(),
        )
    }

    /// `[0, 1, .., len - 1]` as an `Int64` column.
    #[must_use]
    pub fn arange(len: usize) -> Self {
        Self::from_typed(
            DType::Int64,
            (0..len).map(|i| Scalar::Int64(i as i64)).collect(),
        )
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.len() - self.validity.count_valid()
    }

    /// `true` if any element is semantically equal to `needle`.
    #[must_use]
    pub fn contains(&self, needle: &Scalar) -> bool {
        self.values.iter().any(|value| value.semantic_eq(needle))
    }

    /// Cast every element to `dtype`, failing on the first value that cannot
    /// be represented exactly.
    pub fn astype(&self, dtype: DType) -> Result<Self, ColumnError> {
        if dtype == self.dtype {
            return Ok(self.clone());
        }
        Self::new(dtype, self.values.clone())
    }

    /// Gather rows at `positions`.
    ///
    /// With `nullify`, `None` entries and out-of-range positions produce the
    /// dtype's missing marker. Without it, either is an error.
    pub fn gather(&self, positions: &[Option<usize>], nullify: bool) -> Result<Self, ColumnError> {
        if nullify {
            return self.reindex_by_positions(positions);
        }
        let values = positions
            .iter()
            .map(|slot| {
                let idx = slot.ok_or(ColumnError::NullPosition)?;
                self.values
                    .get(idx)
                    .cloned()
                    .ok_or(ColumnError::OutOfBounds {
                        position: idx,
                        len: self.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_typed(self.dtype, values))
    }

    /// Checked gather over plain positions.
    pub fn take(&self, positions: &[usize]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|&idx| {
                self.values
                    .get(idx)
                    .cloned()
                    .ok_or(ColumnError::OutOfBounds {
                        position: idx,
                        len: self.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_typed(self.dtype, values))
    }

    pub fn reindex_by_positions(&self, positions: &[Option<usize>]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|slot| match slot {
                Some(idx) => self
                    .values
                    .get(*idx)
                    .cloned()
                    .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype)),
                None => Scalar::missing_for_dtype(self.dtype),
            })
            .collect::<Vec<_>>();

        Self::new(self.dtype, values)
    }

    /// Select elements where `mask` is `true`, producing a new column.
    ///
    /// The mask must be a `Bool`-typed column of the same length.
    /// Missing values in the mask are treated as `false` (not selected).
    pub fn filter_by_mask(&self, mask: &Self) -> Result<Self, ColumnError> {
        if self.len() != mask.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: mask.len(),
            });
        }

        let values = self
            .values
            .iter()
            .zip(mask.values.iter())
            .filter_map(|(val, mask_val)| match mask_val {
                Scalar::Bool(true) => Some(val.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();

        Self::new(self.dtype, values)
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left.semantic_eq(right))
    }
}

// ── Categorical columns ────────────────────────────────────────────────

/// Dictionary-encoded column: integer codes into a column of categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorical {
    codes: Column,
    categories: Column,
}

impl Categorical {
    /// Codes must be `Int64` (missing allowed) and index into `categories`.
    pub fn new(codes: Column, categories: Column) -> Result<Self, ColumnError> {
        let codes = codes.astype(DType::Int64)?;
        for code in codes.values() {
            if let Scalar::Int64(code) = code {
                let in_range = usize::try_from(*code).is_ok_and(|c| c < categories.len());
                if !in_range {
                    return Err(ColumnError::InvalidCategoryCode {
                        code: *code,
                        categories: categories.len(),
                    });
                }
            }
        }
        Ok(Self { codes, categories })
    }

    /// Encode `values` against their distinct values in first-seen order.
    pub fn from_values(values: &Column) -> Result<Self, ColumnError> {
        let mut categories: Vec<Scalar> = Vec::new();
        let mut codes = Vec::with_capacity(values.len());
        for value in values.values() {
            if value.is_missing() {
                codes.push(Scalar::missing_for_dtype(DType::Int64));
                continue;
            }
            let code = match categories.iter().position(|c| c.semantic_eq(value)) {
                Some(code) => code,
                None => {
                    categories.push(value.clone());
                    categories.len() - 1
                }
            };
            codes.push(Scalar::Int64(code as i64));
        }
        Self::new(
            Column::new(DType::Int64, codes)?,
            Column::new(values.dtype(), categories)?,
        )
    }

    #[must_use]
    pub fn codes(&self) -> &Column {
        &self.codes
    }

    #[must_use]
    pub fn categories(&self) -> &Column {
        &self.categories
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Materialize the category value of every code; missing codes stay missing.
    pub fn decode(&self) -> Result<Column, ColumnError> {
        let positions: Vec<Option<usize>> = self
            .codes
            .values()
            .iter()
            .map(|code| match code {
                Scalar::Int64(c) => usize::try_from(*c).ok(),
                _ => None,
            })
            .collect();
        self.categories.gather(&positions, true)
    }
}

// ── Multi-key stable sort ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOrder {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub ascending: bool,
    pub nulls: NullOrder,
}

impl SortKey {
    #[must_use]
    pub fn ascending() -> Self {
        Self {
            ascending: true,
            nulls: NullOrder::Last,
        }
    }
}

fn compare_with_nulls(left: &Scalar, right: &Scalar, key: SortKey) -> Ordering {
    match (left.is_missing(), right.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => match key.nulls {
            NullOrder::First => Ordering::Less,
            NullOrder::Last => Ordering::Greater,
        },
        (false, true) => match key.nulls {
            NullOrder::First => Ordering::Greater,
            NullOrder::Last => Ordering::Less,
        },
        (false, false) => {
            let ord = compare_scalars(left, right).unwrap_or(Ordering::Equal);
            if key.ascending { ord } else { ord.reverse() }
        }
    }
}

/// Stable permutation ordering rows by `keys`, compared lexicographically.
pub fn stable_argsort(keys: &[&Column], orders: &[SortKey]) -> Result<Vec<usize>, ColumnError> {
    if keys.len() != orders.len() {
        return Err(ColumnError::SortKeyArity {
            keys: keys.len(),
            orders: orders.len(),
        });
    }
    let len = keys.first().map_or(0, |k| k.len());
    if let Some(bad) = keys.iter().find(|k| k.len() != len) {
        return Err(ColumnError::LengthMismatch {
            left: len,
            right: bad.len(),
        });
    }

    let mut order: Vec<usize> = (0..len).collect();
    order.sort_by(|&a, &b| {
        keys.iter()
            .zip(orders)
            .map(|(key, &sort_key)| {
                compare_with_nulls(&key.values()[a], &key.values()[b], sort_key)
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(order)
}

/// Reorder `columns` by the stable lexicographic order of `keys`.
pub fn sort_by_key(
    columns: &[&Column],
    keys: &[&Column],
    orders: &[SortKey],
) -> Result<Vec<Column>, ColumnError> {
    let order = stable_argsort(keys, orders)?;
    columns
        .iter()
        .map(|column| {
            if column.len() != order.len() {
                return Err(ColumnError::LengthMismatch {
                    left: order.len(),
                    right: column.len(),
                });
            }
            column.take(&order)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use fp_types::{DType, NullKind, Scalar};

    use super::{Categorical, Column, ColumnError, NullOrder, SortKey, ValidityMask, sort_by_key};

    #[test]
    fn column_new_coerces_to_target_dtype() {
        let column = Column::new(DType::Float64, vec![Scalar::Int64(1), Scalar::Int64(2)])
            .expect("coerce");
        assert_eq!(
            column.values(),
            &[Scalar::Float64(1.0), Scalar::Float64(2.0)]
        );
    }

    #[test]
    fn validity_mask_tracks_missing_values() {
        let values = vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Float64(f64::NAN),
        ];
        let mask = ValidityMask::from_values(&values);
        assert_eq!(mask.bits().collect::<Vec<_>>(), vec![true, false, false]);
        assert_eq!(mask.count_valid(), 1);
    }

    #[test]
    fn arange_counts_from_zero() {
        assert_eq!(Column::arange(3), Column::from_i64(vec![0, 1, 2]));
        assert!(Column::arange(0).is_empty());
    }

    #[test]
    fn gather_without_nullify_rejects_out_of_range() {
        let column = Column::from_i64(vec![10, 20, 30]);
        let err = column
            .gather(&[Some(0), Some(3)], false)
            .expect_err("out of range");
        assert_eq!(err, ColumnError::OutOfBounds { position: 3, len: 3 });
        let err = column.gather(&[None], false).expect_err("null slot");
        assert_eq!(err, ColumnError::NullPosition);
    }

    #[test]
    fn gather_with_nullify_fills_missing() {
        let column = Column::from_i64(vec![10, 20, 30]);
        let out = column
            .gather(&[Some(2), None, Some(7)], true)
            .expect("nullify");
        assert_eq!(
            out.values(),
            &[
                Scalar::Int64(30),
                Scalar::Null(NullKind::Null),
                Scalar::Null(NullKind::Null)
            ]
        );
        assert_eq!(out.null_count(), 2);
    }

    #[test]
    fn take_preserves_order_and_repeats() {
        let column = Column::from_utf8(vec!["a", "b", "c"]);
        let out = column.take(&[2, 0, 2]).expect("take");
        assert_eq!(out, Column::from_utf8(vec!["c", "a", "c"]));
    }

    #[test]
    fn astype_numeric_family() {
        let column = Column::from_i64(vec![1, 2]);
        let out = column.astype(DType::Float64).expect("widen");
        assert_eq!(out, Column::from_f64(vec![1.0, 2.0]));
        let err = Column::from_f64(vec![1.5])
            .astype(DType::Int64)
            .expect_err("lossy");
        assert!(matches!(err, ColumnError::Type(_)));
    }

    #[test]
    fn filter_by_mask_requires_equal_length() {
        let column = Column::from_i64(vec![1, 2, 3]);
        let mask = Column::from_bools(vec![true, false, true]);
        assert_eq!(
            column.filter_by_mask(&mask).expect("filter"),
            Column::from_i64(vec![1, 3])
        );
        let short = Column::from_bools(vec![true]);
        assert!(column.filter_by_mask(&short).is_err());
    }

    #[test]
    fn categorical_round_trips_through_codes() {
        let values = Column::from_utf8(vec!["x", "y", "x"]);
        let cat = Categorical::from_values(&values).expect("encode");
        assert_eq!(cat.codes(), &Column::from_i64(vec![0, 1, 0]));
        assert_eq!(cat.categories(), &Column::from_utf8(vec!["x", "y"]));
        assert_eq!(cat.decode().expect("decode"), values);
    }

    #[test]
    fn categorical_rejects_out_of_range_codes() {
        let err = Categorical::new(Column::from_i64(vec![0, 2]), Column::from_utf8(vec!["a"]))
            .expect_err("bad code");
        assert_eq!(
            err,
            ColumnError::InvalidCategoryCode {
                code: 2,
                categories: 1
            }
        );
    }

    #[test]
    fn sort_by_key_is_stable_and_lexicographic() {
        let payload = Column::from_utf8(vec!["a", "b", "c", "d"]);
        let major = Column::from_i64(vec![1, 0, 1, 0]);
        let minor = Column::from_i64(vec![5, 5, 4, 5]);
        let sorted = sort_by_key(
            &[&payload],
            &[&major, &minor],
            &[SortKey::ascending(), SortKey::ascending()],
        )
        .expect("sort");
        assert_eq!(sorted[0], Column::from_utf8(vec!["b", "d", "c", "a"]));
    }

    #[test]
    fn sort_by_key_places_nulls_per_policy() {
        let key = Column::new(
            DType::Int64,
            vec![Scalar::Int64(2), Scalar::Null(NullKind::Null), Scalar::Int64(1)],
        )
        .expect("key");
        let payload = Column::arange(3);
        let first = sort_by_key(
            &[&payload],
            &[&key],
            &[SortKey {
                ascending: true,
                nulls: NullOrder::First,
            }],
        )
        .expect("sort");
        assert_eq!(first[0], Column::from_i64(vec![1, 2, 0]));
        let last = sort_by_key(&[&payload], &[&key], &[SortKey::ascending()]).expect("sort");
        assert_eq!(last[0], Column::from_i64(vec![2, 0, 1]));
    }

    #[test]
    fn sort_by_key_checks_arity() {
        let key = Column::arange(2);
        let err = sort_by_key(&[&key], &[&key], &[]).expect_err("arity");
        assert_eq!(err, ColumnError::SortKeyArity { keys: 1, orders: 0 });
    }
}
