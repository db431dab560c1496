//! Order-preserving label lookup.

use fp_columnar::{Column, SortKey, sort_by_key};
use fp_join::{JoinPlan, JoinType};
use fp_runtime::{DecisionAction, EvidenceLedger, RuntimePolicy};
use fp_types::{DType, DTypeKind};

use crate::error::IndexingError;
use crate::spec::GatherMap;

/// Cast `needles` so they can be compared against a haystack of
/// `haystack_dtype`.
///
/// Object haystacks take any needle that casts to it; numeric families
/// cross-cast; other kinds must already match. Every failure, including a
/// lossy cast, reads as a missing key.
///
/// Needles are never stringified to meet a string haystack: `1` does not
/// find `"1"` in a `Utf8` index.
pub(crate) fn reconcile_needles(
    needles: &Column,
    haystack_dtype: DType,
) -> Result<Column, IndexingError> {
    let needle_kind = needles.dtype().kind();
    let haystack_kind = haystack_dtype.kind();
    let castable = haystack_kind == DTypeKind::Object
        || needle_kind == haystack_kind
        || needle_kind == DTypeKind::Null
        || (needle_kind.is_numeric_family() && haystack_kind.is_numeric_family());

    if castable {
        needles
            .astype(haystack_dtype)
            .map_err(|_| IndexingError::dtype_mismatch())
    } else if needles.dtype() != haystack_dtype {
        Err(IndexingError::dtype_mismatch())
    } else {
        Ok(needles.clone())
    }
}

/// Positions in `haystack` of every needle, in needle order.
///
/// Needles matching several haystack rows yield all of them, in haystack
/// order. Any needle absent from the haystack fails the whole lookup.
pub fn ordered_find(needles: &Column, haystack: &Column) -> Result<GatherMap, IndexingError> {
    ordered_find_with_policy(
        needles,
        haystack,
        &RuntimePolicy::default(),
        &mut EvidenceLedger::new(),
    )
}

pub fn ordered_find_with_policy(
    needles: &Column,
    haystack: &Column,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<GatherMap, IndexingError> {
    ordered_find_multi_with_policy(&[needles], &[haystack], policy, ledger)
}

/// [`ordered_find`] over compound keys: row `i` of the needles is the tuple
/// of `needles[k][i]` across key columns.
pub fn ordered_find_multi(
    needles: &[&Column],
    haystacks: &[&Column],
) -> Result<GatherMap, IndexingError> {
    ordered_find_multi_with_policy(
        needles,
        haystacks,
        &RuntimePolicy::default(),
        &mut EvidenceLedger::new(),
    )
}

pub fn ordered_find_multi_with_policy(
    needles: &[&Column],
    haystacks: &[&Column],
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<GatherMap, IndexingError> {
    let needle_len = needles.first().map_or(0, |c| c.len());
    let haystack_len = haystacks.first().map_or(0, |c| c.len());
    let _span = tracing::debug_span!(
        "ordered_find",
        keys = needles.len(),
        needles = needle_len,
        haystack = haystack_len
    )
    .entered();

    let reconciled = needles
        .iter()
        .zip(haystacks)
        .map(|(needle, haystack)| reconcile_needles(needle, haystack.dtype()))
        .collect::<Result<Vec<_>, _>>()?;
    let reconciled_refs: Vec<&Column> = reconciled.iter().collect();

    let plan = JoinPlan::new(&reconciled_refs, haystacks, JoinType::Left)?;
    let estimated_rows = plan.output_rows();
    if policy.decide_join_admission(estimated_rows, ledger) == DecisionAction::Reject {
        return Err(IndexingError::JoinRejected {
            estimated_rows,
            cap: policy.hardened_join_row_cap.unwrap_or(usize::MAX),
        });
    }

    let (orders, trace) = plan.execute_with(
        policy.join_options,
        |left, right| -> Result<(Column, Column), IndexingError> {
            if right.iter().any(Option::is_none) {
                return Err(IndexingError::KeyNotFound(
                    "not all keys in index".to_owned(),
                ));
            }
            let left_order = Column::arange(needle_len).gather(left, false)?;
            let right_order = Column::arange(haystack_len).gather(right, false)?;
            Ok((left_order, right_order))
        },
    );
    tracing::debug!(
        rows = trace.output_rows,
        used_arena = trace.used_arena,
        "label join complete"
    );
    let (left_order, right_order) = orders?;
    let sorted = sort_by_key(
        &[&right_order],
        &[&left_order, &right_order],
        &[SortKey::ascending(), SortKey::ascending()],
    )?;
    let Some(positions) = sorted.first() else {
        return Ok(GatherMap::from_column_unchecked(
            &Column::arange(0),
            haystack_len,
            false,
        ));
    };
    Ok(GatherMap::from_column_unchecked(positions, haystack_len, false))
}

#[cfg(test)]
mod tests {
    use fp_columnar::Column;
    use fp_join::JoinExecutionOptions;
    use fp_runtime::{DecisionAction, EvidenceLedger, RuntimePolicy};
    use fp_types::{DType, NullKind, Scalar};

    use super::{
        ordered_find, ordered_find_multi, ordered_find_with_policy, reconcile_needles,
    };
    use crate::error::{IndexingError, IndexingErrorKind};

    fn positions(map: &crate::spec::GatherMap) -> Vec<usize> {
        map.positions().iter().flatten().copied().collect()
    }

    #[test]
    fn preserves_needle_order() {
        let haystack = Column::from_utf8(vec!["a", "b", "c", "d"]);
        let needles = Column::from_utf8(vec!["d", "a", "c"]);
        let map = ordered_find(&needles, &haystack).expect("find");
        assert_eq!(positions(&map), vec![3, 0, 2]);
        assert_eq!(map.frame_len(), 4);
        assert!(!map.nullify());
    }

    #[test]
    fn duplicate_haystack_entries_expand_in_haystack_order() {
        let haystack = Column::from_i64(vec![5, 7, 5, 9, 5]);
        let needles = Column::from_i64(vec![9, 5]);
        let map = ordered_find(&needles, &haystack).expect("find");
        assert_eq!(positions(&map), vec![3, 0, 2, 4]);
    }

    #[test]
    fn repeated_needles_repeat_matches() {
        let haystack = Column::from_i64(vec![1, 2, 3]);
        let needles = Column::from_i64(vec![2, 2, 1]);
        let map = ordered_find(&needles, &haystack).expect("find");
        assert_eq!(positions(&map), vec![1, 1, 0]);
    }

    #[test]
    fn missing_needle_fails_whole_lookup() {
        let haystack = Column::from_i64(vec![1, 2, 3]);
        let needles = Column::from_i64(vec![1, 99]);
        let err = ordered_find(&needles, &haystack).expect_err("missing");
        assert_eq!(err.kind(), IndexingErrorKind::KeyNotFound);
    }

    #[test]
    fn numeric_family_needles_cross_cast() {
        let haystack = Column::from_i64(vec![10, 20, 30]);
        let map = ordered_find(&Column::from_f64(vec![30.0, 10.0]), &haystack).expect("float");
        assert_eq!(positions(&map), vec![2, 0]);
        let map = ordered_find(&Column::from_u64(vec![20]), &haystack).expect("unsigned");
        assert_eq!(positions(&map), vec![1]);
    }

    #[test]
    fn lossy_casts_read_as_missing_keys() {
        let haystack = Column::from_i64(vec![1, 2]);
        let err = ordered_find(&Column::from_f64(vec![1.5]), &haystack).expect_err("lossy");
        assert_eq!(err.kind(), IndexingErrorKind::KeyNotFound);
        let unsigned = Column::from_u64(vec![1]);
        let err = ordered_find(&Column::from_i64(vec![-1]), &unsigned).expect_err("negative");
        assert_eq!(err.kind(), IndexingErrorKind::KeyNotFound);
    }

    #[test]
    fn mismatched_kinds_read_as_missing_keys() {
        let haystack = Column::from_i64(vec![1, 2]);
        let err = ordered_find(&Column::from_utf8(vec!["1"]), &haystack).expect_err("kind");
        assert_eq!(err, IndexingError::KeyNotFound("dtype mismatch in label lookup".to_owned()));
        let strings = Column::from_utf8(vec!["1"]);
        let err = ordered_find(&Column::from_i64(vec![1]), &strings).expect_err("object");
        assert_eq!(err.kind(), IndexingErrorKind::KeyNotFound);
    }

    #[test]
    fn reconciliation_keeps_matching_dtypes() {
        let needles = Column::from_bools(vec![true]);
        let out = reconcile_needles(&needles, DType::Bool).expect("same");
        assert_eq!(out, needles);
        let nulls = Column::from_values(vec![Scalar::Null(NullKind::Null)]).expect("nulls");
        assert_eq!(
            reconcile_needles(&nulls, DType::Int64).expect("nulls").dtype(),
            DType::Int64
        );
    }

    #[test]
    fn null_labels_match_null_labels() {
        let haystack = Column::from_values(vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
        ])
        .expect("haystack");
        let needles = Column::from_values(vec![Scalar::Null(NullKind::Null)]).expect("needles");
        let map = ordered_find(&needles, &haystack).expect("null");
        assert_eq!(positions(&map), vec![1]);
    }

    #[test]
    fn empty_needles_give_empty_map() {
        let haystack = Column::from_i64(vec![1, 2]);
        let map = ordered_find(&Column::from_i64(vec![]), &haystack).expect("empty");
        assert!(map.is_empty());
        assert_eq!(map.frame_len(), 2);
    }

    #[test]
    fn compound_keys_match_whole_rows() {
        let level0 = Column::from_utf8(vec!["a", "a", "b", "b"]);
        let level1 = Column::from_i64(vec![1, 2, 1, 2]);
        let needles0 = Column::from_utf8(vec!["b", "a"]);
        let needles1 = Column::from_i64(vec![1, 2]);
        let map = ordered_find_multi(&[&needles0, &needles1], &[&level0, &level1]).expect("multi");
        assert_eq!(positions(&map), vec![2, 1]);
    }

    #[test]
    fn hardened_policy_rejects_oversized_lookups() {
        let haystack = Column::from_i64(vec![1; 10]);
        let needles = Column::from_i64(vec![1, 1]);
        let policy = RuntimePolicy::hardened(Some(5));
        let mut ledger = EvidenceLedger::new();
        let err = ordered_find_with_policy(&needles, &haystack, &policy, &mut ledger)
            .expect_err("rejected");
        assert_eq!(
            err,
            IndexingError::JoinRejected {
                estimated_rows: 20,
                cap: 5
            }
        );
        assert_eq!(err.kind(), IndexingErrorKind::Rejected);
        assert_eq!(ledger.records()[0].action, DecisionAction::Reject);
    }

    #[test]
    fn join_options_do_not_change_results() {
        let haystack = Column::from_utf8(vec!["x", "y", "x"]);
        let needles = Column::from_utf8(vec!["x", "y"]);
        let no_arena = RuntimePolicy::strict().with_join_options(JoinExecutionOptions {
            use_arena: false,
            arena_budget_bytes: 0,
        });
        let mut ledger = EvidenceLedger::new();
        let plain = ordered_find(&needles, &haystack).expect("arena");
        let global =
            ordered_find_with_policy(&needles, &haystack, &no_arena, &mut ledger).expect("global");
        assert_eq!(plain, global);
        assert_eq!(positions(&plain), vec![0, 2, 1]);
    }
}
