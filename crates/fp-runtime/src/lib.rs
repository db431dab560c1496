#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use fp_join::JoinExecutionOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Strict,
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A key that could name either a row label or a (row, column) pair.
    AmbiguousKey,
    JoinCardinality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub ts_unix_ms: u64,
    pub mode: RuntimeMode,
    pub action: DecisionAction,
    pub issue: CompatibilityIssue,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLedger {
    records: Vec<DecisionRecord>,
}

impl EvidenceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[DecisionRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePolicy {
    pub mode: RuntimeMode,
    pub hardened_join_row_cap: Option<usize>,
    pub join_options: JoinExecutionOptions,
}

impl RuntimePolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
            hardened_join_row_cap: None,
            join_options: JoinExecutionOptions::default(),
        }
    }

    #[must_use]
    pub fn hardened(join_row_cap: Option<usize>) -> Self {
        Self {
            mode: RuntimeMode::Hardened,
            hardened_join_row_cap: join_row_cap,
            join_options: JoinExecutionOptions::default(),
        }
    }

    #[must_use]
    pub fn with_join_options(mut self, join_options: JoinExecutionOptions) -> Self {
        self.join_options = join_options;
        self
    }

    /// Admit or reject a label lookup whose join would produce
    /// `estimated_rows` rows. Strict mode always admits; hardened mode
    /// rejects anything above the configured cap.
    pub fn decide_join_admission(
        &self,
        estimated_rows: usize,
        ledger: &mut EvidenceLedger,
    ) -> DecisionAction {
        let cap = self.hardened_join_row_cap.unwrap_or(usize::MAX);
        let action = if matches!(self.mode, RuntimeMode::Hardened) && estimated_rows > cap {
            DecisionAction::Reject
        } else {
            DecisionAction::Allow
        };
        self.record(
            CompatibilityIssue {
                kind: IssueKind::JoinCardinality,
                subject: "join_estimator".to_owned(),
                detail: format!("estimated_rows={estimated_rows}"),
            },
            action,
            ledger,
        );
        action
    }

    /// Record how an ambiguous key was resolved. Resolution is best-effort
    /// and never fails, so the action is always `Allow`.
    pub fn record_ambiguity(
        &self,
        subject: impl Into<String>,
        detail: impl Into<String>,
        ledger: &mut EvidenceLedger,
    ) {
        self.record(
            CompatibilityIssue {
                kind: IssueKind::AmbiguousKey,
                subject: subject.into(),
                detail: detail.into(),
            },
            DecisionAction::Allow,
            ledger,
        );
    }

    fn record(&self, issue: CompatibilityIssue, action: DecisionAction, ledger: &mut EvidenceLedger) {
        ledger.push(DecisionRecord {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            mode: self.mode,
            action,
            issue,
        });
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::strict()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
}

fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}

#[cfg(test)]
mod tests {
    use fp_join::JoinExecutionOptions;

    use super::{DecisionAction, EvidenceLedger, IssueKind, RuntimeMode, RuntimePolicy};

    #[test]
    fn default_policy_is_strict() {
        let policy = RuntimePolicy::default();
        assert_eq!(policy.mode, RuntimeMode::Strict);
        assert_eq!(policy.hardened_join_row_cap, None);
        assert_eq!(policy.join_options, JoinExecutionOptions::default());
    }

    #[test]
    fn strict_mode_admits_any_cardinality() {
        let mut policy = RuntimePolicy::strict();
        policy.hardened_join_row_cap = Some(1);
        let mut ledger = EvidenceLedger::new();
        let action = policy.decide_join_admission(1_000_000, &mut ledger);
        assert_eq!(action, DecisionAction::Allow);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn hardened_join_cap_rejects_over_cap() {
        let policy = RuntimePolicy::hardened(Some(1000));
        let mut ledger = EvidenceLedger::new();
        assert_eq!(
            policy.decide_join_admission(1000, &mut ledger),
            DecisionAction::Allow
        );
        assert_eq!(
            policy.decide_join_admission(1001, &mut ledger),
            DecisionAction::Reject
        );

        let record = ledger.records().last().expect("record");
        assert_eq!(record.mode, RuntimeMode::Hardened);
        assert_eq!(record.issue.kind, IssueKind::JoinCardinality);
        assert_eq!(record.issue.detail, "estimated_rows=1001");
    }

    #[test]
    fn hardened_without_cap_admits() {
        let policy = RuntimePolicy::hardened(None);
        let mut ledger = EvidenceLedger::new();
        assert_eq!(
            policy.decide_join_admission(usize::MAX, &mut ledger),
            DecisionAction::Allow
        );
    }

    #[test]
    fn ambiguity_is_recorded_and_allowed() {
        let policy = RuntimePolicy::strict();
        let mut ledger = EvidenceLedger::new();
        policy.record_ambiguity("loc_tuple_key", "second element is a column label", &mut ledger);
        let record = &ledger.records()[0];
        assert_eq!(record.issue.kind, IssueKind::AmbiguousKey);
        assert_eq!(record.action, DecisionAction::Allow);
        assert_eq!(record.issue.subject, "loc_tuple_key");
    }

    #[test]
    fn join_options_override_keeps_mode() {
        let options = JoinExecutionOptions {
            use_arena: false,
            arena_budget_bytes: 0,
        };
        let policy = RuntimePolicy::hardened(Some(8)).with_join_options(options);
        assert_eq!(policy.mode, RuntimeMode::Hardened);
        assert_eq!(policy.join_options, options);
    }

    #[test]
    fn ledger_serializes_to_json() {
        let policy = RuntimePolicy::hardened(Some(1));
        let mut ledger = EvidenceLedger::new();
        policy.decide_join_admission(2, &mut ledger);
        let json = serde_json::to_value(&ledger).expect("serialize");
        let action = &json["records"][0]["action"];
        assert_eq!(action, "reject");
        let back: EvidenceLedger = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, ledger);
    }
}
