use crate::fetch::RawSnapshot;
use crate::model::{HistoryRow, Snapshot};

/// Replaces the upstream goal with a configured constant, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoalOverride {
    goal: Option<u64>,
}

impl GoalOverride {
    pub fn new(goal: Option<u64>) -> Self {
        Self { goal }
    }

    pub fn fixed(goal: u64) -> Self {
        Self { goal: Some(goal) }
    }

    pub fn resolve(&self, upstream_goal: u64) -> u64 {
        self.goal.unwrap_or(upstream_goal)
    }

    pub fn apply(&self, raw: RawSnapshot) -> Snapshot {
        Snapshot::new(raw.signature_count, self.resolve(raw.goal))
    }

    pub fn apply_row(&self, mut row: HistoryRow) -> HistoryRow {
        row.goal = self.resolve(row.goal);
        row
    }

    pub fn apply_rows(&self, rows: Vec<HistoryRow>) -> Vec<HistoryRow> {
        rows.into_iter().map(|row| self.apply_row(row)).collect()
    }
}
