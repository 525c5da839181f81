use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a capacity request was refused. Session-level exhaustion always wins
/// over tier-level exhaustion when both apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CapacityReason {
    SessionFull,
    TierFull,
}

impl CapacityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityReason::SessionFull => "session_full",
            CapacityReason::TierFull => "tier_full",
        }
    }
}

impl std::fmt::Display for CapacityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The counts a capacity decision was based on. For a series, `registered`
/// counts distinct users across the whole series, not rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityCounts {
    pub registered: i64,
    pub capacity: i32,
    pub tier_registered: Option<i64>,
    pub tier_capacity: Option<i32>,
}

/// Outcome of a capacity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityDecision {
    pub has_capacity: bool,
    pub reason: Option<CapacityReason>,
    pub counts: CapacityCounts,
}

impl CapacityDecision {
    pub fn granted(counts: CapacityCounts) -> Self {
        Self {
            has_capacity: true,
            reason: None,
            counts,
        }
    }

    pub fn refused(reason: CapacityReason, counts: CapacityCounts) -> Self {
        Self {
            has_capacity: false,
            reason: Some(reason),
            counts,
        }
    }
}

/// Per-tier worst case across an offering's sessions: the maximum concurrent
/// non-cancelled registration count any single session reaches. Used to size
/// tier capacity when sessions are independent occurrences rather than a
/// series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPeak {
    pub tier_id: Uuid,
    pub peak: i64,
}
