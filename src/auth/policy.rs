//! Negative-stock authorization table.
//!
//! A pure function of the acting role, whether the movement would leave the
//! item below zero, and whether the caller asked for an override. It never
//! touches storage and the override decision is not persisted.

use super::Role;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Viewers cannot record movements at all
    ReadOnlyRole,
    /// Only admins may take stock below zero
    NegativeStockRequiresAdmin,
    /// Admin would go negative but did not set the override flag
    OverrideNotRequested,
}

impl DenyReason {
    /// Whether the denial is about the negative-stock override rather than the role itself.
    pub fn needs_admin_override(&self) -> bool {
        matches!(
            self,
            DenyReason::NegativeStockRequiresAdmin | DenyReason::OverrideNotRequested
        )
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::ReadOnlyRole => write!(f, "read-only role cannot record movements"),
            DenyReason::NegativeStockRequiresAdmin => {
                write!(f, "negative stock requires an admin override")
            }
            DenyReason::OverrideNotRequested => {
                write!(f, "negative stock requires an explicit admin override")
            }
        }
    }
}

pub fn evaluate(role: Role, would_go_negative: bool, allow_negative: bool) -> Decision {
    match (role, would_go_negative, allow_negative) {
        (Role::Viewer, _, _) => Decision::Deny(DenyReason::ReadOnlyRole),
        (Role::Staff | Role::Admin, false, _) => Decision::Allow,
        (Role::Staff, true, _) => Decision::Deny(DenyReason::NegativeStockRequiresAdmin),
        (Role::Admin, true, false) => Decision::Deny(DenyReason::OverrideNotRequested),
        (Role::Admin, true, true) => Decision::Allow,
    }
}
