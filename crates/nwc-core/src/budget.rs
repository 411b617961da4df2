//! Permission tags and per-budget cycle math.
//!
//! This module is pure: it has no store or queue dependency. [`crate::queue`]
//! calls [`current_cycle`] and sums spend inside the single consumer task to
//! get the linearizability a budget check requires; this module only
//! computes the window.

use crate::store::{Budget, ClientKey};

/// A NIP-47 method name, e.g. `"pay_invoice"`.
pub type Method = &'static str;

/// One row of the fixed tag→methods table.
struct PermissionTag {
    tag: &'static str,
    methods: &'static [Method],
}

const PERMISSION_TABLE: &[PermissionTag] = &[
    PermissionTag {
        tag: "pay",
        methods: &["pay_invoice", "multi_pay_invoice", "pay_keysend", "multi_pay_keysend"],
    },
    PermissionTag {
        tag: "invoice",
        methods: &["make_invoice"],
    },
    PermissionTag {
        tag: "lookup",
        methods: &["lookup_invoice"],
    },
    PermissionTag {
        tag: "history",
        methods: &["list_transactions"],
    },
    PermissionTag {
        tag: "balance",
        methods: &["get_balance"],
    },
    PermissionTag {
        tag: "info",
        methods: &["get_info"],
    },
];

/// Every method name the provider implements, in the order published in the
/// kind-13194 info event's `content`.
pub const SUPPORTED_METHODS: &[Method] = &[
    "pay_invoice",
    "multi_pay_invoice",
    "make_invoice",
    "lookup_invoice",
    "list_transactions",
    "get_balance",
    "get_info",
];

/// Methods granted by a space-joined `permissions` string. Unknown tags are
/// ignored (forward-compatible with future tags).
pub fn methods_for_permissions(permissions: &str) -> Vec<Method> {
    let mut methods = Vec::new();
    for tag in permissions.split_whitespace() {
        if let Some(row) = PERMISSION_TABLE.iter().find(|row| row.tag == tag) {
            for m in row.methods {
                if !methods.contains(m) {
                    methods.push(m);
                }
            }
        }
    }
    methods
}

/// Whether `permissions` grants `method`.
pub fn is_permitted(permissions: &str, method: &str) -> bool {
    methods_for_permissions(permissions).iter().any(|m| *m == method)
}

/// `supported_methods ∩ methods(permissions)`, in [`SUPPORTED_METHODS`] order
/// — the `get_info.methods` field.
pub fn permitted_supported_methods(permissions: &str) -> Vec<Method> {
    let granted = methods_for_permissions(permissions);
    SUPPORTED_METHODS
        .iter()
        .copied()
        .filter(|m| granted.contains(m))
        .collect()
}

/// Whether `client` is usable at `now`: non-expired.
pub fn is_active(client: &ClientKey, now: u64) -> bool {
    !client.is_expired(now)
}

/// A budget's current accounting window, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    /// Inclusive start of the window.
    pub start: u64,
    /// Exclusive end of the window. `u64::MAX` for a never-refreshing budget.
    pub end: u64,
}

/// Compute `budget`'s current cycle at `now`.
///
/// `refresh_window <= 0` means "never refresh": a single lifetime cap with
/// window `[created_at, +∞)` (we model `+∞` as `u64::MAX`, which no real
/// `created_at` will ever reach).
pub fn current_cycle(budget: &Budget, now: u64) -> Cycle {
    if budget.refresh_window <= 0 {
        return Cycle {
            start: budget.created_at,
            end: u64::MAX,
        };
    }
    let window = budget.refresh_window as u64;
    let elapsed = now.saturating_sub(budget.created_at);
    let passed_cycles = elapsed / window;
    let last_cycle = budget.created_at + passed_cycles * window;
    Cycle {
        start: last_cycle,
        end: last_cycle + window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(created_at: u64, refresh_window: i64, budget_msats: u64) -> Budget {
        Budget {
            id: "b1".into(),
            pubkey: "pk".into(),
            budget_msats,
            refresh_window,
            created_at,
        }
    }

    #[test]
    fn cycle_math_matches_spec_example() {
        let b = budget(1_000, 3_600, 100_000);
        let cycle = current_cycle(&b, 1_000 + 7_000);
        assert_eq!(cycle.start, 1_000 + 3_600); // passed_cycles = 7000/3600 = 1
        assert_eq!(cycle.end, 1_000 + 3_600 + 3_600);
    }

    #[test]
    fn non_refreshing_budget_has_unbounded_window() {
        let b = budget(1_000, 0, 100_000);
        let cycle = current_cycle(&b, 1_000_000_000);
        assert_eq!(cycle.start, 1_000);
        assert_eq!(cycle.end, u64::MAX);
    }

    #[test]
    fn pay_tag_grants_its_methods() {
        let methods = methods_for_permissions("pay info");
        assert!(methods.contains(&"pay_invoice"));
        assert!(methods.contains(&"multi_pay_invoice"));
        assert!(methods.contains(&"get_info"));
        assert!(!methods.contains(&"make_invoice"));
    }

    #[test]
    fn permission_closure_is_intersection_of_supported_and_granted() {
        assert_eq!(
            permitted_supported_methods("info"),
            vec!["get_info"]
        );
        assert_eq!(
            permitted_supported_methods("pay invoice lookup history balance info"),
            SUPPORTED_METHODS.to_vec()
        );
    }

    #[test]
    fn restricted_client_lacks_make_invoice() {
        assert!(!is_permitted("info", "make_invoice"));
    }
}
