//! Prometheus metrics for resctrl group management
//!
//! Registered in the default registry on first use; expose them with
//! `prometheus::gather()` from whatever serves `/metrics` in the host
//! process.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Gauge,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Group Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Allocation class directories created by this process.
    pub static ref RDT_GROUPS_CREATED: Counter = register_counter!(
        "rdtvisor_groups_created_total",
        "resctrl groups created"
    ).expect("failed to register RDT_GROUPS_CREATED metric");

    /// Allocation class directories removed after their last holder left.
    pub static ref RDT_GROUPS_REMOVED: Counter = register_counter!(
        "rdtvisor_groups_removed_total",
        "resctrl groups removed"
    ).expect("failed to register RDT_GROUPS_REMOVED metric");

    /// Groups currently held by at least one manager (owned or not).
    pub static ref RDT_ACTIVE_GROUPS: Gauge = register_gauge!(
        "rdtvisor_active_groups",
        "resctrl groups currently in use"
    ).expect("failed to register RDT_ACTIVE_GROUPS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Schemata
    // ─────────────────────────────────────────────────────────────────────────────

    /// Writes to a group's schemata file.
    pub static ref RDT_SCHEMA_WRITES: Counter = register_counter!(
        "rdtvisor_schema_writes_total",
        "schemata files written"
    ).expect("failed to register RDT_SCHEMA_WRITES metric");

    /// Schema verifications that did not match.
    ///
    /// Labels:
    /// - stage: "write" (kernel changed what was written) or
    ///   "join" (requested policy differs from a shared group's)
    pub static ref RDT_SCHEMA_MISMATCHES: CounterVec = register_counter_vec!(
        "rdtvisor_schema_mismatches_total",
        "schemata verifications that failed",
        &["stage"]
    ).expect("failed to register RDT_SCHEMA_MISMATCHES metric");
}
