use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing id for one detoured call, scoped to the
/// process. Not persisted across process boundaries — the controller
/// correlates records by `(PipId, OperationId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub u64);

/// Groups the handful of reports a single logical API call can produce
/// (e.g. every hop of a reparse-point chain) under one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

/// The identifier of the pip (build step) whose process tree is sandboxed.
/// Supplied by the controller as part of the manifest payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipId(pub u64);

/// A lightweight version token attached to manifest records and reports.
/// Comparison is the only operation the engine relies on — it never
/// interprets the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Usn(pub u64);

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

impl OperationId {
    /// Allocates the next operation id for this process. Detour entry
    /// points call this once per intercepted API invocation.
    pub fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl CorrelationId {
    pub fn next() -> Self {
        Self(NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}
