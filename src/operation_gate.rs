//! Single-operation gate for coordinators and orchestrators.
//!
//! A coordinator runs at most one extraction at a time. A second call while
//! busy fails fast instead of queuing, so the gate only offers a non-blocking
//! `try_acquire()`. The busy flag is an atomic test-and-set; the guard clears
//! it on drop, which covers early returns, cancellation and panics alike.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// What kind of operation holds the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Quality gate + recognition only (coordinator entry point)
    TextExtraction,
    /// Full nutrition-label pipeline
    NutritionExtraction,
    /// Full scale-display pipeline
    WeightDetection,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextExtraction => write!(f, "Text extraction"),
            Self::NutritionExtraction => write!(f, "Nutrition extraction"),
            Self::WeightDetection => write!(f, "Weight detection"),
        }
    }
}

/// Snapshot of the operation currently holding the gate.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    /// When the operation started (RFC 3339).
    pub started_at: String,
}

// ═══════════════════════════════════════════════════════════
// OperationGate
// ═══════════════════════════════════════════════════════════

/// At-most-one-operation controller.
///
/// The guard borrows the gate, never a lock guard, so it can be held across
/// `.await` points in a `Send` future.
pub struct OperationGate {
    busy: AtomicBool,
    current_op: Mutex<Option<ActiveOperation>>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            current_op: Mutex::new(None),
        }
    }

    /// Try to take the gate. Returns `None` if another operation holds it.
    pub fn try_acquire(&self, kind: OperationKind) -> Option<OperationGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.set_current_op(kind);
        Some(OperationGuard { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Returns `None` when idle.
    pub fn current_operation(&self) -> Option<ActiveOperation> {
        self.current_op.lock().ok()?.clone()
    }

    // ── Internal ────────────────────────────────────────────

    fn set_current_op(&self, kind: OperationKind) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = Some(ActiveOperation {
                kind,
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
    }

    fn release(&self) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = None;
        }
        self.busy.store(false, Ordering::Release);
    }
}

impl Default for OperationGate {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// OperationGuard: RAII busy token
// ═══════════════════════════════════════════════════════════

/// Dropping the guard clears the busy flag and the current operation.
pub struct OperationGuard<'a> {
    gate: &'a OperationGate,
}

impl OperationGuard<'_> {
    pub fn kind(&self) -> Option<OperationKind> {
        self.gate.current_operation().map(|op| op.kind)
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
