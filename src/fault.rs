//! Process-global fault handler for non-recoverable invariant violations.
//!
//! Returned errors cover the recoverable failures (see [`crate::error`]).
//! Everything else (releasing a foreign chunk, a possible double free, a
//! corrupt header) is an invariant violation: the caller cannot retry, no
//! state was mutated, and the installed handler decides what happens next.
//!
//! The default handler logs the fault and panics on [`Severity::Fatal`].
//! Tests install a temporary handler with [`scoped_handler`] to assert
//! that a fault was (or was not) raised.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

/// The kind of invariant violation being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// `release` was called with a header not in the in-flight table.
    SenderInvalidChunkToFree,
    /// `send` was called with a header not in the in-flight table.
    SenderInvalidChunkToSend,
    /// `push_to_history` was called with a header not in the in-flight table.
    SenderInvalidChunkToPushToHistory,
    /// A chunk was returned to a pool that still considered it free.
    MempoolPossibleDoubleFree,
    /// A chunk pointer was returned that no configured pool contains.
    MempoolChunkNotInPool,
    /// The distributor's queue container is full.
    QueueContainerOverflow,
}

/// How severe a fault is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// State is consistent; the operation was refused.
    Moderate,
    /// State may have been damaged by a misbehaving caller.
    Severe,
    /// The process must not continue.
    Fatal,
}

type Handler = Box<dyn Fn(FaultKind, Severity) + Send + Sync>;

fn handler_slot() -> &'static RwLock<Option<Handler>> {
    static HANDLER: OnceLock<RwLock<Option<Handler>>> = OnceLock::new();
    HANDLER.get_or_init(|| RwLock::new(None))
}

fn scope_lock() -> &'static Mutex<()> {
    static SCOPE: OnceLock<Mutex<()>> = OnceLock::new();
    SCOPE.get_or_init(|| Mutex::new(()))
}

/// Report an invariant violation to the installed handler.
///
/// The caller must not assume this returns: the default handler panics on
/// [`Severity::Fatal`].
pub fn report(kind: FaultKind, severity: Severity) {
    let guard = handler_slot()
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    match guard.as_ref() {
        Some(handler) => handler(kind, severity),
        None => default_handler(kind, severity),
    }
}

fn default_handler(kind: FaultKind, severity: Severity) {
    tracing::error!(?kind, ?severity, "invariant violation");
    if severity == Severity::Fatal {
        panic!("fatal invariant violation: {kind:?}");
    }
}

/// Install `handler` for the lifetime of the returned guard.
///
/// The previous handler is restored when the guard drops. Guards hold a
/// process-wide lock for their whole lifetime, so concurrently running
/// tests that replace the handler serialize instead of interleaving.
pub fn scoped_handler<F>(handler: F) -> ScopedFaultHandler
where
    F: Fn(FaultKind, Severity) + Send + Sync + 'static,
{
    let serial = scope_lock().lock().unwrap_or_else(PoisonError::into_inner);
    let previous = handler_slot()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(Box::new(handler));
    ScopedFaultHandler {
        previous: Some(previous),
        _serial: serial,
    }
}

/// Guard returned by [`scoped_handler`]; restores the previous handler on drop.
pub struct ScopedFaultHandler {
    previous: Option<Option<Handler>>,
    _serial: MutexGuard<'static, ()>,
}

impl Drop for ScopedFaultHandler {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *handler_slot()
                .write()
                .unwrap_or_else(PoisonError::into_inner) = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_scoped_handler_receives_fault() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let _guard = scoped_handler(move |kind, severity| {
            assert_eq!(kind, FaultKind::MempoolPossibleDoubleFree);
            assert_eq!(severity, Severity::Severe);
            seen.fetch_add(1, Ordering::Relaxed);
        });

        report(FaultKind::MempoolPossibleDoubleFree, Severity::Severe);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handler_restored_after_scope() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&calls);
            let _guard = scoped_handler(move |_, _| {
                seen.fetch_add(1, Ordering::Relaxed);
            });
            report(FaultKind::QueueContainerOverflow, Severity::Moderate);
        }
        // Back to the default handler; Moderate faults only log.
        report(FaultKind::QueueContainerOverflow, Severity::Moderate);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
