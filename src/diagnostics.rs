//! Request-scoped diagnostic context
//!
//! Some engines read debug flags from shared state instead of from the call
//! arguments. [`DiagnosticContext`] is that shared state, partitioned by
//! thread: a request runs synchronously on one worker thread, so each
//! thread's entries belong to exactly one in-flight request.
//! [`DiagnosticScope`] installs a request's flags and removes them again when
//! dropped, which covers normal return, early `?` return and panic unwinding
//! alike.
//!
//! The gatekeeper also passes a snapshot of the flags explicitly inside
//! [`crate::execution::ExecutionContext`]; executors should prefer that.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

static GLOBAL: OnceLock<Arc<DiagnosticContext>> = OnceLock::new();

/// Diagnostic flags per worker thread.
#[derive(Debug, Default)]
pub struct DiagnosticContext {
    entries: DashMap<ThreadId, BTreeMap<String, String>>,
}

impl DiagnosticContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance.
    pub fn global() -> Arc<DiagnosticContext> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(DiagnosticContext::new())))
    }

    /// Replace the calling thread's entries.
    pub fn install(&self, entries: BTreeMap<String, String>) {
        self.entries.insert(thread::current().id(), entries);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(&thread::current().id())
            .and_then(|entries| entries.get(key).cloned())
    }

    /// The calling thread's entries.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .get(&thread::current().id())
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Drop the calling thread's entries.
    pub fn clear(&self) {
        self.entries.remove(&thread::current().id());
    }

    /// True when no thread has entries installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install `entries` (if any) on the calling thread for the lifetime of
    /// the returned guard.
    ///
    /// The guard clears the thread's entries on drop even when nothing was
    /// installed.
    pub fn scope(&self, entries: &BTreeMap<String, String>) -> DiagnosticScope<'_> {
        if !entries.is_empty() {
            self.install(entries.clone());
        }
        DiagnosticScope {
            context: self,
            thread: thread::current().id(),
        }
    }
}

/// Clears one thread's entries in its [`DiagnosticContext`] on drop.
#[must_use = "the diagnostic context is cleared as soon as the scope is dropped"]
pub struct DiagnosticScope<'a> {
    context: &'a DiagnosticContext,
    thread: ThreadId,
}

impl Drop for DiagnosticScope<'_> {
    fn drop(&mut self) {
        self.context.entries.remove(&self.thread);
    }
}
