//! Run lifecycle and the current-run accessor.
//!
//! A [`SmartLogRun`] owns the teardown of one run: it decides whether to
//! flush once the outcome is known and always cleans up afterwards. While a
//! run is alive its logger is reachable from anywhere through [`current`],
//! so helpers deep inside test code do not need the handle threaded through.
//!
//! Resolution order for [`current`]:
//! 1. the logger installed for the current tokio task by [`SmartLogRun::scope`]
//! 2. the most recently installed logger on the current thread, from
//!    [`SmartLogRun::begin`] or [`enter`]
//!
//! Finished runs are skipped at both levels. Each thread keeps a stack of
//! installed loggers and every installation removes only its own entry, so
//! runs may finish in any order.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use crate::error::{SmartLogError, SmartLogResult};
use crate::flush::RunOutcome;
use crate::logger::SmartLog;

tokio::task_local! {
    static TASK_LOG: SmartLog;
}

thread_local! {
    static THREAD_LOGS: RefCell<Vec<SmartLog>> = const { RefCell::new(Vec::new()) };
}

/// The logger of the active run.
pub fn current() -> SmartLogResult<SmartLog> {
    if let Ok(Some(log)) = TASK_LOG.try_with(|log| (!log.is_finished()).then(|| log.clone())) {
        return Ok(log);
    }
    THREAD_LOGS
        .with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|log| !log.is_finished())
                .cloned()
        })
        .ok_or(SmartLogError::NoActiveRun)
}

/// Run `f` against the active run's logger.
pub fn with_current<R>(f: impl FnOnce(&SmartLog) -> R) -> SmartLogResult<R> {
    current().map(|log| f(&log))
}

/// Push `log` onto this thread's stack, dropping entries of runs that were
/// finished elsewhere.
fn install(log: &SmartLog) {
    THREAD_LOGS.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.retain(|installed| !installed.is_finished());
        stack.push(log.clone());
    });
}

/// Remove the most recent entry for `log` from this thread's stack.
fn uninstall(log: &SmartLog) {
    THREAD_LOGS.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|installed| installed.same_run(log)) {
            stack.remove(pos);
        }
    });
}

/// Install `log` as current for this thread until the guard drops.
pub fn enter(log: &SmartLog) -> CurrentGuard {
    install(log);
    CurrentGuard {
        log: log.clone(),
        _not_send: PhantomData,
    }
}

/// Uninstalls its logger on drop. Tied to the thread that created it.
#[must_use = "the logger stops being current when the guard is dropped"]
pub struct CurrentGuard {
    log: SmartLog,
    _not_send: PhantomData<*const ()>,
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        uninstall(&self.log);
    }
}

/// One run of a test body, from setup to teardown.
///
/// ```ignore
/// let run = SmartLogRun::begin(SmartLog::builder("login works").build());
/// run.log().info(["navigating"]);
/// let result = body().await;
/// run.finish(RunOutcome::from_result(&result)).await?;
/// ```
pub struct SmartLogRun {
    log: SmartLog,
    installed_on: ThreadId,
    finished: bool,
}

impl SmartLogRun {
    /// Start a run and make its logger current for the calling thread.
    pub fn begin(log: SmartLog) -> Self {
        install(&log);
        tracing::debug!(title = %log.title(), "Smart log run started");
        Self {
            log,
            installed_on: thread::current().id(),
            finished: false,
        }
    }

    pub fn log(&self) -> &SmartLog {
        &self.log
    }

    /// Drive `fut` with this run's logger current for the task, wherever
    /// the runtime polls it.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        TASK_LOG.scope(self.log.clone(), fut).await
    }

    /// Apply the flush policy to `outcome`, then clean up.
    ///
    /// Returns whether a flush happened. Cleanup runs even when the flush
    /// fails; the flush error is returned afterwards.
    pub async fn finish(mut self, outcome: RunOutcome) -> SmartLogResult<bool> {
        self.finished = true;

        let flushed = if self.log.should_flush(&outcome) {
            tracing::debug!(
                title = %self.log.title(),
                status = %outcome.status,
                retry = outcome.retry,
                "Flushing smart log"
            );
            self.log.flush().await.map(|_| true)
        } else {
            Ok(false)
        };

        self.teardown();
        flushed
    }

    fn teardown(&mut self) {
        self.log.cleanup();
        // Elsewhere the stale entry is skipped by `current` and pruned on the
        // next install.
        if thread::current().id() == self.installed_on {
            uninstall(&self.log);
        }
    }
}

impl Drop for SmartLogRun {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                title = %self.log.title(),
                entries = self.log.len(),
                "Smart log run dropped without an outcome; discarding buffer"
            );
            self.log.clear();
            self.teardown();
        }
    }
}
