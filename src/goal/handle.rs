//! goal::handle
//!
//! Handles to started computations.
//!
//! A [`GoalHandle`] is created once per launch of a goal and reaches exactly
//! one terminal outcome. Every clone observes the same outcome; handles are
//! compared by identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;

use crate::core::sync::lock;
use crate::core::types::Value;

use super::scope::CancelToken;
use super::GoalError;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Observable state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GoalStatus::Running)
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStatus::Running => write!(f, "running"),
            GoalStatus::Completed => write!(f, "completed"),
            GoalStatus::Failed => write!(f, "failed"),
            GoalStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

fn status_of<T>(outcome: &Option<Result<T, GoalError>>) -> GoalStatus {
    match outcome {
        None => GoalStatus::Running,
        Some(Ok(_)) => GoalStatus::Completed,
        Some(Err(e)) if e.is_cancellation() => GoalStatus::Cancelled,
        Some(Err(_)) => GoalStatus::Failed,
    }
}

type Callback<T> = Box<dyn FnOnce(&Result<T, GoalError>) + Send>;

struct HandleShared<T> {
    id: u64,
    token: CancelToken,
    outcome: watch::Sender<Option<Result<T, GoalError>>>,
    callbacks: Mutex<Vec<Callback<T>>>,
}

/// Handle to one launch of a goal.
pub struct GoalHandle<T: Value>(Arc<HandleShared<T>>);

impl<T: Value> GoalHandle<T> {
    /// A handle whose body has not finished yet; `token` cancels the body.
    pub(crate) fn running(token: CancelToken) -> Self {
        let (outcome, _) = watch::channel(None);
        Self(Arc::new(HandleShared {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            token,
            outcome,
            callbacks: Mutex::new(Vec::new()),
        }))
    }

    /// A handle that is already completed with `value`.
    pub(crate) fn completed(value: T) -> Self {
        let handle = Self::running(CancelToken::new());
        handle.complete(Ok(value));
        handle
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn status(&self) -> GoalStatus {
        status_of(&self.0.outcome.borrow())
    }

    pub fn is_completed(&self) -> bool {
        self.0.outcome.borrow().is_some()
    }

    /// The outcome, if the handle is terminal.
    pub fn try_result(&self) -> Option<Result<T, GoalError>> {
        self.0.outcome.borrow().clone()
    }

    /// Wait for the terminal outcome.
    pub async fn join(&self) -> Result<T, GoalError> {
        let mut rx = self.0.outcome.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(GoalError::Cancelled("handle dropped".into())))
    }

    /// Run `callback` once the handle is terminal.
    ///
    /// Runs immediately on the calling thread if the handle already is.
    pub fn on_complete(&self, callback: impl FnOnce(&Result<T, GoalError>) + Send + 'static) {
        let ready = {
            let mut callbacks = lock(&self.0.callbacks);
            let ready = self.0.outcome.borrow().clone();
            if ready.is_none() {
                callbacks.push(Box::new(callback));
                return;
            }
            ready
        };
        if let Some(outcome) = ready {
            callback(&outcome);
        }
    }

    /// Cancel the computation.
    ///
    /// No effect on a handle that is already terminal.
    pub fn cancel(&self) {
        self.cancel_with(GoalError::Cancelled("cancelled by caller".into()));
    }

    pub(crate) fn cancel_with(&self, reason: GoalError) {
        self.complete(Err(reason));
        self.0.token.cancel();
    }

    /// Record the terminal outcome. Returns false if one was already recorded.
    pub(crate) fn complete(&self, outcome: Result<T, GoalError>) -> bool {
        let callbacks = {
            let mut callbacks = lock(&self.0.callbacks);
            if self.0.outcome.borrow().is_some() {
                return false;
            }
            self.0.outcome.send_replace(Some(outcome.clone()));
            std::mem::take(&mut *callbacks)
        };
        for callback in callbacks {
            callback(&outcome);
        }
        true
    }

    pub(crate) fn downgrade(&self) -> WeakGoalHandle<T> {
        WeakGoalHandle(Arc::downgrade(&self.0))
    }

    /// Same handle behind the type-erased interface.
    pub fn erased(&self) -> Arc<dyn AnyHandle> {
        Arc::new(self.clone())
    }
}

impl<T: Value> Clone for GoalHandle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Value> PartialEq for GoalHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Value> Eq for GoalHandle<T> {}

impl<T: Value> fmt::Debug for GoalHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalHandle")
            .field("id", &self.0.id)
            .field("status", &self.status())
            .finish()
    }
}

pub(crate) struct WeakGoalHandle<T>(Weak<HandleShared<T>>);

impl<T: Value> WeakGoalHandle<T> {
    pub(crate) fn upgrade(&self) -> Option<GoalHandle<T>> {
        self.0.upgrade().map(GoalHandle)
    }
}

/// Type-erased view of a [`GoalHandle`], used across dependency edges.
pub trait AnyHandle: Send + Sync {
    fn id(&self) -> u64;

    fn status(&self) -> GoalStatus;

    /// Run `callback` on termination with the error, or `None` on success.
    fn on_terminal(&self, callback: Box<dyn FnOnce(Option<GoalError>) + Send>);

    fn cancel(&self);
}

impl<T: Value> AnyHandle for GoalHandle<T> {
    fn id(&self) -> u64 {
        GoalHandle::id(self)
    }

    fn status(&self) -> GoalStatus {
        GoalHandle::status(self)
    }

    fn on_terminal(&self, callback: Box<dyn FnOnce(Option<GoalError>) + Send>) {
        self.on_complete(move |outcome| callback(outcome.as_ref().err().cloned()));
    }

    fn cancel(&self) {
        GoalHandle::cancel(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn completed_handle_reports_value() {
        let handle = GoalHandle::completed(3);
        assert!(handle.is_completed());
        assert_eq!(handle.status(), GoalStatus::Completed);
        assert_eq!(handle.try_result().unwrap().unwrap(), 3);
    }

    #[test]
    fn first_outcome_wins() {
        let handle: GoalHandle<i32> = GoalHandle::running(CancelToken::new());
        assert!(handle.complete(Ok(1)));
        assert!(!handle.complete(Ok(2)));
        handle.cancel();
        assert_eq!(handle.try_result().unwrap().unwrap(), 1);
    }

    #[test]
    fn callbacks_run_once_before_and_after_completion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle: GoalHandle<i32> = GoalHandle::running(CancelToken::new());

        let before = Arc::clone(&calls);
        handle.on_complete(move |_| {
            before.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        handle.complete(Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let after = Arc::clone(&calls);
        handle.on_complete(move |outcome| {
            assert_eq!(*outcome.as_ref().unwrap(), 5);
            after.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_cancels_token() {
        let token = CancelToken::new();
        let handle: GoalHandle<i32> = GoalHandle::running(token.clone());
        handle.cancel();
        assert!(token.is_cancelled());
        assert_eq!(handle.status(), GoalStatus::Cancelled);
    }

    #[test]
    fn identity_equality() {
        let a = GoalHandle::completed(1);
        let b = GoalHandle::completed(1);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn join_waits_for_outcome() {
        let handle: GoalHandle<&'static str> = GoalHandle::running(CancelToken::new());
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.join().await });
        tokio::task::yield_now().await;
        handle.complete(Ok("done"));
        assert_eq!(task.await.unwrap().unwrap(), "done");
    }

    #[test]
    fn erased_reports_failure_cause() {
        let handle: GoalHandle<i32> = GoalHandle::running(CancelToken::new());
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        handle.erased().on_terminal(Box::new(move |err| {
            *lock(&sink) = err;
        }));
        handle.complete(Err(GoalError::failed("boom")));
        assert!(matches!(*lock(&seen), Some(GoalError::Failed(_))));
    }
}
