//! goal::scope
//!
//! Structured-concurrency scope that goals and operators run on.
//!
//! # Design
//!
//! A [`Scope`] is a cheap value bundling:
//! - a `tokio` runtime handle to spawn on (the scope never owns the runtime)
//! - a hierarchical [`CancelToken`]; cancelling a scope cancels every child
//! - the [`ExecutionRestriction`] in force, passed explicitly rather than
//!   through thread-local state
//!
//! # Example
//!
//! ```
//! use goaltree::goal::scope::Scope;
//!
//! # tokio_test::block_on(async {
//! let scope = Scope::current().unwrap();
//! let child = scope.child();
//!
//! scope.cancel();
//! assert!(child.is_cancelled());
//! # });
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub use crate::core::config::ExecutionRestriction;
use crate::core::config::Config;
use crate::core::sync::lock;

use super::GoalError;

/// Smallest child count that triggers a sweep of dropped children.
const MIN_PRUNE_AT: usize = 16;

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Children>,
}

/// Weak links to child tokens.
///
/// Dead links are swept only once the list reaches `prune_at`, which then
/// moves to twice the surviving count.
#[derive(Debug, Default)]
struct Children {
    live: Vec<Weak<TokenInner>>,
    prune_at: usize,
}

impl Children {
    fn push(&mut self, child: Weak<TokenInner>) {
        if self.live.len() >= self.prune_at {
            self.live.retain(|weak| weak.strong_count() > 0);
            self.prune_at = (self.live.len() * 2).max(MIN_PRUNE_AT);
        }
        self.live.push(child);
    }
}

/// Hierarchical cancellation flag.
///
/// Cancelling a token cancels all tokens derived from it with
/// [`CancelToken::child`]. Cancellation is permanent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<TokenInner>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is cancelled whenever this one is.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        {
            let mut children = lock(&self.0.children);
            if !self.is_cancelled() {
                children.push(Arc::downgrade(&child.0));
                return child;
            }
        }
        child.cancel();
        child
    }

    pub fn cancel(&self) {
        if self.0.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.0.notify.notify_waiters();
        let children = std::mem::take(&mut lock(&self.0.children).live);
        for child in children.iter().filter_map(Weak::upgrade) {
            CancelToken(child).cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Execution context for goals and operators.
#[derive(Debug, Clone)]
pub struct Scope {
    runtime: Handle,
    token: CancelToken,
    restriction: ExecutionRestriction,
}

impl Scope {
    /// A root scope spawning on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            token: CancelToken::new(),
            restriction: ExecutionRestriction::None,
        }
    }

    /// A root scope on the ambient tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `GoalError::NoRuntime` outside a tokio runtime.
    pub fn current() -> Result<Self, GoalError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| GoalError::NoRuntime)
    }

    /// Apply configured defaults.
    pub fn with_config(self, config: &Config) -> Self {
        self.restricted(config.restriction())
    }

    /// Same scope under a different execution restriction.
    pub fn restricted(&self, restriction: ExecutionRestriction) -> Self {
        Self {
            restriction,
            ..self.clone()
        }
    }

    pub fn restriction(&self) -> ExecutionRestriction {
        self.restriction
    }

    /// A sub-scope cancelled together with this one.
    ///
    /// Cancelling the child leaves this scope untouched.
    pub fn child(&self) -> Scope {
        Self {
            runtime: self.runtime.clone(),
            token: self.token.child(),
            restriction: self.restriction,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Spawn a task bound to this scope.
    ///
    /// The task yields `None` if the scope is cancelled first. It runs in
    /// the caller's current tracing span.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        let task = async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                output = future => Some(output),
            }
        };
        self.runtime.spawn(task.in_current_span())
    }

    /// Apply the execution restriction before launching a computation.
    pub(crate) fn check_restriction(&self, goal_id: u64) -> Result<(), GoalError> {
        match self.restriction {
            ExecutionRestriction::None => Ok(()),
            ExecutionRestriction::Warn => {
                tracing::warn!(goal = goal_id, "goal started while eager execution is restricted");
                Ok(())
            }
            ExecutionRestriction::Error => Err(GoalError::EagerExecution(format!(
                "goal {} started while eager execution is forbidden",
                goal_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[test]
    fn child_of_cancelled_is_cancelled() {
        let parent = CancelToken::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn cancelling_child_leaves_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        let grandchild = child.child();
        child.cancel();
        assert!(grandchild.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn dropped_children_are_swept() {
        let parent = CancelToken::new();
        let kept = parent.child();
        for _ in 0..10_000 {
            drop(parent.child());
        }
        let tracked = lock(&parent.0.children).live.len();
        assert!(tracked <= MIN_PRUNE_AT, "{} links still tracked", tracked);

        parent.cancel();
        assert!(kept.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_wakes() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn spawn_returns_none_when_cancelled() {
        let scope = Scope::current().unwrap();
        let task = scope.spawn(std::future::pending::<()>());
        scope.cancel();
        assert_eq!(task.await.unwrap(), None);
    }

    #[tokio::test]
    async fn spawn_returns_output() {
        let scope = Scope::current().unwrap();
        let task = scope.spawn(async { 7 });
        assert_eq!(task.await.unwrap(), Some(7));
    }

    #[test]
    fn current_outside_runtime_fails() {
        assert!(matches!(Scope::current(), Err(GoalError::NoRuntime)));
    }

    #[tokio::test]
    async fn restriction_error_rejects() {
        let scope = Scope::current()
            .unwrap()
            .restricted(ExecutionRestriction::Error);
        assert!(matches!(
            scope.check_restriction(1),
            Err(GoalError::EagerExecution(_))
        ));
        assert!(scope
            .restricted(ExecutionRestriction::None)
            .check_restriction(1)
            .is_ok());
    }

    #[tokio::test]
    #[traced_test]
    async fn restriction_warn_logs_and_allows() {
        let scope = Scope::current()
            .unwrap()
            .restricted(ExecutionRestriction::Warn);
        assert!(scope.check_restriction(7).is_ok());
        assert!(logs_contain("eager execution is restricted"));
    }

    #[tokio::test]
    async fn config_sets_restriction() {
        let config = Config::parse_str("[execution]\nrestriction = \"warn\"\n").unwrap();
        let scope = Scope::current().unwrap().with_config(&config);
        assert_eq!(scope.restriction(), ExecutionRestriction::Warn);
    }
}
