//! goal
//!
//! Lazily-started, memoized, cancellable computations with explicit
//! dependencies.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted -> Running -> Completed(T) | Failed(cause) | Cancelled(cause)
//! ```
//!
//! # Invariants
//!
//! - Starting a goal twice without a [`Goal::reset`] returns the same handle.
//!   The memo slot is guarded by a per-goal mutex, so this holds for
//!   concurrent callers too.
//! - Dependencies are requested to start before the goal's own body is
//!   scheduled. Bodies overlap freely and await the dependencies they read.
//! - A dependency ending Failed or Cancelled cancels every dependent that
//!   was watching it, with the cause chained in
//!   [`GoalError::DependencyFailed`].
//! - A failed goal stays failed. Retrying means `reset()` then `start()`.
//!
//! # Example
//!
//! ```
//! use goaltree::goal::{Goal, GoalError};
//! use goaltree::goal::scope::Scope;
//!
//! # tokio_test::block_on(async {
//! let scope = Scope::current().unwrap();
//! let base = Goal::of(20);
//!
//! let dep = base.clone();
//! let answer = Goal::lazy(vec![base.as_dependency()], move |scope: Scope| {
//!     let dep = dep.clone();
//!     async move { Ok::<_, GoalError>(dep.await_value(&scope).await? + 22) }
//! });
//!
//! assert_eq!(answer.await_value(&scope).await.unwrap(), 42);
//! # });
//! ```

pub mod handle;
pub mod scope;

pub use handle::{AnyHandle, GoalHandle, GoalStatus};
pub use scope::{CancelToken, ExecutionRestriction, Scope};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::sync::lock;
use crate::core::types::Value;

static NEXT_GOAL_ID: AtomicU64 = AtomicU64::new(1);

/// Errors carried by a goal's terminal state.
///
/// Cloneable so every awaiter of a shared handle receives the same cause.
#[derive(Debug, Clone, Error)]
pub enum GoalError {
    /// The body returned an error.
    #[error("computation failed: {0}")]
    Failed(Arc<anyhow::Error>),

    /// The computation was cancelled directly.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A dependency failed or was cancelled.
    #[error("dependency failed: {cause}")]
    DependencyFailed {
        /// What happened to the dependency
        cause: Box<GoalError>,
    },

    /// Started while the scope forbids eager execution.
    #[error("eager execution is forbidden: {0}")]
    EagerExecution(String),

    /// A value-less placeholder was computed.
    #[error("placeholder has no value: {0}")]
    EmptyAccess(String),

    /// The produced value does not have the declared type.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        actual: String,
    },

    /// No tokio runtime to spawn on.
    #[error("no async runtime available")]
    NoRuntime,
}

impl GoalError {
    /// A body failure with a plain message.
    pub fn failed(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        GoalError::Failed(Arc::new(anyhow::Error::msg(message)))
    }

    /// Returns true if this error marks a cancelled (not failed) computation.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            GoalError::Cancelled(_) | GoalError::DependencyFailed { .. }
        )
    }

    /// The innermost cause of a dependency chain.
    pub fn root_cause(&self) -> &GoalError {
        let mut current = self;
        while let GoalError::DependencyFailed { cause } = current {
            current = cause;
        }
        current
    }
}

impl From<anyhow::Error> for GoalError {
    fn from(err: anyhow::Error) -> Self {
        GoalError::Failed(Arc::new(err))
    }
}

/// The body of a lazy goal.
///
/// Implemented for any `Fn(Scope) -> impl Future<Output = Result<T, GoalError>>`.
/// The scope passed in is the goal's own cancellable sub-scope.
#[async_trait]
pub trait Computation<T>: Send + Sync {
    async fn compute(&self, scope: Scope) -> Result<T, GoalError>;
}

#[async_trait]
impl<T, F, Fut> Computation<T> for F
where
    T: Send + 'static,
    F: Fn(Scope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, GoalError>> + Send + 'static,
{
    async fn compute(&self, scope: Scope) -> Result<T, GoalError> {
        (self)(scope).await
    }
}

/// Shared reference to a goal of any result type.
pub type Dependency = Arc<dyn AnyGoal>;

/// Type-erased goal interface used for dependency lists.
pub trait AnyGoal: Send + Sync {
    fn id(&self) -> u64;

    fn dependencies(&self) -> &[Dependency];

    fn start_any(&self, scope: &Scope) -> Result<Arc<dyn AnyHandle>, GoalError>;

    fn current_any(&self) -> Option<Arc<dyn AnyHandle>>;

    fn reset(&self);
}

enum GoalKind<T: Value> {
    Static(GoalHandle<T>),
    Lazy {
        dependencies: Vec<Dependency>,
        computation: Arc<dyn Computation<T>>,
        current: Mutex<Option<GoalHandle<T>>>,
    },
}

struct GoalInner<T: Value> {
    id: u64,
    kind: GoalKind<T>,
}

/// A lazily-started, memoized computation producing `T`.
///
/// Cloning shares the same goal (and its memoized handle).
pub struct Goal<T: Value>(Arc<GoalInner<T>>);

impl<T: Value> Goal<T> {
    /// A goal whose value is known up front. `reset` has no effect.
    pub fn of(value: T) -> Self {
        Self(Arc::new(GoalInner {
            id: NEXT_GOAL_ID.fetch_add(1, Ordering::Relaxed),
            kind: GoalKind::Static(GoalHandle::completed(value)),
        }))
    }

    /// A goal computed by `body` once all `dependencies` are started.
    pub fn lazy<F, Fut>(dependencies: Vec<Dependency>, body: F) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, GoalError>> + Send + 'static,
    {
        Self::from_computation(dependencies, body)
    }

    /// A goal computed by a [`Computation`] implementation.
    pub fn from_computation(
        dependencies: Vec<Dependency>,
        computation: impl Computation<T> + 'static,
    ) -> Self {
        Self(Arc::new(GoalInner {
            id: NEXT_GOAL_ID.fetch_add(1, Ordering::Relaxed),
            kind: GoalKind::Lazy {
                dependencies,
                computation: Arc::new(computation),
                current: Mutex::new(None),
            },
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_static(&self) -> bool {
        matches!(self.0.kind, GoalKind::Static(_))
    }

    pub fn dependencies(&self) -> &[Dependency] {
        match &self.0.kind {
            GoalKind::Static(_) => &[],
            GoalKind::Lazy { dependencies, .. } => dependencies,
        }
    }

    /// The in-flight or finished handle, without starting anything.
    pub fn current_handle(&self) -> Option<GoalHandle<T>> {
        match &self.0.kind {
            GoalKind::Static(handle) => Some(handle.clone()),
            GoalKind::Lazy { current, .. } => lock(current).clone(),
        }
    }

    /// Start the goal, or return the handle of the existing launch.
    ///
    /// # Errors
    ///
    /// Returns `GoalError::EagerExecution` if a new launch is needed and the
    /// scope forbids it, or any error raised while starting dependencies.
    pub fn start(&self, scope: &Scope) -> Result<GoalHandle<T>, GoalError> {
        let GoalKind::Lazy {
            dependencies,
            computation,
            current,
        } = &self.0.kind
        else {
            return self
                .current_handle()
                .ok_or_else(|| GoalError::Cancelled("static goal has no handle".into()));
        };

        let mut slot = lock(current);
        if let Some(handle) = slot.as_ref() {
            tracing::trace!(goal = self.0.id, handle = handle.id(), "goal already started");
            return Ok(handle.clone());
        }

        scope.check_restriction(self.0.id)?;

        let started = dependencies
            .iter()
            .map(|dep| dep.start_any(scope))
            .collect::<Result<Vec<_>, _>>()?;

        let body_scope = scope.child();
        let handle = GoalHandle::running(body_scope.token().clone());
        tracing::debug!(
            goal = self.0.id,
            handle = handle.id(),
            dependencies = started.len(),
            "launching goal"
        );

        for dependency in &started {
            let dependent = handle.downgrade();
            let goal_id = self.0.id;
            dependency.on_terminal(Box::new(move |failure| {
                let (Some(cause), Some(dependent)) = (failure, dependent.upgrade()) else {
                    return;
                };
                tracing::debug!(goal = goal_id, cause = %cause, "cancelling goal after dependency failure");
                dependent.cancel_with(GoalError::DependencyFailed {
                    cause: Box::new(cause),
                });
            }));
        }

        let computation = Arc::clone(computation);
        let task_handle = handle.clone();
        scope.runtime().spawn(async move {
            let token = body_scope.token().clone();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(GoalError::Cancelled("scope cancelled".into())),
                outcome = computation.compute(body_scope) => outcome,
            };
            task_handle.complete(outcome);
        });

        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Start the goal and wait for its value.
    pub async fn await_value(&self, scope: &Scope) -> Result<T, GoalError> {
        let handle = self.start(scope)?;
        handle.join().await
    }

    /// Cancel the current launch and forget it.
    ///
    /// The next `start` launches a fresh computation.
    pub fn reset(&self) {
        let GoalKind::Lazy { current, .. } = &self.0.kind else {
            return;
        };
        let previous = lock(current).take();
        if let Some(handle) = previous {
            handle.cancel_with(GoalError::Cancelled("goal reset".into()));
        }
    }

    /// This goal as a dependency of another.
    pub fn as_dependency(&self) -> Dependency {
        Arc::new(self.clone())
    }
}

impl<T: Value> AnyGoal for Goal<T> {
    fn id(&self) -> u64 {
        Goal::id(self)
    }

    fn dependencies(&self) -> &[Dependency] {
        Goal::dependencies(self)
    }

    fn start_any(&self, scope: &Scope) -> Result<Arc<dyn AnyHandle>, GoalError> {
        Ok(self.start(scope)?.erased())
    }

    fn current_any(&self) -> Option<Arc<dyn AnyHandle>> {
        self.current_handle().map(|h| h.erased())
    }

    fn reset(&self) {
        Goal::reset(self)
    }
}

impl<T: Value> Clone for Goal<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Value> fmt::Debug for Goal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("id", &self.0.id)
            .field("static", &self.is_static())
            .field("dependencies", &self.dependencies().len())
            .finish()
    }
}
