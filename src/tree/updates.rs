//! tree::updates
//!
//! Multicast stream of changed names.
//!
//! # Delivery
//!
//! Each [`Updates`] subscription owns its own `tokio::sync::broadcast`
//! receiver, so every subscriber sees every event sent after it subscribed,
//! in send order, with no replay of earlier events. A subscriber that falls
//! more than the channel capacity behind loses the oldest events and receives
//! [`UpdatesError::Lagged`] once; it should then re-read the whole tree.
//!
//! Events carry only the name. Consumers re-read the tree to learn the new
//! state, which may already reflect later writes.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use thiserror::Error;

use crate::core::name::Name;

/// Errors from an update subscription.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum UpdatesError {
    /// The tree was dropped; no more events will arrive.
    #[error("update stream closed")]
    Closed,

    /// The subscriber fell behind and `n` events were dropped.
    #[error("update subscriber lagged, {0} events dropped")]
    Lagged(u64),
}

/// One subscriber's view of a tree's update stream.
///
/// Names are relative to the subscribed branch. A change that covers the
/// whole branch (e.g. removing one of its ancestors) arrives as
/// [`Name::EMPTY`].
#[derive(Debug)]
pub struct Updates {
    rx: broadcast::Receiver<Name>,
    prefix: Name,
}

impl Updates {
    pub(crate) fn new(rx: broadcast::Receiver<Name>) -> Self {
        Self {
            rx,
            prefix: Name::EMPTY,
        }
    }

    /// Restrict to events under `prefix`, relative to this subscription.
    pub fn under(self, prefix: &Name) -> Self {
        Self {
            rx: self.rx,
            prefix: self.prefix.plus(prefix),
        }
    }

    /// Wait for the next relevant event.
    pub async fn recv(&mut self) -> Result<Name, UpdatesError> {
        loop {
            match self.rx.recv().await {
                Ok(name) => {
                    if let Some(relative) = self.relative(&name) {
                        return Ok(relative);
                    }
                }
                Err(RecvError::Closed) => return Err(UpdatesError::Closed),
                Err(RecvError::Lagged(dropped)) => {
                    tracing::warn!(dropped, prefix = %self.prefix, "update subscriber lagged");
                    return Err(UpdatesError::Lagged(dropped));
                }
            }
        }
    }

    /// Next relevant event if one is already buffered.
    pub fn try_recv(&mut self) -> Result<Option<Name>, UpdatesError> {
        loop {
            match self.rx.try_recv() {
                Ok(name) => {
                    if let Some(relative) = self.relative(&name) {
                        return Ok(Some(relative));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(UpdatesError::Closed),
                Err(TryRecvError::Lagged(dropped)) => return Err(UpdatesError::Lagged(dropped)),
            }
        }
    }

    /// A fresh subscription to the same stream, starting from now.
    pub fn resubscribe(&self) -> Self {
        Self {
            rx: self.rx.resubscribe(),
            prefix: self.prefix.clone(),
        }
    }

    fn relative(&self, name: &Name) -> Option<Name> {
        if let Some(rest) = name.strip_prefix(&self.prefix) {
            Some(rest)
        } else if self.prefix.starts_with(name) {
            Some(Name::EMPTY)
        } else {
            None
        }
    }
}
