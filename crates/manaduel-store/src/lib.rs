//! Shared-store abstraction for Manaduel.
//!
//! Every client of a duel talks to one remotely hosted, mutable JSON tree.
//! This crate defines the [`SharedStore`] trait that abstracts over that
//! tree, plus [`MemoryStore`], an in-process implementation used by tests,
//! the demo, and single-process deployments.
//!
//! # Semantics
//!
//! - `null` and "absent" are the same thing. Writing `null` deletes, and
//!   objects that become empty are pruned.
//! - [`SharedStore::compare_and_swap`] is the only mutual-exclusion
//!   primitive. Implementations must apply the update atomically with
//!   respect to every other operation on overlapping paths.
//! - Subscriptions deliver the current value at their path immediately and
//!   again after every change at, above, or below that path.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod path;

pub use error::StoreError;
pub use memory::{MemoryBackend, MemoryStore};
pub use path::StorePath;

use std::future::Future;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Result of a [`SharedStore::compare_and_swap`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct CasOutcome {
    /// `true` if the update function produced a value and it was written.
    pub committed: bool,
    /// The value at the path after the call (`None` when absent).
    pub value: Option<Value>,
}

/// A live subscription to a subtree of the store.
///
/// Dropping the subscription (or calling [`cancel`](Self::cancel))
/// unsubscribes; the store prunes the dead sender on its next notification.
#[derive(Debug)]
pub struct Subscription {
    path: StorePath,
    receiver: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    /// Wraps a receiver fed by a store implementation.
    pub fn new(
        path: StorePath,
        receiver: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self { path, receiver }
    }

    /// The path this subscription watches.
    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Waits for the next value at the watched path.
    ///
    /// `Value::Null` means the path is currently absent. Returns `None`
    /// once the store side has gone away (client disconnected).
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Returns a pending value without waiting, if one is queued.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.receiver.try_recv().ok()
    }

    /// Stops receiving notifications.
    pub fn cancel(self) {}
}

/// A client handle onto the shared store.
///
/// One handle is created per participant process and passed explicitly to
/// every component that needs the store. Operations fail with
/// [`StoreError::NotConnected`] outside a `connect()`/`disconnect()`
/// window.
pub trait SharedStore: Send + Sync + 'static {
    /// Opens the client session.
    fn connect(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Closes the client session and ends its subscriptions.
    fn disconnect(
        &self,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads the value at `path`, or `None` when absent.
    fn read(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Unconditionally overwrites the value at `path`.
    fn write(
        &self,
        path: &StorePath,
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Shallow-merges `fields` into the object at `path`.
    ///
    /// A field set to `null` is removed.
    fn update_fields(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Subscribes to changes at or under `path`.
    fn subscribe(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Atomically reads the value at `path`, passes it to `update`, and
    /// writes the returned value if there is one.
    ///
    /// `update` returning `None` aborts without writing. `update` may be
    /// called more than once by implementations that retry on contention,
    /// so it must be a pure function of its input.
    fn compare_and_swap<F>(
        &self,
        path: &StorePath,
        update: F,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send
    where
        F: FnMut(Option<&Value>) -> Option<Value> + Send;

    /// Removes the value at `path`.
    fn remove(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.write(path, Value::Null)
    }
}
