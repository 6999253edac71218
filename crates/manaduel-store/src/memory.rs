//! In-process [`SharedStore`] implementation.
//!
//! A [`MemoryBackend`] owns one JSON tree. Each participant process gets
//! its own [`MemoryStore`] client handle from [`MemoryBackend::client`],
//! with its own connect/disconnect lifecycle, so several simulated clients
//! can contend on the same tree exactly as remote clients would.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};

use crate::{CasOutcome, SharedStore, StoreError, StorePath, Subscription};

struct Subscriber {
    client: u64,
    path: StorePath,
    sender: mpsc::UnboundedSender<Value>,
}

struct Tree {
    root: Value,
    subscribers: Vec<Subscriber>,
}

impl Tree {
    fn get(&self, path: &StorePath) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node.as_object()?.get(segment)?;
        }
        (!node.is_null()).then_some(node)
    }

    fn set(&mut self, path: &StorePath, value: Value) {
        let value = strip_nulls(value);
        if path.is_root() {
            self.root = if value.is_null() {
                Value::Object(Map::new())
            } else {
                value
            };
        } else if value.is_null() {
            remove_at(&mut self.root, path.segments());
        } else {
            insert_at(&mut self.root, path.segments(), value);
        }
    }

    /// Pushes the current value to every subscriber whose path overlaps
    /// `changed`, dropping subscribers whose receiver is gone.
    fn notify(&mut self, changed: &StorePath) {
        let Tree { root, subscribers } = self;
        subscribers.retain(|sub| {
            if !sub.path.overlaps(changed) {
                return !sub.sender.is_closed();
            }
            let mut node = &*root;
            for segment in sub.path.segments() {
                match node.as_object().and_then(|m| m.get(segment)) {
                    Some(child) => node = child,
                    None => return sub.sender.send(Value::Null).is_ok(),
                }
            }
            sub.sender.send(node.clone()).is_ok()
        });
    }
}

/// Drops `null` members recursively; an object left empty becomes `null`.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let stripped: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, strip_nulls(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if stripped.is_empty() {
                Value::Null
            } else {
                Value::Object(stripped)
            }
        }
        other => other,
    }
}

fn insert_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        insert_at(child, rest, value);
    }
}

fn remove_at(node: &mut Value, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(child) = map.get_mut(first) {
        remove_at(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            map.remove(first);
        }
    }
}

struct Shared {
    tree: Mutex<Tree>,
    next_client: AtomicU64,
    available: AtomicBool,
}

/// The shared tree. Cheap to clone; all clones see the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree {
                    root: Value::Object(Map::new()),
                    subscribers: Vec::new(),
                }),
                next_client: AtomicU64::new(1),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Creates a new, not yet connected client handle.
    pub fn client(&self) -> MemoryStore {
        let client_id = self.shared.next_client.fetch_add(1, Ordering::Relaxed);
        MemoryStore {
            backend: self.clone(),
            client_id,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulates an outage: while unavailable every operation from every
    /// client fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
        tracing::debug!(available, "memory store availability changed");
    }

    /// Returns a copy of the whole tree.
    pub async fn dump(&self) -> Value {
        self.shared.tree.lock().await.root.clone()
    }

    /// Number of live subscriptions across all clients.
    pub async fn subscriber_count(&self) -> usize {
        let tree = self.shared.tree.lock().await;
        tree.subscribers
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's handle onto a [`MemoryBackend`].
///
/// Clones share the same connection state.
#[derive(Clone)]
pub struct MemoryStore {
    backend: MemoryBackend,
    client_id: u64,
    connected: Arc<AtomicBool>,
}

impl MemoryStore {
    /// The backend this client talks to.
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    /// Whether `connect()` has been called without a later `disconnect()`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        if !self.is_connected() {
            return Err(StoreError::NotConnected);
        }
        if !self.backend.shared.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory backend is offline".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("client_id", &self.client_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SharedStore for MemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        if !self.backend.shared.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory backend is offline".into(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(client = self.client_id, "store client connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.connected.store(false, Ordering::SeqCst);
        let mut tree = self.backend.shared.tree.lock().await;
        tree.subscribers.retain(|s| s.client != self.client_id);
        tracing::debug!(client = self.client_id, "store client disconnected");
        Ok(())
    }

    async fn read(
        &self,
        path: &StorePath,
    ) -> Result<Option<Value>, StoreError> {
        self.ensure_ready()?;
        path.validate()?;
        let tree = self.backend.shared.tree.lock().await;
        Ok(tree.get(path).cloned())
    }

    async fn write(
        &self,
        path: &StorePath,
        value: Value,
    ) -> Result<(), StoreError> {
        self.ensure_ready()?;
        path.validate()?;
        let mut tree = self.backend.shared.tree.lock().await;
        tree.set(path, value);
        tree.notify(path);
        tracing::trace!(%path, "write");
        Ok(())
    }

    async fn update_fields(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.ensure_ready()?;
        path.validate()?;
        let targets = fields
            .into_iter()
            .map(|(key, value)| {
                let target = path.child(key);
                target.validate().map(|()| (target, value))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut tree = self.backend.shared.tree.lock().await;
        for (target, value) in targets {
            tree.set(&target, value);
        }
        tree.notify(path);
        tracing::trace!(%path, "update_fields");
        Ok(())
    }

    async fn subscribe(
        &self,
        path: &StorePath,
    ) -> Result<Subscription, StoreError> {
        self.ensure_ready()?;
        path.validate()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut tree = self.backend.shared.tree.lock().await;
        let current = tree.get(path).cloned().unwrap_or(Value::Null);
        // The receiver is alive right here, so this cannot fail.
        let _ = sender.send(current);
        tree.subscribers.push(Subscriber {
            client: self.client_id,
            path: path.clone(),
            sender,
        });
        tracing::debug!(%path, client = self.client_id, "subscribed");
        Ok(Subscription::new(path.clone(), receiver))
    }

    async fn compare_and_swap<F>(
        &self,
        path: &StorePath,
        mut update: F,
    ) -> Result<CasOutcome, StoreError>
    where
        F: FnMut(Option<&Value>) -> Option<Value> + Send,
    {
        self.ensure_ready()?;
        path.validate()?;
        // The tree lock is held from read to write, so nothing can change
        // underneath `update` and a single attempt always suffices.
        let mut tree = self.backend.shared.tree.lock().await;
        let next = update(tree.get(path));
        match next {
            Some(next) => {
                tree.set(path, next);
                tree.notify(path);
                tracing::trace!(%path, "cas committed");
                Ok(CasOutcome {
                    committed: true,
                    value: tree.get(path).cloned(),
                })
            }
            None => Ok(CasOutcome {
                committed: false,
                value: tree.get(path).cloned(),
            }),
        }
    }
}
