//! Cancellation tokens and per-key render supersession
//!
//! A render task for a key (a page number in the viewer) is registered with
//! [`RenderTaskRegistry::supersede`], which cancels whatever task was
//! registered for the same key before it. Workers check their token at safe
//! points and stop drawing once it has been cancelled.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

/// Cancellation token for cooperative task cancellation
///
/// Multiple clones share the same underlying state, so the registry can keep
/// one clone while the worker polls another.
///
/// # Example
///
/// ```
/// use folio_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic identifier handed out for every registered task
pub type TaskId = u64;

/// Handle to one registered render task
#[derive(Debug, Clone)]
pub struct RenderTicket<K> {
    key: K,
    id: TaskId,
    token: CancellationToken,
}

impl<K: Copy> RenderTicket<K> {
    pub fn key(&self) -> K {
        self.key
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Registry enforcing at most one in-flight task per key
///
/// # Example
///
/// ```
/// use folio_scheduler::RenderTaskRegistry;
///
/// let registry = RenderTaskRegistry::new();
///
/// let first = registry.supersede(3_u32);
/// let second = registry.supersede(3_u32);
///
/// assert!(first.is_cancelled());
/// assert!(registry.is_current(&second));
/// assert_eq!(registry.len(), 1);
/// ```
pub struct RenderTaskRegistry<K> {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<K, (TaskId, CancellationToken)>>,
}

impl<K> RenderTaskRegistry<K>
where
    K: Eq + Hash + Copy + Debug,
{
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(0), tasks: Mutex::new(HashMap::new()) }
    }

    /// Register a new task for `key`, cancelling the one it replaces
    pub fn supersede(&self, key: K) -> RenderTicket<K> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        let previous = self.lock().insert(key, (id, token.clone()));
        if let Some((previous_id, previous_token)) = previous {
            previous_token.cancel();
            tracing::trace!(?key, previous_id, id, "superseded in-flight task");
        }

        RenderTicket { key, id, token }
    }

    /// Like [`supersede`](Self::supersede), but the returned guard
    /// unregisters the task when it is dropped
    pub fn guard(&self, key: K) -> RenderGuard<'_, K> {
        RenderGuard { registry: self, ticket: self.supersede(key) }
    }

    /// Whether `ticket` is still the live task for its key
    pub fn is_current(&self, ticket: &RenderTicket<K>) -> bool {
        if ticket.is_cancelled() {
            return false;
        }

        self.lock().get(&ticket.key).is_some_and(|(id, _)| *id == ticket.id)
    }

    /// Unregister a finished task
    ///
    /// Only removes the entry if it still belongs to `ticket`, so a task that
    /// was superseded cannot remove its successor. Returns `true` if removed.
    pub fn finish(&self, ticket: &RenderTicket<K>) -> bool {
        let mut tasks = self.lock();
        match tasks.get(&ticket.key) {
            Some((id, _)) if *id == ticket.id => {
                tasks.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }

    /// Cancel and unregister the task for `key`, if any
    pub fn cancel(&self, key: K) -> bool {
        match self.lock().remove(&key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and unregister every task. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut tasks = self.lock();
        let count = tasks.len();
        for (_, (_, token)) in tasks.drain() {
            token.cancel();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, (TaskId, CancellationToken)>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> Default for RenderTaskRegistry<K>
where
    K: Eq + Hash + Copy + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Scope guard returned by [`RenderTaskRegistry::guard`]
///
/// Dropping the guard (including dropping the future that owns it) removes
/// the task from the registry unless a newer task already replaced it.
pub struct RenderGuard<'a, K>
where
    K: Eq + Hash + Copy + Debug,
{
    registry: &'a RenderTaskRegistry<K>,
    ticket: RenderTicket<K>,
}

impl<K> RenderGuard<'_, K>
where
    K: Eq + Hash + Copy + Debug,
{
    pub fn ticket(&self) -> &RenderTicket<K> {
        &self.ticket
    }

    pub fn is_current(&self) -> bool {
        self.registry.is_current(&self.ticket)
    }
}

impl<K> Drop for RenderGuard<'_, K>
where
    K: Eq + Hash + Copy + Debug,
{
    fn drop(&mut self) {
        self.registry.finish(&self.ticket);
    }
}
