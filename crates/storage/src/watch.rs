//! Cross-client preference change notifications
//!
//! Every client attached to a [`PreferenceStore`] shares the same persisted
//! preferences. A write by one client is announced to all the others; the
//! writer never hears about its own change.

use crate::{Storage, StorageError, Theme};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

pub type ClientId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceChange {
    pub origin: ClientId,
    pub theme: Theme,
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    storage: Storage,
    changes: broadcast::Sender<PreferenceChange>,
    next_client: Arc<AtomicU64>,
}

impl PreferenceStore {
    pub fn new(storage: Storage) -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { storage, changes, next_client: Arc::new(AtomicU64::new(1)) }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn attach(&self) -> PreferenceClient {
        PreferenceClient {
            id: self.next_client.fetch_add(1, Ordering::Relaxed),
            storage: self.storage.clone(),
            changes: self.changes.clone(),
            receiver: self.changes.subscribe(),
        }
    }
}

/// One viewer window's handle on the shared preferences
#[derive(Debug)]
pub struct PreferenceClient {
    id: ClientId,
    storage: Storage,
    changes: broadcast::Sender<PreferenceChange>,
    receiver: broadcast::Receiver<PreferenceChange>,
}

impl PreferenceClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn theme(&self) -> Result<Theme, StorageError> {
        self.storage.theme()
    }

    /// Persist `theme` and tell the other clients
    pub fn set_theme(&self, theme: Theme) -> Result<(), StorageError> {
        self.storage.set_theme(theme)?;

        // no receivers is fine
        let _ = self.changes.send(PreferenceChange { origin: self.id, theme });
        tracing::debug!(client = self.id, %theme, "theme changed");
        Ok(())
    }

    pub fn toggle_theme(&self) -> Result<Theme, StorageError> {
        let theme = self.theme()?.toggled();
        self.set_theme(theme)?;
        Ok(theme)
    }

    /// Next theme written by another client
    pub async fn next_change(&mut self) -> Option<Theme> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.origin == self.id => continue,
                Ok(change) => return Some(change.theme),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(client = self.id, skipped, "missed theme changes");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`next_change`](Self::next_change) without waiting
    pub fn try_next_change(&mut self) -> Option<Theme> {
        loop {
            match self.receiver.try_recv() {
                Ok(change) if change.origin == self.id => continue,
                Ok(change) => return Some(change.theme),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
