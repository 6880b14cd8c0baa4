//! Scripted network for tests

use crate::{FetchError, Fetcher, Request, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Answers from a fixed routing table
///
/// Unrouted URLs, and every URL while offline, fail with a network error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: impl Into<String>, response: Response) {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).insert(url.into(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network {
                url: request.url.clone(),
                message: "offline".to_string(),
            });
        }

        let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.get(&request.url).cloned().ok_or_else(|| FetchError::Network {
            url: request.url.clone(),
            message: "no route".to_string(),
        })
    }
}
