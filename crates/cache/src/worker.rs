//! Offline cache lifecycle
//!
//! One [`CacheManager`] serves one cache version. Installing fetches the
//! whole manifest before anything is written; activating drops every other
//! bucket; once active, GET requests are answered cache-first with a
//! network fallback and an offline fallback behind that.

use crate::request::is_same_origin;
use crate::{
    CacheConfig, CacheStorage, FetchError, Fetcher, Method, Request, Response, ResponseType,
    StorageError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Installing,
    Installed,
    Active,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheInstallError {
    #[error("failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("{url} answered with status {status}")]
    BadStatus { url: String, status: u16 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Install(#[from] CacheInstallError),
    #[error("cache version {0} has not been installed")]
    NotInstalled(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    SkipWaiting,
    GetVersion,
    CacheUrls(Vec<String>),
    ClearCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    Version(String),
    UrlsCached(usize),
    CacheCleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(WorkerMessage),
}

/// How an intercepted request was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller goes to the network itself
    Passthrough,
    Respond(Response),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Installed { entries: usize },
    Activated { deleted: Vec<String> },
    Fetch(FetchOutcome),
    Reply(Option<WorkerReply>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

pub struct CacheManager {
    config: CacheConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl CacheManager {
    pub fn new(
        config: CacheConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            state: Mutex::new(LifecycleState::Idle),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Name of the current bucket
    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.lock_state() = state;
    }

    fn replace_state(&self, state: LifecycleState) -> LifecycleState {
        std::mem::replace(&mut *self.lock_state(), state)
    }

    pub async fn dispatch(&self, event: WorkerEvent) -> Result<WorkerOutcome, CacheError> {
        match event {
            WorkerEvent::Install => {
                let entries = self.install().await?;
                Ok(WorkerOutcome::Installed { entries })
            }
            WorkerEvent::Activate => {
                let deleted = self.activate().await?;
                Ok(WorkerOutcome::Activated { deleted })
            }
            WorkerEvent::Fetch(request) => Ok(WorkerOutcome::Fetch(self.handle_fetch(&request).await)),
            WorkerEvent::Message(message) => Ok(WorkerOutcome::Reply(self.handle_message(message).await?)),
        }
    }

    /// Fetch the whole manifest, then populate the current bucket
    ///
    /// Nothing is written unless every fetch succeeds; an older bucket is
    /// left untouched on failure and the manager keeps its previous state.
    /// Returns the number of stored entries.
    pub async fn install(&self) -> Result<usize, CacheInstallError> {
        let previous = self.replace_state(LifecycleState::Installing);
        tracing::info!(version = %self.config.version, "installing offline cache");

        let stored = match self.fetch_all(self.config.manifest_urls()).await {
            Ok(entries) => {
                let count = entries.len();
                self.storage
                    .put_all(&self.config.version, entries)
                    .await
                    .map(|()| count)
                    .map_err(CacheInstallError::from)
            }
            Err(err) => Err(err),
        };
        let count = match stored {
            Ok(count) => count,
            Err(err) => {
                self.set_state(previous);
                tracing::error!(version = %self.config.version, error = %err, "cache install failed");
                return Err(err);
            }
        };

        // an active manager keeps intercepting over its refreshed bucket
        let installed = match previous {
            LifecycleState::Active => LifecycleState::Active,
            _ => LifecycleState::Installed,
        };
        self.set_state(installed);
        tracing::info!(version = %self.config.version, entries = count, "offline cache installed");

        if self.config.activate_on_install || self.skip_waiting.load(Ordering::Acquire) {
            if let Err(err) = self.activate().await {
                tracing::warn!(error = %err, "activation after install failed");
            }
        }

        Ok(count)
    }

    async fn fetch_all(&self, urls: Vec<String>) -> Result<Vec<(String, Response)>, CacheInstallError> {
        let fetches = urls.into_iter().map(|url| async move {
            let response = self
                .fetcher
                .fetch(&Request::get(url.clone()))
                .await
                .map_err(|source| CacheInstallError::Fetch { url: url.clone(), source })?;

            if !response.is_ok() {
                return Err(CacheInstallError::BadStatus { url, status: response.status });
            }

            Ok((url, response))
        });

        futures::future::try_join_all(fetches).await
    }

    /// Drop every bucket but the current one and start intercepting
    ///
    /// Returns the names of the deleted buckets.
    pub async fn activate(&self) -> Result<Vec<String>, CacheError> {
        match self.state() {
            LifecycleState::Installed | LifecycleState::Active => {}
            LifecycleState::Idle | LifecycleState::Installing => {
                return Err(CacheError::NotInstalled(self.config.version.clone()));
            }
        }

        let mut deleted = Vec::new();
        for name in self.storage.bucket_names().await? {
            if name != self.config.version && self.storage.delete_bucket(&name).await? {
                tracing::info!(bucket = %name, "deleted stale cache bucket");
                deleted.push(name);
            }
        }

        self.set_state(LifecycleState::Active);
        tracing::info!(version = %self.config.version, "offline cache active");

        Ok(deleted)
    }

    /// Answer one request
    ///
    /// Before activation, and for anything but http(s) GET, the request is
    /// passed through.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.state() != LifecycleState::Active
            || request.method != Method::Get
            || !request.is_http()
        {
            return FetchOutcome::Passthrough;
        }

        let key = request.cache_key();
        match self.storage.lookup(&self.config.version, &key).await {
            Ok(Some(cached)) => {
                tracing::debug!(url = %request.url, "serving from cache");
                return FetchOutcome::Respond(cached);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(url = %request.url, error = %err, "cache lookup failed"),
        }

        let response = match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "network unavailable, serving offline fallback");
                return FetchOutcome::Respond(self.offline_fallback(request).await);
            }
        };

        if self.is_cacheable(request, &response) {
            if let Err(err) = self.storage.put(&self.config.version, &key, response.clone()).await {
                tracing::warn!(url = %request.url, error = %err, "failed to cache response");
            }
        }

        FetchOutcome::Respond(response)
    }

    fn is_cacheable(&self, request: &Request, response: &Response) -> bool {
        match response.response_type {
            ResponseType::Basic => {
                response.status == 200 && is_same_origin(&request.url, &self.config.origin)
            }
            ResponseType::Opaque => self.config.cache_opaque,
            ResponseType::Cors | ResponseType::Synthetic => false,
        }
    }

    async fn offline_fallback(&self, request: &Request) -> Response {
        if request.is_navigation() {
            let offline_url = self.config.offline_page_url();
            match self.storage.lookup(&self.config.version, &offline_url).await {
                Ok(Some(page)) => return page,
                Ok(None) => tracing::warn!(url = %offline_url, "offline page is not cached"),
                Err(err) => tracing::warn!(url = %offline_url, error = %err, "offline page lookup failed"),
            }
        }

        Response::offline()
    }

    pub async fn handle_message(&self, message: WorkerMessage) -> Result<Option<WorkerReply>, CacheError> {
        match message {
            WorkerMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Release);
                if self.state() == LifecycleState::Installed {
                    self.activate().await?;
                }
                Ok(None)
            }
            WorkerMessage::GetVersion => Ok(Some(WorkerReply::Version(self.config.version.clone()))),
            WorkerMessage::CacheUrls(urls) => {
                let urls = urls.iter().map(|url| self.config.resolve(url)).collect();
                let entries = self.fetch_all(urls).await?;
                let count = entries.len();
                self.storage.put_all(&self.config.version, entries).await?;

                tracing::info!(entries = count, "cached requested urls");
                Ok(Some(WorkerReply::UrlsCached(count)))
            }
            WorkerMessage::ClearCache => {
                self.storage.delete_bucket(&self.config.version).await?;
                tracing::info!(version = %self.config.version, "cleared offline cache");
                Ok(Some(WorkerReply::CacheCleared))
            }
        }
    }

    /// Sum of stored body sizes in the current bucket
    pub async fn bucket_size(&self) -> Result<u64, StorageError> {
        let mut total = 0;
        for key in self.storage.keys(&self.config.version).await? {
            if let Some(response) = self.storage.lookup(&self.config.version, &key).await? {
                total += response.body_len();
            }
        }
        Ok(total)
    }

    /// Evict entries in key listing order until the bucket fits the ceiling
    ///
    /// Entries that disappear while the sweep runs are skipped.
    pub async fn sweep(&self) -> Result<SweepReport, StorageError> {
        let bucket = &self.config.version;
        let mut report = SweepReport { remaining_bytes: self.bucket_size().await?, ..SweepReport::default() };

        for key in self.storage.keys(bucket).await? {
            if report.remaining_bytes <= self.config.max_bytes {
                break;
            }

            let Some(response) = self.storage.lookup(bucket, &key).await? else {
                continue;
            };

            if self.storage.delete_entry(bucket, &key).await? {
                let size = response.body_len();
                report.evicted += 1;
                report.freed_bytes += size;
                report.remaining_bytes = report.remaining_bytes.saturating_sub(size);
            }
        }

        if report.evicted > 0 {
            tracing::info!(
                evicted = report.evicted,
                freed = report.freed_bytes,
                remaining = report.remaining_bytes,
                "cache sweep evicted entries"
            );
        } else {
            tracing::debug!(size = report.remaining_bytes, "cache sweep: within ceiling");
        }

        Ok(report)
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until the handle
    /// is aborted; the first sweep happens one period after spawning
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep().await {
                    tracing::warn!(error = %err, "cache sweep failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("version", &self.config.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
