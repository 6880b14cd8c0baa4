//! Offline cache manager
//!
//! Versioned response buckets for a static site: install-time population
//! from a manifest, activation-time cleanup of older versions, cache-first
//! request handling with offline fallbacks, and a size-bounded eviction
//! sweep.

pub mod config;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod network;
mod request;
mod store;
mod worker;

pub use config::{CacheConfig, ConfigError};
pub use network::{FetchError, Fetcher, UreqFetcher};
pub use request::{
    is_same_origin, origin_of, resolve_url, Destination, Method, Request, Response, ResponseType,
};
pub use store::{CacheStorage, MemoryCacheStorage, StorageError};
pub use worker::{
    CacheError, CacheInstallError, CacheManager, FetchOutcome, LifecycleState, SweepReport,
    WorkerEvent, WorkerMessage, WorkerOutcome, WorkerReply,
};
