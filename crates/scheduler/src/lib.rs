//! Folio Scheduler Library
//!
//! Cooperative cancellation and supersession for render tasks.
//!
//! A new render for a page cancels the one still in flight for that page
//! instead of queueing behind it, and bursts of zoom requests are coalesced
//! into a single render by a trailing-edge debouncer.
//!
//! # Example
//!
//! ```
//! use folio_scheduler::RenderTaskRegistry;
//!
//! let registry = RenderTaskRegistry::new();
//!
//! // Zooming twice before the first render finished
//! let stale = registry.guard(1_u32);
//! let fresh = registry.guard(1_u32);
//!
//! // The worker holding `stale` sees the cancellation at its next safe point
//! assert!(stale.ticket().is_cancelled());
//! assert!(fresh.is_current());
//! ```

mod cancel;
mod debounce;

pub use cancel::{CancellationToken, RenderGuard, RenderTaskRegistry, RenderTicket, TaskId};
pub use debounce::Debouncer;
