//! # Event-Driven Core
//!
//! The event system turns polling results into a stream of typed events and
//! fans them out to registered listeners.
//!
//! ## Event Flow
//!
//! ```text
//! ┌─────────────┐     ┌──────────┐     ┌────────────────────┐
//! │PollingEngine│────▶│ EventBus │────▶│ command dispatcher │
//! └─────────────┘     └──────────┘     │ passive dispatcher │
//!                          │           │ user listeners     │
//!                          │           └────────────────────┘
//!                     ┌────▼────┐
//!                     │EventKind│
//!                     └─────────┘
//! ```
//!
//! 1. The polling engine translates successful fetches into [`event_bus::Event`]s
//! 2. The bus delivers each event to its listeners in subscription order
//! 3. Listeners run to completion sequentially; one event finishes before the
//!    next begins

pub mod event_bus;

pub use event_bus::{Event, EventBus, EventError, EventKind, EventResult, ListenerFn, ListenerHandle};
