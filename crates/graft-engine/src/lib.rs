//! Graft - declarative hypermedia exchange engine
//!
//! Markup elements describe, through `gx-*` attributes, when to fire a
//! network request, how to build its parameters, how concurrent requests
//! on the same element are reconciled, and how the server's HTML
//! response is grafted back into the live document.
//!
//! The engine is headless and cooperative: it owns a [`graft_dom::DomTree`]
//! and is driven by a host that feeds it native events
//! ([`Engine::handle_event`]), clock advancement ([`Engine::advance`]),
//! and completed network responses ([`Engine::complete`]). Network calls
//! themselves go through the [`exchange::Transport`] trait; a
//! reqwest-backed client lives in `graft-net`.

pub mod binder;
pub mod config;
pub mod coordinate;
pub mod engine;
pub mod exchange;
pub mod history;
pub mod params;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod signal;
pub mod swap;
pub mod target;
pub mod trigger;

pub use binder::NativeEvent;
pub use config::EngineConfig;
pub use coordinate::RequestPlan;
pub use engine::Engine;
pub use exchange::{ExchangeId, Transport, TransportFailure};
pub use history::{HistoryStorage, MemoryStorage};
pub use registry::SwapExtension;
pub use signal::{ScrollTo, Signal, SignalKind};
pub use swap::{SwapSpec, SwapStyle};
