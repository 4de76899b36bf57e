//! Failure tracking: clock-aligned tickers, the per-interval state registry,
//! and the engine loops that connect them to the store and the dispatcher.

pub mod registry;
pub mod service;
pub mod ticker;

pub use self::registry::{FailedServiceRecord, FailureRegistry, Outcome, StateEdge};
pub use self::service::{run_change_recorder, EngineConfig, FailureStateEngine, NotificationChange};
pub use self::ticker::spawn_aligned_ticker;
