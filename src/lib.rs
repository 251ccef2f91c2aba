//! Validated OSC control for the PolyNodes synthesizer.
//!
//! A static [`Registry`] maps command names (and, for layered parameters, a
//! Macro/Meso/Micro layer) to OSC addresses and value domains. The
//! [`Dispatcher`] validates each invocation against it and sends exactly one
//! UDP datagram per accepted call. `send_raw` is the unvalidated escape hatch.

#[cfg(feature = "http-api")]
pub mod api;
pub mod dispatcher;
pub mod error;
pub mod osc;
pub mod paths;
pub mod registry;
pub mod settings;
pub mod telemetry;
pub mod transport;

pub use dispatcher::{DispatchResult, Dispatcher, Outcome, Reply};
pub use error::DispatchError;
pub use registry::{Layer, NumericValue, Registry};
