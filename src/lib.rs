//! Host-side bridge exposing a remote BLE peripheral's GATT surface through requests and an
//! ordered event stream.
//!
//! The platform radio is consumed through the traits in [`platform`]; everything the radio
//! reports comes back as [`platform::AdapterCallback`]s and is turned into
//! [`api::central_event::CentralEvent`]s by a single actor task owned by [`Central`].

pub mod api;
pub mod config;
pub mod error;
pub mod host;
pub mod platform;
pub mod sim;

pub use config::ManagerConfig;
pub use error::{Error, ErrorType, Result};
pub use host::central_manager::Central;
pub use host::event_bus::event_stream;
