pub mod advertiser;
mod central_actor;
pub mod central_manager;
mod connection;
mod correlator;
pub mod event_bus;
mod peripheral_manager;
pub mod resolver;
mod scanner;
mod session;
