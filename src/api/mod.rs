pub mod central;
pub mod central_event;
pub mod characteristic;
pub mod descriptor;
pub mod peripheral;
pub mod service;
