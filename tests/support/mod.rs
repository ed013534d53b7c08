pub mod service;
pub mod socket_guard;
