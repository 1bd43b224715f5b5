pub mod api;
pub mod auth;
pub mod detection;
pub mod session;
pub mod timer;
pub mod tracker;
