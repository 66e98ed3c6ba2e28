pub mod config;
pub mod connection;
pub mod entities;
pub mod session;
pub mod store;
pub mod submission;
pub mod timers;
