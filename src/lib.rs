// Public API for integration tests and potential library usage

pub mod api;
pub mod bingo;
pub mod broadcast;
pub mod bus;
pub mod config;
pub mod error;
pub mod inventory;
pub mod protocol;
pub mod state;
pub mod timer;
pub mod tracker;
pub mod types;
pub mod ws;
