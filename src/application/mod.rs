pub mod bootstrapper;
pub mod config;
pub mod error;
pub mod state;
