mod client;
mod config;
mod error;
mod site_repository;
mod telemetry_repository;

pub use client::*;
pub use config::*;
pub use error::*;
pub use site_repository::*;
pub use telemetry_repository::*;
