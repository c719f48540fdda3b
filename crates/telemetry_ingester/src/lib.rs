pub mod demo;
pub mod domain;
pub mod telemetry_ingester;

pub use demo::*;
pub use domain::*;
pub use telemetry_ingester::*;
