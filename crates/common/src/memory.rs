mod site_registry;
mod telemetry_store;

pub use site_registry::*;
pub use telemetry_store::*;
