mod result;
mod site;
mod telemetry;

pub use result::*;
pub use site::*;
pub use telemetry::*;
