pub mod domain;
pub mod garde;
pub mod memory;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSiteRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockTelemetryRepository;
