mod error;
mod frame_decoder;
mod ingest_request;
mod ingestion_service;
mod reading_validator;
mod retry_policy;
mod retrying_telemetry_repository;
mod site_sequencer;

pub use error::*;
pub use frame_decoder::*;
pub use ingest_request::*;
pub use ingestion_service::*;
pub use reading_validator::*;
pub use retry_policy::*;
pub use retrying_telemetry_repository::*;
pub use site_sequencer::*;
