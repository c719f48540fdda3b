use chrono::{DateTime, Utc};

/// One raw frame submitted for ingestion.
///
/// Nothing here is checked up front: the site code is resolved against the
/// registry and the payload is judged by the decoder, so every frame for a
/// known active site leaves an audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestFrameRequest {
    pub site_management_code: String,
    pub payload: String,
    /// Arrival time; defaults to the moment the frame is admitted
    pub received_at: Option<DateTime<Utc>>,
}

impl IngestFrameRequest {
    pub fn new(site_management_code: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            site_management_code: site_management_code.into(),
            payload: payload.into(),
            received_at: None,
        }
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }
}
