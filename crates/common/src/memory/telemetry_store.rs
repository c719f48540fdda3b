use crate::domain::{
    CommitFrameRepoInput, DomainResult, GetLastParsedReadingRepoInput, IngestedFrame,
    ParsedReading, RawFrame, TelemetryRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    next_raw_frame_id: i64,
    next_parsed_reading_id: i64,
    raw_frames: Vec<RawFrame>,
    // keyed by raw frame id, which enforces one parsed reading per frame
    parsed_readings: HashMap<i64, ParsedReading>,
}

/// In-memory implementation of TelemetryRepository
///
/// Both rows of a commit are written under a single write lock, so readers
/// never observe a parsed reading without its raw frame.
#[derive(Clone, Default)]
pub struct InMemoryTelemetryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All raw frames in commit order
    pub async fn raw_frames(&self) -> Vec<RawFrame> {
        self.state.read().await.raw_frames.clone()
    }

    /// Raw frames of one site in commit order
    pub async fn raw_frames_for_site(&self, site_management_code: &str) -> Vec<RawFrame> {
        self.state
            .read()
            .await
            .raw_frames
            .iter()
            .filter(|frame| frame.site_management_code == site_management_code)
            .cloned()
            .collect()
    }

    /// All parsed readings ordered by id
    pub async fn parsed_readings(&self) -> Vec<ParsedReading> {
        let state = self.state.read().await;
        let mut readings: Vec<ParsedReading> = state.parsed_readings.values().cloned().collect();
        readings.sort_by_key(|reading| reading.id);
        readings
    }
}

#[async_trait]
impl TelemetryRepository for InMemoryTelemetryStore {
    async fn commit_frame(&self, input: CommitFrameRepoInput) -> DomainResult<IngestedFrame> {
        let mut state = self.state.write().await;

        state.next_raw_frame_id += 1;
        let raw_frame = RawFrame {
            id: state.next_raw_frame_id,
            site_management_code: input.raw_frame.site_management_code,
            payload: input.raw_frame.payload,
            received_at: input.raw_frame.received_at,
            outcome: input.raw_frame.outcome,
            rejection_reason: input.raw_frame.rejection_reason,
        };

        let parsed_reading = match input.parsed_reading {
            Some(reading) => {
                state.next_parsed_reading_id += 1;
                let parsed = ParsedReading {
                    id: state.next_parsed_reading_id,
                    raw_frame_id: raw_frame.id,
                    reading,
                };
                state.parsed_readings.insert(raw_frame.id, parsed.clone());
                Some(parsed)
            }
            None => None,
        };

        state.raw_frames.push(raw_frame.clone());

        Ok(IngestedFrame {
            raw_frame,
            parsed_reading,
        })
    }

    async fn get_last_parsed_reading(
        &self,
        input: GetLastParsedReadingRepoInput,
    ) -> DomainResult<Option<ParsedReading>> {
        let state = self.state.read().await;

        // Raw frames are kept in commit order
        let latest = state
            .raw_frames
            .iter()
            .rev()
            .filter(|frame| frame.site_management_code == input.site_management_code)
            .find_map(|frame| state.parsed_readings.get(&frame.id))
            .cloned();

        Ok(latest)
    }
}
