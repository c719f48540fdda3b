use crate::domain::{
    decode_frame, validate_reading, FrameRejection, IngestFrameRequest, SiteSequencer,
};
use chrono::{DateTime, Utc};
use common::domain::{
    CommitFrameRepoInput, DomainError, DomainResult, FrameOutcome, GetLastParsedReadingRepoInput,
    GetSiteRepoInput, NewRawFrame, ParsedReading, Site, SiteRepository, TelemetryReading,
    TelemetryRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn, Instrument};

/// Result of submitting one frame
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Frame decoded, validated and committed with its parsed reading
    Accepted(ParsedReading),
    /// No site with this management code; nothing recorded
    RejectedSiteNotFound { site_code: String },
    /// Site exists but is inactive; nothing recorded
    RejectedSiteInactive { site_code: String },
    /// Raw frame recorded for audit, but decoding or validation failed
    RecordedButInvalid {
        raw_frame_id: i64,
        error: FrameRejection,
    },
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted(_))
    }
}

/// Domain service that admits raw frames and commits them per site
///
/// Flow:
/// 1. Resolve the site; unknown or inactive sites are rejected outright
/// 2. On the site's lane: decode, load the last accepted reading, validate
/// 3. Commit the raw frame, plus the parsed reading when valid
pub struct IngestionService {
    site_repository: Arc<dyn SiteRepository>,
    telemetry_repository: Arc<dyn TelemetryRepository>,
    sequencer: SiteSequencer,
}

impl IngestionService {
    pub fn new(
        site_repository: Arc<dyn SiteRepository>,
        telemetry_repository: Arc<dyn TelemetryRepository>,
        sequencer: SiteSequencer,
    ) -> Self {
        Self {
            site_repository,
            telemetry_repository,
            sequencer,
        }
    }

    /// Ingest one frame and wait for its outcome
    #[instrument(
        skip(self, request),
        fields(
            site_management_code = %request.site_management_code,
            payload_len = request.payload.len()
        )
    )]
    pub async fn ingest(&self, request: IngestFrameRequest) -> DomainResult<IngestOutcome> {
        let site = match self
            .site_repository
            .get_site(GetSiteRepoInput {
                management_code: request.site_management_code.clone(),
            })
            .await?
        {
            None => {
                warn!(
                    site_management_code = %request.site_management_code,
                    "rejecting frame for unknown site"
                );
                return Ok(IngestOutcome::RejectedSiteNotFound {
                    site_code: request.site_management_code,
                });
            }
            Some(site) if !site.is_active() => {
                warn!(
                    site_management_code = %site.management_code,
                    "rejecting frame for inactive site"
                );
                return Ok(IngestOutcome::RejectedSiteInactive {
                    site_code: site.management_code,
                });
            }
            Some(site) => site,
        };

        debug!(site_management_code = %site.management_code, "admitting frame to site lane");

        let lane_key = site.management_code.clone();
        let repository = self.telemetry_repository.clone();
        let requested_at = request.received_at;
        let payload = request.payload;

        self.sequencer
            .enqueue(&lane_key, move || {
                // Default receipt time is taken at admission, in lane order
                let received_at = requested_at.unwrap_or_else(Utc::now);
                process_frame(repository, site, payload, received_at).in_current_span()
            })
            .await
    }

    /// Like [`ingest`](Self::ingest) but stops waiting after `timeout`.
    ///
    /// A frame that was already admitted is still processed on its lane.
    pub async fn ingest_with_timeout(
        &self,
        request: IngestFrameRequest,
        timeout: Duration,
    ) -> DomainResult<IngestOutcome> {
        let site_management_code = request.site_management_code.clone();
        match tokio::time::timeout(timeout, self.ingest(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    site_management_code = %site_management_code,
                    timeout_ms = timeout.as_millis() as u64,
                    "gave up waiting for ingestion outcome"
                );
                Err(DomainError::IngestTimedOut {
                    site_management_code,
                    timeout,
                })
            }
        }
    }

    /// Lanes currently open, one per recently active site
    pub async fn active_lanes(&self) -> usize {
        self.sequencer.active_lanes().await
    }
}

/// Lane turn for one admitted frame
async fn process_frame(
    repository: Arc<dyn TelemetryRepository>,
    site: Site,
    payload: String,
    received_at: DateTime<Utc>,
) -> DomainResult<IngestOutcome> {
    let verdict: Result<TelemetryReading, FrameRejection> = match decode_frame(&payload) {
        Err(decode_error) => Err(decode_error.into()),
        Ok(reading) => {
            let previous = repository
                .get_last_parsed_reading(GetLastParsedReadingRepoInput {
                    site_management_code: site.management_code.clone(),
                })
                .await?;
            validate_reading(reading, &site, previous.as_ref()).map_err(FrameRejection::from)
        }
    };

    let (outcome, rejection_reason, parsed_reading) = match &verdict {
        Ok(reading) => (FrameOutcome::Decoded, None, Some(*reading)),
        Err(rejection) => (rejection.outcome(), Some(rejection.to_string()), None),
    };

    let committed = repository
        .commit_frame(CommitFrameRepoInput {
            raw_frame: NewRawFrame {
                site_management_code: site.management_code.clone(),
                payload,
                received_at,
                outcome,
                rejection_reason,
            },
            parsed_reading,
        })
        .await?;

    match verdict {
        Ok(_) => {
            let parsed = committed.parsed_reading.ok_or_else(|| {
                DomainError::RepositoryError(anyhow::anyhow!(
                    "parsed reading missing from committed frame {}",
                    committed.raw_frame.id
                ))
            })?;
            info!(
                site_management_code = %site.management_code,
                raw_frame_id = parsed.raw_frame_id,
                water_level = parsed.reading.water_level,
                fill_ratio = site.fill_ratio(parsed.reading.water_level),
                total_amount = parsed.reading.total_amount,
                "frame accepted"
            );
            Ok(IngestOutcome::Accepted(parsed))
        }
        Err(rejection) => {
            warn!(
                site_management_code = %site.management_code,
                raw_frame_id = committed.raw_frame.id,
                outcome = %committed.raw_frame.outcome,
                reason = %rejection,
                "frame recorded but not accepted"
            );
            Ok(IngestOutcome::RecordedButInvalid {
                raw_frame_id: committed.raw_frame.id,
                error: rejection,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecodeError, ValidationError, MAX_PAYLOAD_CHARS};
    use common::domain::{
        IngestedFrame, MotorStatus, RawFrame, ReadingField, SiteStatus, TankType,
    };
    use common::{MockSiteRepository, MockTelemetryRepository};

    fn site(status: SiteStatus) -> Site {
        Site {
            management_code: "S01".to_string(),
            site_name: "North reservoir".to_string(),
            contact_number: "010-0000-0000".to_string(),
            tank_type: TankType::Square,
            length: 2.0,
            width: 2.0,
            height: 5.0,
            status,
        }
    }

    fn committed(input: &CommitFrameRepoInput) -> IngestedFrame {
        IngestedFrame {
            raw_frame: RawFrame {
                id: 11,
                site_management_code: input.raw_frame.site_management_code.clone(),
                payload: input.raw_frame.payload.clone(),
                received_at: input.raw_frame.received_at,
                outcome: input.raw_frame.outcome,
                rejection_reason: input.raw_frame.rejection_reason.clone(),
            },
            parsed_reading: input.parsed_reading.map(|reading| ParsedReading {
                id: 21,
                raw_frame_id: 11,
                reading,
            }),
        }
    }

    fn service(
        site_repo: MockSiteRepository,
        telemetry_repo: MockTelemetryRepository,
    ) -> IngestionService {
        IngestionService::new(
            Arc::new(site_repo),
            Arc::new(telemetry_repo),
            SiteSequencer::new(Duration::from_secs(60)),
        )
    }

    #[tokio::test]
    async fn test_ingest_accepts_valid_frame() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .withf(|input: &GetSiteRepoInput| input.management_code == "S01")
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Active))));

        mock_telemetry_repo
            .expect_get_last_parsed_reading()
            .withf(|input: &GetLastParsedReadingRepoInput| input.site_management_code == "S01")
            .times(1)
            .return_once(|_| Ok(None));

        mock_telemetry_repo
            .expect_commit_frame()
            .withf(|input: &CommitFrameRepoInput| {
                input.raw_frame.outcome == FrameOutcome::Decoded
                    && input.raw_frame.rejection_reason.is_none()
                    && input.parsed_reading.is_some()
            })
            .times(1)
            .returning(|input| Ok(committed(&input)));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("S01", "1.2,0.5,1,0,10.0,100.0"))
            .await;

        // Assert
        match result.unwrap() {
            IngestOutcome::Accepted(parsed) => {
                assert_eq!(parsed.raw_frame_id, 11);
                assert_eq!(parsed.reading.water_level, 1.2);
                assert_eq!(parsed.reading.motor1_status, MotorStatus::Running);
                assert_eq!(parsed.reading.total_amount, 100.0);
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ingest_unknown_site_records_nothing() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(None));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("ZZZ", "1.2,0.5,1,0,10.0,100.0"))
            .await;

        // Assert - the telemetry mock panics on any unexpected call
        assert_eq!(
            result.unwrap(),
            IngestOutcome::RejectedSiteNotFound {
                site_code: "ZZZ".to_string()
            }
        );
        assert_eq!(service.active_lanes().await, 0);
    }

    #[tokio::test]
    async fn test_ingest_inactive_site_records_nothing() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Inactive))));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("S01", "1.2,0.5,1,0,10.0,100.0"))
            .await;

        // Assert
        assert_eq!(
            result.unwrap(),
            IngestOutcome::RejectedSiteInactive {
                site_code: "S01".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_ingest_malformed_frame_skips_history_lookup() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Active))));

        mock_telemetry_repo
            .expect_commit_frame()
            .withf(|input: &CommitFrameRepoInput| {
                input.raw_frame.outcome == FrameOutcome::Malformed
                    && input.parsed_reading.is_none()
                    && input
                        .raw_frame
                        .rejection_reason
                        .as_deref()
                        .is_some_and(|reason| reason.contains("motor1_status"))
            })
            .times(1)
            .returning(|input| Ok(committed(&input)));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("S01", "1.2,0.5,2,0,10.0,100.0"))
            .await;

        // Assert
        match result.unwrap() {
            IngestOutcome::RecordedButInvalid {
                raw_frame_id,
                error: FrameRejection::Decode(DecodeError::Malformed { .. }),
            } => assert_eq!(raw_frame_id, 11),
            other => panic!("expected malformed RecordedButInvalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ingest_rejects_decreasing_total() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Active))));

        mock_telemetry_repo
            .expect_get_last_parsed_reading()
            .times(1)
            .return_once(|_| {
                Ok(Some(ParsedReading {
                    id: 1,
                    raw_frame_id: 1,
                    reading: TelemetryReading {
                        water_level: 1.0,
                        chemical_level: 0.5,
                        motor1_status: MotorStatus::Running,
                        motor2_status: MotorStatus::Stopped,
                        flow_rate: 10.0,
                        total_amount: 100.0,
                    },
                }))
            });

        mock_telemetry_repo
            .expect_commit_frame()
            .withf(|input: &CommitFrameRepoInput| {
                input.raw_frame.outcome == FrameOutcome::Rejected && input.parsed_reading.is_none()
            })
            .times(1)
            .returning(|input| Ok(committed(&input)));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("S01", "1.3,0.5,1,0,10.0,95.0"))
            .await;

        // Assert
        assert_eq!(
            result.unwrap(),
            IngestOutcome::RecordedButInvalid {
                raw_frame_id: 11,
                error: FrameRejection::Validation(ValidationError::NonMonotonicTotal {
                    previous: 100.0,
                    observed: 95.0,
                }),
            }
        );
    }

    #[tokio::test]
    async fn test_ingest_rejects_water_level_above_tank_height() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Active))));
        mock_telemetry_repo
            .expect_get_last_parsed_reading()
            .times(1)
            .return_once(|_| Ok(None));
        mock_telemetry_repo
            .expect_commit_frame()
            .times(1)
            .returning(|input| Ok(committed(&input)));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("S01", "6.0,0.5,1,0,10.0,100.0"))
            .await;

        // Assert
        assert!(matches!(
            result.unwrap(),
            IngestOutcome::RecordedButInvalid {
                error: FrameRejection::Validation(ValidationError::OutOfRange {
                    field: ReadingField::WaterLevel,
                    bound,
                    ..
                }),
                ..
            } if bound == 5.0
        ));
    }

    #[tokio::test]
    async fn test_ingest_oversized_payload_is_recorded_as_malformed() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Active))));

        mock_telemetry_repo.expect_get_last_parsed_reading().never();
        mock_telemetry_repo
            .expect_commit_frame()
            .withf(|input: &CommitFrameRepoInput| {
                input.raw_frame.outcome == FrameOutcome::Malformed
                    && input.raw_frame.payload.chars().count() == MAX_PAYLOAD_CHARS + 1
                    && input
                        .raw_frame
                        .rejection_reason
                        .as_deref()
                        .is_some_and(|reason| reason.contains("exceeds"))
            })
            .times(1)
            .returning(|input| Ok(committed(&input)));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new(
                "S01",
                "1".repeat(MAX_PAYLOAD_CHARS + 1),
            ))
            .await;

        // Assert
        assert!(matches!(
            result,
            Ok(IngestOutcome::RecordedButInvalid {
                raw_frame_id: 11,
                error: FrameRejection::Decode(_),
            })
        ));
    }

    #[tokio::test]
    async fn test_ingest_empty_site_code_is_resolved_like_any_other() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .withf(|input: &GetSiteRepoInput| input.management_code.is_empty())
            .times(1)
            .return_once(|_| Ok(None));
        mock_telemetry_repo.expect_commit_frame().never();

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("", "1.2,0.5,1,0,10.0,100.0"))
            .await;

        // Assert
        assert_eq!(
            result.unwrap(),
            IngestOutcome::RejectedSiteNotFound {
                site_code: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_ingest_surfaces_commit_failure() {
        // Arrange
        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Active))));
        mock_telemetry_repo
            .expect_get_last_parsed_reading()
            .times(1)
            .return_once(|_| Ok(None));
        mock_telemetry_repo
            .expect_commit_frame()
            .times(1)
            .returning(|_| {
                Err(DomainError::StorageRetriesExhausted {
                    attempts: 5,
                    last_error: "connection refused".to_string(),
                })
            });

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("S01", "1.2,0.5,1,0,10.0,100.0"))
            .await;

        // Assert
        assert!(matches!(
            result,
            Err(DomainError::StorageRetriesExhausted { attempts: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_explicit_received_at_is_kept() {
        // Arrange
        let received_at = DateTime::parse_from_rfc3339("2024-03-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut mock_site_repo = MockSiteRepository::new();
        let mut mock_telemetry_repo = MockTelemetryRepository::new();

        mock_site_repo
            .expect_get_site()
            .times(1)
            .return_once(|_| Ok(Some(site(SiteStatus::Active))));
        mock_telemetry_repo
            .expect_commit_frame()
            .withf(move |input: &CommitFrameRepoInput| input.raw_frame.received_at == received_at)
            .times(1)
            .returning(|input| Ok(committed(&input)));

        let service = service(mock_site_repo, mock_telemetry_repo);

        // Act
        let result = service
            .ingest(IngestFrameRequest::new("S01", "garbage").received_at(received_at))
            .await;

        // Assert
        assert!(matches!(
            result.unwrap(),
            IngestOutcome::RecordedButInvalid { .. }
        ));
    }
}
