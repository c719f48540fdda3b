use crate::domain::{
    CommitFrameRepoInput, DomainError, DomainResult, GetLastParsedReadingRepoInput, IngestedFrame,
    MotorStatus, ParsedReading, RawFrame, TelemetryReading, TelemetryRepository,
};
use crate::postgres::{classify_postgres_error, PostgresClient};
use async_trait::async_trait;
use tracing::debug;

/// Parsed reading row joined from `parsed_readings`
#[derive(Debug, Clone)]
pub struct ParsedReadingRow {
    pub id: i64,
    pub raw_frame_id: i64,
    pub water_level: f64,
    pub chemical_level: f64,
    pub motor1_status: i16,
    pub motor2_status: i16,
    pub flow_rate: f64,
    pub total_amount: f64,
}

impl TryFrom<ParsedReadingRow> for ParsedReading {
    type Error = DomainError;

    fn try_from(row: ParsedReadingRow) -> Result<Self, Self::Error> {
        Ok(ParsedReading {
            id: row.id,
            raw_frame_id: row.raw_frame_id,
            reading: TelemetryReading {
                water_level: row.water_level,
                chemical_level: row.chemical_level,
                motor1_status: MotorStatus::from_code(row.motor1_status.into())?,
                motor2_status: MotorStatus::from_code(row.motor2_status.into())?,
                flow_rate: row.flow_rate,
                total_amount: row.total_amount,
            },
        })
    }
}

/// PostgreSQL persistence gateway for raw frames and parsed readings
#[derive(Clone)]
pub struct PostgresTelemetryRepository {
    client: PostgresClient,
}

impl PostgresTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetryRepository for PostgresTelemetryRepository {
    async fn commit_frame(&self, input: CommitFrameRepoInput) -> DomainResult<IngestedFrame> {
        let raw = input.raw_frame;
        debug!(
            site_management_code = %raw.site_management_code,
            outcome = %raw.outcome,
            with_parsed_reading = input.parsed_reading.is_some(),
            "committing raw frame"
        );

        let mut conn = self.client.checkout().await?;

        let tx = conn.transaction().await.map_err(classify_postgres_error)?;

        let outcome = raw.outcome.as_str();
        let row = tx
            .query_one(
                "INSERT INTO raw_frames (site_management_code, payload, received_at, outcome, rejection_reason)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id",
                &[
                    &raw.site_management_code,
                    &raw.payload,
                    &raw.received_at,
                    &outcome,
                    &raw.rejection_reason,
                ],
            )
            .await
            .map_err(classify_postgres_error)?;
        let raw_frame_id: i64 = row.get(0);

        let parsed_reading = match input.parsed_reading {
            Some(reading) => {
                let row = tx
                    .query_one(
                        "INSERT INTO parsed_readings (raw_frame_id, water_level, chemical_level, motor1_status, motor2_status, flow_rate, total_amount)
                         VALUES ($1, $2, $3, $4, $5, $6, $7)
                         RETURNING id",
                        &[
                            &raw_frame_id,
                            &reading.water_level,
                            &reading.chemical_level,
                            &reading.motor1_status.code(),
                            &reading.motor2_status.code(),
                            &reading.flow_rate,
                            &reading.total_amount,
                        ],
                    )
                    .await
                    .map_err(classify_postgres_error)?;
                Some(ParsedReading {
                    id: row.get(0),
                    raw_frame_id,
                    reading,
                })
            }
            None => None,
        };

        tx.commit().await.map_err(classify_postgres_error)?;

        debug!(raw_frame_id, "raw frame committed");

        Ok(IngestedFrame {
            raw_frame: RawFrame {
                id: raw_frame_id,
                site_management_code: raw.site_management_code,
                payload: raw.payload,
                received_at: raw.received_at,
                outcome: raw.outcome,
                rejection_reason: raw.rejection_reason,
            },
            parsed_reading,
        })
    }

    async fn get_last_parsed_reading(
        &self,
        input: GetLastParsedReadingRepoInput,
    ) -> DomainResult<Option<ParsedReading>> {
        let conn = self.client.checkout().await?;

        let row = conn
            .query_opt(
                "SELECT p.id, p.raw_frame_id, p.water_level, p.chemical_level, p.motor1_status, p.motor2_status, p.flow_rate, p.total_amount
                 FROM parsed_readings p
                 JOIN raw_frames r ON r.id = p.raw_frame_id
                 WHERE r.site_management_code = $1
                 ORDER BY r.id DESC
                 LIMIT 1",
                &[&input.site_management_code],
            )
            .await
            .map_err(classify_postgres_error)?;

        row.map(|row| {
            ParsedReadingRow {
                id: row.get(0),
                raw_frame_id: row.get(1),
                water_level: row.get(2),
                chemical_level: row.get(3),
                motor1_status: row.get(4),
                motor2_status: row.get(5),
                flow_rate: row.get(6),
                total_amount: row.get(7),
            }
            .try_into()
        })
        .transpose()
    }
}
