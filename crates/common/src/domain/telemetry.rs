use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Pump/motor state as reported by a field controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorStatus {
    Stopped,
    Running,
}

impl MotorStatus {
    /// Wire and storage code: 0 = stopped, 1 = running
    pub fn code(self) -> i16 {
        match self {
            MotorStatus::Stopped => 0,
            MotorStatus::Running => 1,
        }
    }

    pub fn from_code(code: i64) -> DomainResult<Self> {
        match code {
            0 => Ok(MotorStatus::Stopped),
            1 => Ok(MotorStatus::Running),
            other => Err(DomainError::InvalidMotorStatus(other)),
        }
    }
}

/// Named fields of a telemetry frame, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingField {
    WaterLevel,
    ChemicalLevel,
    Motor1Status,
    Motor2Status,
    FlowRate,
    TotalAmount,
}

impl ReadingField {
    pub const WIRE_ORDER: [ReadingField; 6] = [
        ReadingField::WaterLevel,
        ReadingField::ChemicalLevel,
        ReadingField::Motor1Status,
        ReadingField::Motor2Status,
        ReadingField::FlowRate,
        ReadingField::TotalAmount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingField::WaterLevel => "water_level",
            ReadingField::ChemicalLevel => "chemical_level",
            ReadingField::Motor1Status => "motor1_status",
            ReadingField::Motor2Status => "motor2_status",
            ReadingField::FlowRate => "flow_rate",
            ReadingField::TotalAmount => "total_amount",
        }
    }
}

impl fmt::Display for ReadingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured form of one telemetry frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub water_level: f64,
    pub chemical_level: f64,
    pub motor1_status: MotorStatus,
    pub motor2_status: MotorStatus,
    pub flow_rate: f64,
    pub total_amount: f64,
}

/// Audit tag recorded on every raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOutcome {
    /// Decoded and validated; a parsed reading exists
    Decoded,
    /// Payload did not match the wire grammar
    Malformed,
    /// Decoded but failed bounds or monotonicity checks
    Rejected,
}

impl FrameOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameOutcome::Decoded => "decoded",
            FrameOutcome::Malformed => "malformed",
            FrameOutcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FrameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decoded" => Ok(FrameOutcome::Decoded),
            "malformed" => Ok(FrameOutcome::Malformed),
            "rejected" => Ok(FrameOutcome::Rejected),
            _ => Err(DomainError::InvalidFrameOutcome(s.to_string())),
        }
    }
}

/// Raw frame as it will be written, before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewRawFrame {
    pub site_management_code: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub outcome: FrameOutcome,
    pub rejection_reason: Option<String>,
}

/// Stored raw frame, immutable once written
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub id: i64,
    pub site_management_code: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub outcome: FrameOutcome,
    pub rejection_reason: Option<String>,
}

/// Validated reading linked one-to-one to the raw frame that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReading {
    pub id: i64,
    pub raw_frame_id: i64,
    pub reading: TelemetryReading,
}

/// A committed raw frame together with its parsed companion, if ingestion
/// succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedFrame {
    pub raw_frame: RawFrame,
    pub parsed_reading: Option<ParsedReading>,
}

/// Input for committing a raw frame and its optional parsed reading
#[derive(Debug, Clone, PartialEq)]
pub struct CommitFrameRepoInput {
    pub raw_frame: NewRawFrame,
    pub parsed_reading: Option<TelemetryReading>,
}

/// Input for fetching the latest parsed reading of a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLastParsedReadingRepoInput {
    pub site_management_code: String,
}

/// Persistence gateway for raw frames and parsed readings
///
/// Implementations must:
/// - Write the raw frame and the parsed reading in one atomic unit
/// - Never expose a parsed reading without its raw frame
/// - Report transient unavailability as `DomainError::StorageUnavailable`
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Commit a raw frame and, if supplied, its parsed reading
    async fn commit_frame(&self, input: CommitFrameRepoInput) -> DomainResult<IngestedFrame>;

    /// Most recently committed parsed reading for a site. Commit order is
    /// lane order, whatever `received_at` the frames carry.
    async fn get_last_parsed_reading(
        &self,
        input: GetLastParsedReadingRepoInput,
    ) -> DomainResult<Option<ParsedReading>>;
}
