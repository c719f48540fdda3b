use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Cross-section of a monitored tank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TankType {
    /// Cylindrical tank; `length` is the diameter
    Circle,
    /// Rectangular tank; `length` x `width` footprint
    Square,
}

impl TankType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TankType::Circle => "circle",
            TankType::Square => "square",
        }
    }
}

impl fmt::Display for TankType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TankType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "circle" => Ok(TankType::Circle),
            "square" => Ok(TankType::Square),
            _ => Err(DomainError::InvalidTankType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStatus {
    Active,
    Inactive,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Active => "active",
            SiteStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(SiteStatus::Active),
            "inactive" => Ok(SiteStatus::Inactive),
            _ => Err(DomainError::InvalidSiteStatus(s.to_string())),
        }
    }
}

/// A registered site as owned by the site registry.
///
/// The ingestion pipeline only ever reads sites; geometry bounds the water
/// level a frame may report and the status gates admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub management_code: String,
    pub site_name: String,
    pub contact_number: String,
    pub tank_type: TankType,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub status: SiteStatus,
}

impl Site {
    pub fn is_active(&self) -> bool {
        self.status == SiteStatus::Active
    }

    /// Maximum volume the tank can hold, in cubic units of its dimensions
    pub fn max_volume(&self) -> f64 {
        match self.tank_type {
            TankType::Circle => {
                let radius = self.length / 2.0;
                PI * radius * radius * self.height
            }
            TankType::Square => self.length * self.width * self.height,
        }
    }

    /// Fraction of capacity in use for a given water depth, clamped to [0, 1]
    pub fn fill_ratio(&self, water_level: f64) -> f64 {
        if self.height <= 0.0 {
            return 0.0;
        }
        (water_level / self.height).clamp(0.0, 1.0)
    }
}

/// Input for resolving a site by management code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSiteRepoInput {
    pub management_code: String,
}

/// Read-only view of the site registry consumed by ingestion
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// Resolve a site by management code, inactive sites included
    async fn get_site(&self, input: GetSiteRepoInput) -> DomainResult<Option<Site>>;
}
