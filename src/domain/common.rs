//! Pieces shared by every report type: the common header, attached photos and
//! the write lifecycle hooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;

pub const MAX_PHOTO_URL_LEN: usize = 500;

/// Fields every report carries, stored as plain columns on each report table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReportHeader {
    #[serde(default)]
    pub id: String,
    pub reporter_name: String,
    #[serde(default)]
    pub reporter_phone: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub regency: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Column list matching [`ReportHeader`], in bind order.
pub const HEADER_COLUMNS: &str = "id, reporter_name, reporter_phone, latitude, longitude, \
     address, village, district, regency, created_by, created_at, updated_at";

impl ReportHeader {
    pub fn new(reporter_name: impl Into<String>) -> Self {
        Self {
            reporter_name: reporter_name.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Assign the id if unset and stamp both timestamps.
    pub fn stamp_create(&mut self, ids: &IdGenerator, now: DateTime<Utc>) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            self.id = ids.next_id()?;
        }
        self.created_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// Keep the immutable fields of `previous` and refresh `updated_at`.
    pub fn stamp_update(&mut self, previous: &ReportHeader, now: DateTime<Utc>) {
        self.id = previous.id.clone();
        self.created_at = previous.created_at;
        self.created_by = previous.created_by.clone();
        self.updated_at = now.max(previous.created_at);
    }

    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.reporter_name.trim().is_empty() {
            return Err(CoreError::validation("reporter_name is required"));
        }
        validate_location(self.latitude, self.longitude)
    }
}

/// Latitude and longitude must be both present or both absent, and in range.
pub fn validate_location(latitude: Option<f64>, longitude: Option<f64>) -> CoreResult<()> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
                return Err(CoreError::validation(format!("latitude {lat} out of range")));
            }
            if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
                return Err(CoreError::validation(format!("longitude {lon} out of range")));
            }
            Ok(())
        }
        _ => Err(CoreError::validation(
            "latitude and longitude must be provided together",
        )),
    }
}

/// Reject negative or non-finite measurements.
pub fn validate_non_negative(field: &str, value: f64) -> CoreResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CoreError::validation(format!("{field} must be a non-negative number")))
    }
}

/// Photo attached to a report. Owned by exactly one report and deleted with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReportPhoto {
    pub id: String,
    pub report_id: String,
    pub photo_url: String,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Photo supplied with a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPhoto {
    pub photo_url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

impl NewPhoto {
    pub fn new(photo_url: impl Into<String>) -> Self {
        Self {
            photo_url: photo_url.into(),
            caption: None,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        let url = self.photo_url.trim();
        if url.is_empty() {
            return Err(CoreError::validation("photo_url is required"));
        }
        if url.chars().count() > MAX_PHOTO_URL_LEN {
            return Err(CoreError::validation(format!(
                "photo_url longer than {MAX_PHOTO_URL_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Write hooks run by repositories right before a row is inserted or updated.
///
/// Both hooks are total apart from identifier generation, and re-running the
/// derivations on a fully populated record leaves it unchanged.
pub trait Lifecycle {
    fn before_create(&mut self, ids: &IdGenerator, now: DateTime<Utc>) -> CoreResult<()>;

    /// `previous` is the stored row being overwritten.
    fn before_update(&mut self, previous: &Self, now: DateTime<Utc>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn location_must_be_paired() {
        assert!(validate_location(None, None).is_ok());
        assert!(validate_location(Some(-7.5), Some(110.8)).is_ok());
        assert!(validate_location(Some(-7.5), None).is_err());
        assert!(validate_location(None, Some(110.8)).is_err());
        assert!(validate_location(Some(95.0), Some(110.8)).is_err());
        assert!(validate_location(Some(0.0), Some(181.0)).is_err());
    }

    #[test]
    fn stamp_create_keeps_preset_id() {
        let ids = IdGenerator::new();
        let now = Utc::now();
        let mut header = ReportHeader::new("Sari");
        header.id = "01HZZZZZZZZZZZZZZZZZZZZZZZ".to_string();
        header.stamp_create(&ids, now).unwrap();
        assert_eq!(header.id, "01HZZZZZZZZZZZZZZZZZZZZZZZ");
        assert_eq!(header.created_at, now);
        assert_eq!(header.updated_at, now);
    }

    #[test]
    fn stamp_update_never_moves_before_created_at() {
        let ids = IdGenerator::new();
        let created = Utc::now();
        let mut stored = ReportHeader::new("Sari");
        stored.created_by = Some("user-1".into());
        stored.stamp_create(&ids, created).unwrap();

        let mut incoming = ReportHeader::new("Sari W.");
        incoming.created_by = Some("someone-else".into());
        incoming.stamp_update(&stored, created - Duration::seconds(30));
        assert_eq!(incoming.id, stored.id);
        assert_eq!(incoming.created_by.as_deref(), Some("user-1"));
        assert!(incoming.created_at <= incoming.updated_at);
    }

    #[test]
    fn photo_url_length_is_bounded() {
        assert!(NewPhoto::new("https://cdn.example/p/1.jpg").validate().is_ok());
        assert!(NewPhoto::new("   ").validate().is_err());
        assert!(NewPhoto::new("x".repeat(501)).validate().is_err());
        assert!(NewPhoto::new("x".repeat(500)).validate().is_ok());
    }
}
