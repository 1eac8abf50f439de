use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// State of one calendar day for a resource (venue or service crew).
/// Days absent from the map are open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayStatus {
    Tentative,
    Blocked,
}

/// Sparse per-resource availability map. Each date key is independently
/// consistent; there is no locking across resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub resource_id: Uuid,
    pub days: BTreeMap<NaiveDate, DayStatus>,
    pub updated_at: DateTime<Utc>,
    pub rev: u64,
}

impl Calendar {
    pub fn new(resource_id: Uuid) -> Self {
        Self {
            resource_id,
            days: BTreeMap::new(),
            updated_at: Utc::now(),
            rev: 0,
        }
    }

    pub fn status(&self, date: NaiveDate) -> Option<DayStatus> {
        self.days.get(&date).copied()
    }

    /// Soft-holds a date while a booking is negotiated. A blocked date
    /// cannot be held.
    pub fn mark_tentative(&mut self, date: NaiveDate) -> Result<(), CalendarError> {
        match self.days.get(&date) {
            Some(DayStatus::Blocked) => Err(CalendarError::DateUnavailable {
                resource_id: self.resource_id,
                date,
            }),
            _ => {
                self.days.insert(date, DayStatus::Tentative);
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Confirms a booking on a date, flipping it to blocked. A date that
    /// is already blocked cannot receive another confirmed booking.
    pub fn confirm_booking(&mut self, date: NaiveDate) -> Result<(), CalendarError> {
        match self.days.get(&date) {
            Some(DayStatus::Blocked) => Err(CalendarError::DateUnavailable {
                resource_id: self.resource_id,
                date,
            }),
            _ => {
                self.days.insert(date, DayStatus::Blocked);
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Releases a hold or a blocked date, e.g. after a cancellation.
    pub fn release_date(&mut self, date: NaiveDate) {
        self.days.remove(&date);
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("resource {resource_id} is unavailable on {date}")]
    DateUnavailable { resource_id: Uuid, date: NaiveDate },

    #[error(transparent)]
    Store(#[from] venuo_core::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn confirm_blocks_the_date() {
        let mut cal = Calendar::new(Uuid::new_v4());
        cal.confirm_booking(date("2026-09-12")).unwrap();
        assert_eq!(cal.status(date("2026-09-12")), Some(DayStatus::Blocked));

        let err = cal.confirm_booking(date("2026-09-12")).unwrap_err();
        assert!(matches!(err, CalendarError::DateUnavailable { .. }));
    }

    #[test]
    fn tentative_upgrade_and_release() {
        let mut cal = Calendar::new(Uuid::new_v4());
        cal.mark_tentative(date("2026-09-12")).unwrap();
        assert_eq!(cal.status(date("2026-09-12")), Some(DayStatus::Tentative));

        // Tentative holds can still be confirmed.
        cal.confirm_booking(date("2026-09-12")).unwrap();
        assert_eq!(cal.status(date("2026-09-12")), Some(DayStatus::Blocked));

        // Blocked days cannot be re-held.
        assert!(cal.mark_tentative(date("2026-09-12")).is_err());

        cal.release_date(date("2026-09-12"));
        assert_eq!(cal.status(date("2026-09-12")), None);
        cal.confirm_booking(date("2026-09-12")).unwrap();
    }

    #[test]
    fn dates_are_independent() {
        let mut cal = Calendar::new(Uuid::new_v4());
        cal.confirm_booking(date("2026-09-12")).unwrap();
        cal.confirm_booking(date("2026-09-13")).unwrap();
        assert_eq!(cal.days.len(), 2);
    }
}
