use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compliance::{ComplianceError, VendorCompliance};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Draft,
    Published,
    Archived,
}

/// A vendor's public catalog entry (venue or event service). Publication
/// is gated on the vendor's compliance row; the listing itself carries no
/// pricing logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub title: String,
    pub category: String,
    pub document_urls: Vec<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(vendor_id: Uuid, title: String, category: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vendor_id,
            title,
            category,
            document_urls: Vec::new(),
            status: ListingStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Publishes the listing, consulting the compliance gate first.
    pub fn publish(&mut self, compliance: &VendorCompliance) -> Result<(), ComplianceError> {
        compliance.ensure_can_publish()?;
        self.status = ListingStatus::Published;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn archive(&mut self) {
        self.status = ListingStatus::Archived;
        self.updated_at = Utc::now();
    }

    /// Attaches an uploaded document by its object-storage URL.
    pub fn attach_document(&mut self, url: String) {
        self.document_urls.push(url);
        self.updated_at = Utc::now();
    }
}
