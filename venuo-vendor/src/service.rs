use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;
use venuo_core::identity::{ActorRole, Principal};
use venuo_core::StoreError;

use crate::calendar::{Calendar, CalendarError};
use crate::compliance::{ComplianceError, VendorCompliance};
use crate::listing::Listing;
use crate::repository::{CalendarRepo, ComplianceRepo, ListingRepo};

const MAX_CAS_RETRIES: usize = 4;

/// Vendor-side orchestration: compliance mutations, listing publication
/// and the availability calendar. All writes are get → mutate → CAS with
/// a bounded retry on revision conflicts.
pub struct VendorService {
    compliance: Arc<dyn ComplianceRepo>,
    calendars: Arc<dyn CalendarRepo>,
    listings: Arc<dyn ListingRepo>,
}

impl VendorService {
    pub fn new(
        compliance: Arc<dyn ComplianceRepo>,
        calendars: Arc<dyn CalendarRepo>,
        listings: Arc<dyn ListingRepo>,
    ) -> Self {
        Self { compliance, calendars, listings }
    }

    pub async fn compliance_status(
        &self,
        vendor_id: Uuid,
    ) -> Result<VendorCompliance, ComplianceError> {
        self.compliance
            .get(vendor_id)
            .await?
            .ok_or(ComplianceError::VendorNotFound(vendor_id))
    }

    /// Fetches the vendor's compliance row, creating an empty one on first
    /// contact. Vendors exist in the identity provider before they ever
    /// touch compliance.
    async fn load_or_create(&self, vendor_id: Uuid) -> Result<VendorCompliance, ComplianceError> {
        if let Some(record) = self.compliance.get(vendor_id).await? {
            return Ok(record);
        }
        let record = VendorCompliance::new(vendor_id);
        match self.compliance.insert(&record).await {
            Ok(()) => Ok(record),
            // Lost the creation race; the other writer's row wins.
            Err(StoreError::RevConflict) => Ok(self
                .compliance
                .get(vendor_id)
                .await?
                .ok_or(ComplianceError::VendorNotFound(vendor_id))?),
            Err(e) => Err(e.into()),
        }
    }

    async fn mutate_compliance<F>(
        &self,
        vendor_id: Uuid,
        mut f: F,
    ) -> Result<VendorCompliance, ComplianceError>
    where
        F: FnMut(&mut VendorCompliance) -> Result<(), ComplianceError>,
    {
        for _ in 0..MAX_CAS_RETRIES {
            let mut record = self.load_or_create(vendor_id).await?;
            f(&mut record)?;
            match self.compliance.update(&record).await {
                Ok(()) => return Ok(record),
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }

    pub async fn record_admin_approval(
        &self,
        actor: &Principal,
        vendor_id: Uuid,
    ) -> Result<VendorCompliance, ComplianceError> {
        require_role(actor, ActorRole::Admin)?;
        let record = self
            .mutate_compliance(vendor_id, |c| {
                c.record_admin_approval();
                Ok(())
            })
            .await?;
        tracing::info!(%vendor_id, can_publish = record.can_publish(), "vendor approved by admin");
        Ok(record)
    }

    pub async fn record_contract_acceptance(
        &self,
        actor: &Principal,
        vendor_id: Uuid,
        version: u32,
        ip: String,
    ) -> Result<VendorCompliance, ComplianceError> {
        if actor.role == ActorRole::Vendor && actor.id != vendor_id {
            return Err(ComplianceError::Forbidden(
                "vendors may only accept their own contract".into(),
            ));
        }
        if !matches!(actor.role, ActorRole::Vendor | ActorRole::Admin) {
            return Err(ComplianceError::Forbidden(format!(
                "role {:?} cannot accept contracts",
                actor.role
            )));
        }
        let actor_id = actor.id;
        let record = self
            .mutate_compliance(vendor_id, move |c| {
                c.record_contract_acceptance(version, actor_id, ip.clone())
            })
            .await?;
        tracing::info!(%vendor_id, version, "contract accepted");
        Ok(record)
    }

    /// Training sign-off is an admin action; vendors cannot self-certify.
    pub async fn record_training_completion(
        &self,
        actor: &Principal,
        vendor_id: Uuid,
    ) -> Result<VendorCompliance, ComplianceError> {
        require_role(actor, ActorRole::Admin)?;
        self.mutate_compliance(vendor_id, |c| {
            c.record_training_completion();
            Ok(())
        })
        .await
    }

    /// Applies a payout-account status report. Driven by the payout
    /// provider's webhook, so the actor is the system.
    pub async fn apply_payout_account_status(
        &self,
        vendor_id: Uuid,
        charges_enabled: bool,
        payouts_enabled: bool,
        pending_requirements: Vec<String>,
    ) -> Result<VendorCompliance, ComplianceError> {
        let record = self
            .mutate_compliance(vendor_id, |c| {
                c.apply_payout_account_status(
                    charges_enabled,
                    payouts_enabled,
                    pending_requirements.clone(),
                );
                Ok(())
            })
            .await?;
        tracing::info!(
            %vendor_id,
            payouts_enabled,
            can_publish = record.can_publish(),
            "payout account status applied"
        );
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    pub async fn create_listing(
        &self,
        actor: &Principal,
        title: String,
        category: String,
    ) -> Result<Listing, ComplianceError> {
        require_role(actor, ActorRole::Vendor)?;
        let listing = Listing::new(actor.id, title, category);
        self.listings.upsert(&listing).await?;
        Ok(listing)
    }

    pub async fn publish_listing(
        &self,
        actor: &Principal,
        listing_id: Uuid,
    ) -> Result<Listing, ComplianceError> {
        let mut listing = self
            .listings
            .get(listing_id)
            .await?
            .ok_or(ComplianceError::ListingNotFound(listing_id))?;
        if actor.role == ActorRole::Vendor && actor.id != listing.vendor_id {
            return Err(ComplianceError::Forbidden("listing belongs to another vendor".into()));
        }
        let compliance = self.load_or_create(listing.vendor_id).await?;
        listing.publish(&compliance)?;
        self.listings.upsert(&listing).await?;
        tracing::info!(%listing_id, vendor_id = %listing.vendor_id, "listing published");
        Ok(listing)
    }

    pub async fn attach_document(
        &self,
        actor: &Principal,
        listing_id: Uuid,
        url: String,
    ) -> Result<Listing, ComplianceError> {
        let mut listing = self
            .listings
            .get(listing_id)
            .await?
            .ok_or(ComplianceError::ListingNotFound(listing_id))?;
        if actor.role == ActorRole::Vendor && actor.id != listing.vendor_id {
            return Err(ComplianceError::Forbidden("listing belongs to another vendor".into()));
        }
        listing.attach_document(url);
        self.listings.upsert(&listing).await?;
        Ok(listing)
    }

    pub async fn vendor_listings(&self, vendor_id: Uuid) -> Result<Vec<Listing>, ComplianceError> {
        Ok(self.listings.list_for_vendor(vendor_id).await?)
    }

    // ------------------------------------------------------------------
    // Availability calendar
    // ------------------------------------------------------------------

    async fn mutate_calendar<F>(&self, resource_id: Uuid, mut f: F) -> Result<Calendar, CalendarError>
    where
        F: FnMut(&mut Calendar) -> Result<(), CalendarError>,
    {
        for _ in 0..MAX_CAS_RETRIES {
            let mut calendar = match self.calendars.get(resource_id).await? {
                Some(c) => c,
                None => {
                    let c = Calendar::new(resource_id);
                    match self.calendars.insert(&c).await {
                        Ok(()) => c,
                        Err(StoreError::RevConflict) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            };
            f(&mut calendar)?;
            match self.calendars.update(&calendar).await {
                Ok(()) => return Ok(calendar),
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }

    pub async fn mark_tentative(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> Result<Calendar, CalendarError> {
        self.mutate_calendar(resource_id, |c| c.mark_tentative(date)).await
    }

    pub async fn confirm_booking_date(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> Result<Calendar, CalendarError> {
        self.mutate_calendar(resource_id, |c| c.confirm_booking(date)).await
    }

    pub async fn release_date(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> Result<Calendar, CalendarError> {
        self.mutate_calendar(resource_id, |c| {
            c.release_date(date);
            Ok(())
        })
        .await
    }

    pub async fn calendar(&self, resource_id: Uuid) -> Result<Option<Calendar>, CalendarError> {
        Ok(self.calendars.get(resource_id).await?)
    }
}

fn require_role(actor: &Principal, role: ActorRole) -> Result<(), ComplianceError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(ComplianceError::Forbidden(format!(
            "operation requires {:?}, got {:?}",
            role, actor.role
        )))
    }
}
