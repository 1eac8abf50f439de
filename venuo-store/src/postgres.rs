//! Postgres-backed repositories. Aggregates are stored as jsonb
//! documents with a handful of derived columns for querying; `update`
//! compiles to `... WHERE id = $1 AND rev = $2`, so a lost race surfaces
//! as `StoreError::RevConflict` exactly like the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use venuo_booking::models::Booking;
use venuo_booking::repository::BookingRepo;
use venuo_core::{StoreError, StoreResult};
use venuo_payments::models::{Invoice, PaymentEventRecord, Payout};
use venuo_payments::repository::{InvoiceRepo, PaymentEventRepo, PayoutRepo};
use venuo_request::models::RequestThread;
use venuo_request::repository::RequestRepo;
use venuo_vendor::calendar::Calendar;
use venuo_vendor::compliance::VendorCompliance;
use venuo_vendor::listing::Listing;
use venuo_vendor::repository::{CalendarRepo, ComplianceRepo, ListingRepo};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode<T: DeserializeOwned>(doc: serde_json::Value) -> StoreResult<T> {
    serde_json::from_value(doc).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<sqlx::postgres::PgRow>) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| decode(row.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
        .collect()
}

/// Serde rename of a status enum, used for the derived status column.
fn status_str<T: Serialize>(status: &T) -> StoreResult<String> {
    match encode(status)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::Corrupt(format!("non-string status: {other}"))),
    }
}

#[async_trait]
impl ComplianceRepo for PgStore {
    async fn insert(&self, record: &VendorCompliance) -> StoreResult<()> {
        let res = sqlx::query(
            "INSERT INTO vendor_compliance (vendor_id, doc, rev) VALUES ($1, $2, $3) \
             ON CONFLICT (vendor_id) DO NOTHING",
        )
        .bind(record.vendor_id)
        .bind(encode(record)?)
        .bind(record.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn get(&self, vendor_id: Uuid) -> StoreResult<Option<VendorCompliance>> {
        let row = sqlx::query("SELECT doc FROM vendor_compliance WHERE vendor_id = $1")
            .bind(vendor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn update(&self, record: &VendorCompliance) -> StoreResult<()> {
        let res = sqlx::query(
            "UPDATE vendor_compliance SET doc = $2, rev = rev + 1 \
             WHERE vendor_id = $1 AND rev = $3",
        )
        .bind(record.vendor_id)
        .bind(encode(record)?)
        .bind(record.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarRepo for PgStore {
    async fn insert(&self, calendar: &Calendar) -> StoreResult<()> {
        let res = sqlx::query(
            "INSERT INTO calendars (resource_id, doc, rev) VALUES ($1, $2, $3) \
             ON CONFLICT (resource_id) DO NOTHING",
        )
        .bind(calendar.resource_id)
        .bind(encode(calendar)?)
        .bind(calendar.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn get(&self, resource_id: Uuid) -> StoreResult<Option<Calendar>> {
        let row = sqlx::query("SELECT doc FROM calendars WHERE resource_id = $1")
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn update(&self, calendar: &Calendar) -> StoreResult<()> {
        let res = sqlx::query(
            "UPDATE calendars SET doc = $2, rev = rev + 1 WHERE resource_id = $1 AND rev = $3",
        )
        .bind(calendar.resource_id)
        .bind(encode(calendar)?)
        .bind(calendar.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }
}

#[async_trait]
impl ListingRepo for PgStore {
    async fn upsert(&self, listing: &Listing) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO listings (id, vendor_id, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(listing.id)
        .bind(listing.vendor_id)
        .bind(encode(listing)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        let row = sqlx::query("SELECT doc FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Listing>> {
        let rows = sqlx::query("SELECT doc FROM listings WHERE vendor_id = $1")
            .bind(vendor_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_rows(rows)
    }
}

#[async_trait]
impl RequestRepo for PgStore {
    async fn insert(&self, thread: &RequestThread) -> StoreResult<()> {
        let res = sqlx::query(
            "INSERT INTO request_threads (id, customer_id, status, expires_at, doc, rev) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
        )
        .bind(thread.request.id)
        .bind(thread.request.customer_id)
        .bind(status_str(&thread.request.status)?)
        .bind(thread.request.expires_at)
        .bind(encode(thread)?)
        .bind(thread.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> StoreResult<Option<RequestThread>> {
        let row = sqlx::query("SELECT doc FROM request_threads WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn update(&self, thread: &RequestThread) -> StoreResult<()> {
        let res = sqlx::query(
            "UPDATE request_threads SET status = $2, expires_at = $3, doc = $4, rev = rev + 1 \
             WHERE id = $1 AND rev = $5",
        )
        .bind(thread.request.id)
        .bind(status_str(&thread.request.status)?)
        .bind(thread.request.expires_at)
        .bind(encode(thread)?)
        .bind(thread.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<RequestThread>> {
        let rows = sqlx::query("SELECT doc FROM request_threads WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_rows(rows)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM request_threads WHERE status = 'OPEN' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|r| r.try_get::<Uuid, _>("id").map_err(db_err))
            .collect()
    }
}

#[async_trait]
impl BookingRepo for PgStore {
    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        let res = sqlx::query(
            "INSERT INTO bookings (id, customer_id, status, negotiation_deadline, doc, rev) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
        )
        .bind(booking.id)
        .bind(booking.customer_id)
        .bind(status_str(&booking.status)?)
        .bind(booking.negotiation_deadline)
        .bind(encode(booking)?)
        .bind(booking.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query("SELECT doc FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn update(&self, booking: &Booking) -> StoreResult<()> {
        let res = sqlx::query(
            "UPDATE bookings SET status = $2, doc = $3, rev = rev + 1 \
             WHERE id = $1 AND rev = $4",
        )
        .bind(booking.id)
        .bind(status_str(&booking.status)?)
        .bind(encode(booking)?)
        .bind(booking.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query("SELECT doc FROM bookings WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_rows(rows)
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Booking>> {
        // Item vendor ids live inside the document; uuids serialize as
        // json strings, so containment does the membership test.
        let rows = sqlx::query(
            "SELECT doc FROM bookings WHERE doc->'items' @> \
             jsonb_build_array(jsonb_build_object('vendor_id', $1::text))",
        )
        .bind(vendor_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        decode_rows(rows)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM bookings \
             WHERE status IN ('PENDING', 'PARTIALLY_ACCEPTED') AND negotiation_deadline <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|r| r.try_get::<Uuid, _>("id").map_err(db_err))
            .collect()
    }
}

#[async_trait]
impl InvoiceRepo for PgStore {
    async fn insert(&self, invoice: &Invoice) -> StoreResult<()> {
        // The insert races against other checkouts for the same subject;
        // the partial unique index on (subject_key) where not void makes
        // exactly one of them win.
        let res = sqlx::query(
            "INSERT INTO invoices (id, subject_key, session_ref, status, doc, rev) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT DO NOTHING",
        )
        .bind(invoice.id)
        .bind(invoice.subject.key())
        .bind(invoice.session_ref.as_deref())
        .bind(status_str(&invoice.status)?)
        .bind(encode(invoice)?)
        .bind(invoice.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn get(&self, invoice_id: Uuid) -> StoreResult<Option<Invoice>> {
        let row = sqlx::query("SELECT doc FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn update(&self, invoice: &Invoice) -> StoreResult<()> {
        let res = sqlx::query(
            "UPDATE invoices SET status = $2, doc = $3, rev = rev + 1 \
             WHERE id = $1 AND rev = $4",
        )
        .bind(invoice.id)
        .bind(status_str(&invoice.status)?)
        .bind(encode(invoice)?)
        .bind(invoice.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn find_by_session(&self, session_ref: &str) -> StoreResult<Option<Invoice>> {
        let row = sqlx::query("SELECT doc FROM invoices WHERE session_ref = $1")
            .bind(session_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn list_for_subject(&self, subject_key: &str) -> StoreResult<Vec<Invoice>> {
        let rows = sqlx::query("SELECT doc FROM invoices WHERE subject_key = $1")
            .bind(subject_key)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_rows(rows)
    }
}

#[async_trait]
impl PayoutRepo for PgStore {
    async fn insert(&self, payout: &Payout) -> StoreResult<()> {
        let res = sqlx::query(
            "INSERT INTO payouts (id, vendor_id, status, doc, rev) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
        )
        .bind(payout.id)
        .bind(payout.vendor_id)
        .bind(status_str(&payout.status)?)
        .bind(encode(payout)?)
        .bind(payout.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn get(&self, payout_id: Uuid) -> StoreResult<Option<Payout>> {
        let row = sqlx::query("SELECT doc FROM payouts WHERE id = $1")
            .bind(payout_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn update(&self, payout: &Payout) -> StoreResult<()> {
        let res = sqlx::query(
            "UPDATE payouts SET status = $2, doc = $3, rev = rev + 1 \
             WHERE id = $1 AND rev = $4",
        )
        .bind(payout.id)
        .bind(status_str(&payout.status)?)
        .bind(encode(payout)?)
        .bind(payout.rev as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::RevConflict);
        }
        Ok(())
    }

    async fn list_pending(&self) -> StoreResult<Vec<Payout>> {
        let rows = sqlx::query("SELECT doc FROM payouts WHERE status = 'PENDING'")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_rows(rows)
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Payout>> {
        let rows = sqlx::query("SELECT doc FROM payouts WHERE vendor_id = $1")
            .bind(vendor_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_rows(rows)
    }

    async fn list_for_invoice(&self, invoice_id: Uuid) -> StoreResult<Vec<Payout>> {
        let rows = sqlx::query("SELECT doc FROM payouts WHERE doc->>'invoice_id' = $1")
            .bind(invoice_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_rows(rows)
    }
}

#[async_trait]
impl PaymentEventRepo for PgStore {
    async fn insert_if_absent(&self, record: &PaymentEventRecord) -> StoreResult<bool> {
        let res = sqlx::query(
            "INSERT INTO payment_events (external_event_id, doc) VALUES ($1, $2) \
             ON CONFLICT (external_event_id) DO NOTHING",
        )
        .bind(&record.external_event_id)
        .bind(encode(record)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn get(&self, external_event_id: &str) -> StoreResult<Option<PaymentEventRecord>> {
        let row = sqlx::query("SELECT doc FROM payment_events WHERE external_event_id = $1")
            .bind(external_event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| decode(r.try_get::<serde_json::Value, _>("doc").map_err(db_err)?))
            .transpose()
    }

    async fn remove(&self, external_event_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM payment_events WHERE external_event_id = $1")
            .bind(external_event_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
