//! End-to-end flows over the in-memory store: compliance gating, the
//! flat request flow, and a full negotiation that runs through checkout,
//! webhook application and payout release.

use std::collections::BTreeSet;
use std::sync::Arc;
use chrono::{Duration, Utc};
use uuid::Uuid;

use venuo_booking::models::{BookingStatus, FeeBreakdown, ItemSpec, ItemStatus};
use venuo_booking::service::BookingService;
use venuo_core::identity::Principal;
use venuo_core::payment::{MockCheckoutProvider, PaymentOutcome};
use venuo_payments::models::{InvoiceStatus, InvoiceSubject, PayoutStatus};
use venuo_payments::repository::PayoutRepo;
use venuo_payments::service::{AppliedPayment, PaymentService, ReleaseOutcome};
use venuo_payments::FeePolicy;
use venuo_request::models::{OfferStatus, RequestError, RequestStatus};
use venuo_request::service::RequestService;
use venuo_store::MemoryStore;
use venuo_vendor::service::VendorService;

struct Harness {
    store: Arc<MemoryStore>,
    vendors: VendorService,
    requests: RequestService,
    bookings: BookingService,
    payments: PaymentService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let vendors = VendorService::new(store.clone(), store.clone(), store.clone());
    let requests = RequestService::new(store.clone(), store.clone());
    let bookings = BookingService::new(store.clone(), store.clone());
    let payments = PaymentService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(MockCheckoutProvider),
        FeePolicy::default(),
    );
    Harness { store, vendors, requests, bookings, payments }
}

/// Walks a vendor through all four onboarding prerequisites.
async fn onboard_vendor(h: &Harness, vendor: &Principal) {
    let admin = Principal::admin(Uuid::new_v4());
    h.vendors.record_admin_approval(&admin, vendor.id).await.unwrap();
    h.vendors
        .record_contract_acceptance(vendor, vendor.id, 3, "203.0.113.7".into())
        .await
        .unwrap();
    h.vendors.record_training_completion(&admin, vendor.id).await.unwrap();
    h.vendors
        .apply_payout_account_status(vendor.id, true, true, vec![])
        .await
        .unwrap();
}

fn catering() -> BTreeSet<String> {
    ["catering".to_string()].into()
}

#[tokio::test]
async fn offers_are_gated_on_vendor_compliance() {
    let h = harness();
    let customer = Principal::customer(Uuid::new_v4());
    let vendor = Principal::vendor(Uuid::new_v4());

    let thread = h
        .requests
        .create_request(&customer, "pat@example.test".into(), catering(), 200_000, 72)
        .await
        .unwrap();

    let err = h
        .requests
        .submit_offer(&vendor, thread.request.id, 180_000, None)
        .await
        .unwrap_err();
    match err {
        RequestError::VendorNotCompliant { missing, .. } => assert!(!missing.is_empty()),
        other => panic!("expected VendorNotCompliant, got {other:?}"),
    }

    onboard_vendor(&h, &vendor).await;
    let thread = h
        .requests
        .submit_offer(&vendor, thread.request.id, 180_000, Some("weekday rate".into()))
        .await
        .unwrap();
    assert_eq!(thread.offers.len(), 1);
}

#[tokio::test]
async fn accepting_one_offer_closes_the_request_and_ignores_siblings() {
    let h = harness();
    let customer = Principal::customer(Uuid::new_v4());
    let vendor_a = Principal::vendor(Uuid::new_v4());
    let vendor_b = Principal::vendor(Uuid::new_v4());
    onboard_vendor(&h, &vendor_a).await;
    onboard_vendor(&h, &vendor_b).await;

    let thread = h
        .requests
        .create_request(&customer, "pat@example.test".into(), catering(), 200_000, 72)
        .await
        .unwrap();
    let request_id = thread.request.id;
    h.requests.submit_offer(&vendor_a, request_id, 150_000, None).await.unwrap();
    let thread = h.requests.submit_offer(&vendor_b, request_id, 170_000, None).await.unwrap();

    let accepted_id = thread.offers[0].id;
    let sibling_id = thread.offers[1].id;
    let thread = h
        .requests
        .set_offer_status(&customer, request_id, accepted_id, OfferStatus::Accepted)
        .await
        .unwrap();

    assert_eq!(thread.request.status, RequestStatus::Closed);
    assert_eq!(thread.offer(accepted_id).unwrap().status, OfferStatus::Accepted);
    assert_eq!(thread.offer(sibling_id).unwrap().status, OfferStatus::Ignored);

    // The race loser's accept lands on a closed request.
    let err = h
        .requests
        .set_offer_status(&customer, request_id, sibling_id, OfferStatus::Accepted)
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::RequestAlreadyClosed));
}

#[tokio::test]
async fn negotiation_checkout_and_payout_run_end_to_end() {
    let h = harness();
    let customer = Principal::customer(Uuid::new_v4());
    let vendor = Principal::vendor(Uuid::new_v4());
    onboard_vendor(&h, &vendor).await;

    let event_date = (Utc::now() + Duration::days(30)).date_naive();
    let deadline = Utc::now() + Duration::hours(72);
    let booking = h
        .bookings
        .create_booking(
            &customer,
            event_date,
            deadline,
            vec![ItemSpec {
                vendor_id: vendor.id,
                service_id: Uuid::new_v4(),
                is_required: true,
                asking_price_cents: 200_000,
                breakdown: FeeBreakdown::default(),
            }],
        )
        .await
        .unwrap();
    let booking = h.bookings.submit_booking(&customer, booking.id).await.unwrap();
    let item_id = booking.items[0].id;

    // Vendor counters, customer accepts the countered version.
    let booking = h
        .bookings
        .counter_offer(&vendor, booking.id, item_id, 180_000, None, FeeBreakdown::default())
        .await
        .unwrap();
    let version = booking.items[0].current_offer_version;
    let booking = h
        .bookings
        .accept_offer(&customer, booking.id, item_id, version)
        .await
        .unwrap();
    assert!(matches!(
        booking.items[0].status,
        ItemStatus::Agreed { final_price_cents: 180_000 }
    ));
    assert_eq!(booking.status, BookingStatus::Pending);

    // Both parties sign the same agreement version.
    let agreement_version = booking.agreement.version;
    h.bookings
        .accept_agreement(&customer, booking.id, agreement_version, "198.51.100.2".into())
        .await
        .unwrap();
    let booking = h
        .bookings
        .accept_agreement(&vendor, booking.id, agreement_version, "198.51.100.9".into())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Accepted);

    // Checkout for the agreed total, then the processor webhook.
    let subject = InvoiceSubject::Booking { booking_id: booking.id };
    let (invoice, session) = h
        .payments
        .open_checkout(&customer, subject, "ok", "back")
        .await
        .unwrap();
    assert_eq!(invoice.amount_cents, 180_000);

    let applied = h
        .payments
        .apply_payment_event("evt_1", &session.session_ref, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(applied, AppliedPayment::Applied);

    // Redelivery of the same event id is a no-op.
    let replay = h
        .payments
        .apply_payment_event("evt_1", &session.session_ref, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(replay, AppliedPayment::AlreadyProcessed);

    let invoices = h.payments.invoices_for_subject(&subject).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].status, InvoiceStatus::Paid);

    // Exactly one payout, fee taken from the agreed gross.
    let payouts = h.store.list_for_vendor(vendor.id).await.unwrap();
    assert_eq!(payouts.len(), 1);
    let payout = &payouts[0];
    assert_eq!(payout.gross_cents, 180_000);
    assert_eq!(payout.platform_fee_cents + payout.vendor_net_cents, 180_000);
    assert_eq!(payout.status, PayoutStatus::Pending);

    // Payout account got disabled before release: deferred, not failed.
    h.vendors
        .apply_payout_account_status(vendor.id, true, false, vec!["identity_document".into()])
        .await
        .unwrap();
    assert_eq!(
        h.payments.release_payout(payout.id).await.unwrap(),
        ReleaseOutcome::Deferred
    );

    // Re-enabled; the background retry releases it.
    h.vendors
        .apply_payout_account_status(vendor.id, true, true, vec![])
        .await
        .unwrap();
    assert_eq!(h.payments.retry_pending_payouts().await.unwrap(), 1);
    let payout = h.store.get(payout.id).await.unwrap().unwrap();
    assert_eq!(payout.status, PayoutStatus::Paid);
    assert!(payout.released_at.is_some());
}

#[tokio::test]
async fn an_event_that_fails_to_apply_is_retried_on_redelivery() {
    let h = harness();
    let customer = Principal::customer(Uuid::new_v4());
    let vendor = Principal::vendor(Uuid::new_v4());
    onboard_vendor(&h, &vendor).await;

    let booking = h
        .bookings
        .create_booking(
            &customer,
            (Utc::now() + Duration::days(10)).date_naive(),
            Utc::now() + Duration::hours(24),
            vec![ItemSpec {
                vendor_id: vendor.id,
                service_id: Uuid::new_v4(),
                is_required: true,
                asking_price_cents: 90_000,
                breakdown: FeeBreakdown::default(),
            }],
        )
        .await
        .unwrap();
    let booking = h.bookings.submit_booking(&customer, booking.id).await.unwrap();
    let item_id = booking.items[0].id;
    let version = booking.items[0].current_offer_version;
    let booking = h
        .bookings
        .accept_offer(&vendor, booking.id, item_id, version)
        .await
        .unwrap();
    let agreement_version = booking.agreement.version;
    h.bookings
        .accept_agreement(&customer, booking.id, agreement_version, "192.0.2.1".into())
        .await
        .unwrap();
    h.bookings
        .accept_agreement(&vendor, booking.id, agreement_version, "192.0.2.2".into())
        .await
        .unwrap();

    // The processor delivers the event before the session is visible
    // here. The application fails, but the failure must not consume the
    // event id.
    let err = h
        .payments
        .apply_payment_event("evt_early", "cs_not_yet_visible", PaymentOutcome::Succeeded)
        .await
        .unwrap_err();
    assert!(matches!(err, venuo_payments::PaymentError::UnknownSession(_)));

    let subject = InvoiceSubject::Booking { booking_id: booking.id };
    let (_, session) = h
        .payments
        .open_checkout(&customer, subject, "ok", "back")
        .await
        .unwrap();

    // Redelivery of the same event id now applies in full.
    let applied = h
        .payments
        .apply_payment_event("evt_early", &session.session_ref, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(applied, AppliedPayment::Applied);

    let invoices = h.payments.invoices_for_subject(&subject).await.unwrap();
    assert_eq!(invoices[0].status, InvoiceStatus::Paid);
    let payouts = h.store.list_for_vendor(vendor.id).await.unwrap();
    assert_eq!(payouts.len(), 1);

    // A third delivery is a plain replay.
    let replay = h
        .payments
        .apply_payment_event("evt_early", &session.session_ref, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(replay, AppliedPayment::AlreadyProcessed);
    assert_eq!(h.store.list_for_vendor(vendor.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn a_late_offer_persists_the_expiry_flip() {
    let h = harness();
    let customer = Principal::customer(Uuid::new_v4());
    let vendor = Principal::vendor(Uuid::new_v4());
    onboard_vendor(&h, &vendor).await;

    // Deadline already in the past when the offer arrives.
    let thread = h
        .requests
        .create_request(&customer, "pat@example.test".into(), catering(), 200_000, -1)
        .await
        .unwrap();
    let request_id = thread.request.id;

    let err = h
        .requests
        .submit_offer(&vendor, request_id, 150_000, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::RequestExpired));

    // The rejection also committed the expiry, not just observed it.
    let stored = venuo_request::repository::RequestRepo::get(h.store.as_ref(), request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.request.status, RequestStatus::Expired);
}

#[tokio::test]
async fn a_second_checkout_for_the_same_subject_is_rejected() {
    let h = harness();
    let customer = Principal::customer(Uuid::new_v4());
    let vendor = Principal::vendor(Uuid::new_v4());
    onboard_vendor(&h, &vendor).await;

    let booking = h
        .bookings
        .create_booking(
            &customer,
            (Utc::now() + Duration::days(10)).date_naive(),
            Utc::now() + Duration::hours(24),
            vec![ItemSpec {
                vendor_id: vendor.id,
                service_id: Uuid::new_v4(),
                is_required: true,
                asking_price_cents: 90_000,
                breakdown: FeeBreakdown::default(),
            }],
        )
        .await
        .unwrap();
    let booking = h.bookings.submit_booking(&customer, booking.id).await.unwrap();
    let item_id = booking.items[0].id;
    let version = booking.items[0].current_offer_version;
    let booking = h
        .bookings
        .accept_offer(&vendor, booking.id, item_id, version)
        .await
        .unwrap();
    let agreement_version = booking.agreement.version;
    h.bookings
        .accept_agreement(&customer, booking.id, agreement_version, "192.0.2.1".into())
        .await
        .unwrap();
    h.bookings
        .accept_agreement(&vendor, booking.id, agreement_version, "192.0.2.2".into())
        .await
        .unwrap();

    let subject = InvoiceSubject::Booking { booking_id: booking.id };
    h.payments.open_checkout(&customer, subject, "ok", "back").await.unwrap();
    let err = h.payments.open_checkout(&customer, subject, "ok", "back").await.unwrap_err();
    assert!(matches!(err, venuo_payments::PaymentError::InvoiceAlreadyOpen));
}
