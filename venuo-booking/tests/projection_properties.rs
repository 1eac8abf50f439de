use chrono::{Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;
use venuo_booking::models::{Booking, BookingStatus, FeeBreakdown, ItemSpec};
use venuo_core::identity::{ActorRole, Principal};

#[derive(Debug, Clone)]
enum Op {
    Counter { item: usize, vendor_side: bool, price_cents: i64 },
    Accept { item: usize, vendor_side: bool, version: u32 },
    Decline { item: usize, vendor_side: bool },
    Sign { vendor_side: bool, version: u32 },
}

fn op_strategy(items: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..items, any::<bool>(), 1_000i64..500_000).prop_map(|(item, vendor_side, price_cents)| {
            Op::Counter { item, vendor_side, price_cents }
        }),
        (0..items, any::<bool>(), 1u32..12).prop_map(|(item, vendor_side, version)| {
            Op::Accept { item, vendor_side, version }
        }),
        (0..items, any::<bool>()).prop_map(|(item, vendor_side)| Op::Decline { item, vendor_side }),
        (any::<bool>(), 1u32..30).prop_map(|(vendor_side, version)| Op::Sign { vendor_side, version }),
    ]
}

fn fresh_booking(required: &[bool]) -> Booking {
    let customer = Principal::customer(Uuid::new_v4());
    let specs = required
        .iter()
        .map(|&is_required| ItemSpec {
            vendor_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            is_required,
            asking_price_cents: 100_000,
            breakdown: FeeBreakdown::default(),
        })
        .collect();
    let mut booking =
        Booking::create(&customer, "2026-11-21".parse().unwrap(), Utc::now() + Duration::days(14), specs);
    booking.submit(&customer).unwrap();
    booking
}

fn role(vendor_side: bool) -> ActorRole {
    if vendor_side {
        ActorRole::Vendor
    } else {
        ActorRole::Customer
    }
}

/// The acceptance rule restated independently of the projection code
/// under test.
fn accepted_invariant_holds(booking: &Booking) -> bool {
    let all_required_agreed =
        booking.items.iter().filter(|i| i.is_required).all(|i| i.status.is_agreed());
    let both_signed = booking.agreement.both_accepted();
    (booking.status == BookingStatus::Accepted) == (all_required_agreed && both_signed)
}

proptest! {
    #[test]
    fn aggregation_invariant_under_random_interleavings(
        ops in proptest::collection::vec(op_strategy(3), 1..60)
    ) {
        let mut booking = fresh_booking(&[true, true, false]);
        let now = Utc::now();

        for op in ops {
            // Illegal transitions are rejected; legal ones commit. Either
            // way the aggregation rule must hold afterwards.
            let _ = match op {
                Op::Counter { item, vendor_side, price_cents } => {
                    let item_id = booking.items[item].id;
                    booking
                        .counter_offer(
                            item_id,
                            role(vendor_side),
                            price_cents,
                            None,
                            FeeBreakdown::default(),
                            now,
                        )
                        .map(|_| ())
                }
                Op::Accept { item, vendor_side, version } => {
                    let item_id = booking.items[item].id;
                    booking.accept_offer(item_id, role(vendor_side), version, now).map(|_| ())
                }
                Op::Decline { item, vendor_side } => {
                    let item_id = booking.items[item].id;
                    booking.decline_offer(item_id, role(vendor_side), None, now)
                }
                Op::Sign { vendor_side, version } => booking.accept_agreement(
                    role(vendor_side),
                    version,
                    "192.0.2.1".into(),
                    now,
                ),
            };
            prop_assert!(accepted_invariant_holds(&booking));
        }

        // Offer-event versions per item are strictly increasing by one.
        for item in &booking.items {
            let versions: Vec<u32> = booking
                .events
                .iter()
                .filter(|e| e.booking_item_id == item.id)
                .map(|e| e.offer_version)
                .collect();
            for (i, window) in versions.windows(2).enumerate() {
                prop_assert_eq!(window[1], window[0] + 1, "item event {} out of order", i);
            }
        }
    }

    #[test]
    fn two_counters_in_a_row_always_fail(
        vendor_first in any::<bool>(),
        prices in proptest::collection::vec(1_000i64..500_000, 2)
    ) {
        let mut booking = fresh_booking(&[true]);
        let item_id = booking.items[0].id;
        let now = Utc::now();

        // The customer holds the opening proposal, so a vendor counter is
        // always legal first; a customer-first counter never is.
        let first = role(vendor_first);
        let first_result = booking.counter_offer(
            item_id, first, prices[0], None, FeeBreakdown::default(), now,
        ).map(|_| ());
        prop_assert_eq!(first_result.is_ok(), vendor_first);

        if vendor_first {
            let second = booking.counter_offer(
                item_id, first, prices[1], None, FeeBreakdown::default(), now,
            );
            let err = second.unwrap_err();
            prop_assert!(
                matches!(err, venuo_booking::models::BookingError::NotYourTurn { .. }),
                "expected NotYourTurn, got {:?}",
                err
            );
        }
    }
}
