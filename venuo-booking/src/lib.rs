pub mod models;
pub mod repository;
pub mod service;

pub use models::{
    Agreement, Booking, BookingError, BookingStatus, BookingItem, FeeBreakdown, ItemSpec,
    ItemStatus, OfferEvent, OfferEventKind, Signoff,
};
