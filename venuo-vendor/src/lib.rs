pub mod calendar;
pub mod compliance;
pub mod listing;
pub mod repository;
pub mod service;

pub use calendar::{Calendar, CalendarError, DayStatus};
pub use compliance::{ComplianceError, ContractAcceptance, VendorCompliance};
pub use listing::{Listing, ListingStatus};
