pub mod expiry;
pub mod models;
pub mod repository;
pub mod service;

pub use models::{
    OfferPaymentStatus, OfferStatus, RequestError, RequestStatus, RequestThread, ServiceRequest,
    VendorOffer,
};
