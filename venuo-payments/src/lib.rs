pub mod fees;
pub mod models;
pub mod repository;
pub mod service;

pub use fees::FeePolicy;
pub use models::{
    Invoice, InvoiceStatus, InvoiceSubject, PaymentError, PaymentEventRecord, Payout, PayoutStatus,
};
pub use service::{AppliedPayment, PaymentService, ReleaseOutcome};
