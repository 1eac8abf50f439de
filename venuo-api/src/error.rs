use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use venuo_booking::models::BookingError;
use venuo_core::StoreError;
use venuo_payments::models::PaymentError;
use venuo_request::models::RequestError;
use venuo_vendor::calendar::CalendarError;
use venuo_vendor::compliance::ComplianceError;

#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Gone(String),
    Unprocessable(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Gone(msg) => (StatusCode::GONE, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Unavailable(msg) => {
                tracing::warn!("Dependency unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable".to_string())
            }
            AppError::Internal(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            // The CAS retry budget ran out; the client should re-fetch
            // and resubmit.
            StoreError::RevConflict => AppError::Conflict("concurrent update, retry".into()),
            StoreError::Unavailable(msg) => AppError::Unavailable(msg),
            StoreError::Corrupt(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<ComplianceError> for AppError {
    fn from(err: ComplianceError) -> Self {
        match err {
            ComplianceError::VendorNotFound(_) | ComplianceError::ListingNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            ComplianceError::PublishingBlocked { .. } => AppError::Unprocessable(err.to_string()),
            ComplianceError::StaleContractVersion { .. } => AppError::Conflict(err.to_string()),
            ComplianceError::Forbidden(msg) => AppError::Forbidden(msg),
            ComplianceError::Store(e) => e.into(),
        }
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::DateUnavailable { .. } => AppError::Conflict(err.to_string()),
            CalendarError::Store(e) => e.into(),
        }
    }
}

impl From<RequestError> for AppError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RequestNotFound(_) | RequestError::OfferNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            RequestError::RequestExpired | RequestError::DeadlinePassed => {
                AppError::Gone(err.to_string())
            }
            RequestError::RequestNotOpen
            | RequestError::RequestAlreadyClosed
            | RequestError::OfferNotPending(_) => AppError::Conflict(err.to_string()),
            RequestError::VendorNotCompliant { .. } => AppError::Unprocessable(err.to_string()),
            RequestError::Forbidden(msg) => AppError::Forbidden(msg),
            RequestError::Store(e) => e.into(),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::BookingNotFound(_) | BookingError::ItemNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            BookingError::NotYourTurn { .. }
            | BookingError::StaleOfferVersion { .. }
            | BookingError::AgreementVersionMismatch { .. } => AppError::Conflict(err.to_string()),
            BookingError::ItemNotNegotiable(_) | BookingError::InvalidState(_) => {
                AppError::Unprocessable(err.to_string())
            }
            BookingError::PublishingBlocked { .. } => AppError::Unprocessable(err.to_string()),
            BookingError::Forbidden(msg) => AppError::Forbidden(msg),
            BookingError::Store(e) => e.into(),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvoiceNotFound(_)
            | PaymentError::PayoutNotFound(_)
            | PaymentError::UnknownSession(_) => AppError::NotFound(err.to_string()),
            PaymentError::InvoiceAlreadyOpen => AppError::Conflict(err.to_string()),
            PaymentError::NotCheckoutReady(_) | PaymentError::InvalidState(_) => {
                AppError::Unprocessable(err.to_string())
            }
            PaymentError::Forbidden(msg) => AppError::Forbidden(msg),
            PaymentError::Unavailable(msg) => AppError::Unavailable(msg),
            PaymentError::Store(e) => e.into(),
        }
    }
}
