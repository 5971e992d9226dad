use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::loyalty::LoyaltyError;
use crate::loyalty::ledger::LedgerError;
use crate::loyalty::store::StoreError;
use crate::pass::PassError;
use crate::wallet::WalletError;

/// Caller-visible failure. External and internal detail is logged when the
/// error is built and never reaches the response body.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Throttled { retry_after_ms: u64 },
    Exhausted(String),
    ExternalService(&'static str),
    Internal,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub code: &'static str,
    pub reason: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Exhausted(_) => StatusCode::BAD_REQUEST,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Throttled { .. } => "THROTTLED",
            Self::Exhausted(_) => "EXHAUSTED",
            Self::ExternalService(_) => "EXTERNAL_SERVICE",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Validation(reason)
            | Self::NotFound(reason)
            | Self::Conflict(reason)
            | Self::Exhausted(reason) => reason.clone(),
            Self::Throttled { retry_after_ms } => {
                format!("card is cooling down, retry in {retry_after_ms} ms")
            }
            Self::ExternalService(operation) => format!("{operation} operation failed"),
            Self::Internal => "internal error".to_string(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "ERROR",
            code: self.code(),
            reason: self.reason(),
        };
        let mut response = (self.status(), Json(body)).into_response();
        if let Self::Throttled { retry_after_ms } = self {
            let seconds = retry_after_ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Invalid(reason) => Self::Validation(reason),
            LedgerError::CodeNotFound => Self::not_found("redeem code"),
            LedgerError::ActiveCodeExists(_)
            | LedgerError::DuplicateCode
            | LedgerError::UnsupportedPurpose(_) => Self::Conflict(err.to_string()),
            LedgerError::NoRewardsAvailable => Self::Exhausted(err.to_string()),
            LedgerError::Throttled { retry_after_ms } => Self::Throttled { retry_after_ms },
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateCode => Self::Conflict(err.to_string()),
            StoreError::Corrupt(detail) => {
                tracing::error!(%detail, "Stored card data is invalid");
                Self::Internal
            }
            StoreError::Sql(source) => {
                tracing::error!(error = %source, "Database error");
                Self::Internal
            }
        }
    }
}

impl From<LoyaltyError> for AppError {
    fn from(err: LoyaltyError) -> Self {
        match err {
            LoyaltyError::CardNotFound => Self::not_found("card"),
            LoyaltyError::CodeNotFound => Self::not_found("redeem code"),
            LoyaltyError::CodeUnusable => Self::Validation(err.to_string()),
            LoyaltyError::Contended => Self::Conflict(err.to_string()),
            LoyaltyError::Ledger(inner) => inner.into(),
            LoyaltyError::Store(inner) => inner.into(),
        }
    }
}

impl From<PassError> for AppError {
    fn from(err: PassError) -> Self {
        tracing::error!(error = %err.diagnostics(), "Pass build failed");
        Self::ExternalService("pass")
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        tracing::error!(error = %err.diagnostics(), "Wallet backend failed");
        Self::ExternalService("wallet")
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{err:#}"), "Unexpected error");
        Self::Internal
    }
}
