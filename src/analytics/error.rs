use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchErrorCode {
    InvalidConfig,
    DestinationUnavailable,
    VendorCallFailed,
    Internal,
}

impl DispatchErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchErrorCode::InvalidConfig => "analytics/invalid-config",
            DispatchErrorCode::DestinationUnavailable => "analytics/destination-unavailable",
            DispatchErrorCode::VendorCallFailed => "analytics/vendor-call-failed",
            DispatchErrorCode::Internal => "analytics/internal",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchError {
    pub code: DispatchErrorCode,
    message: String,
}

impl DispatchError {
    pub fn new(code: DispatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for DispatchError {}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Outcome of handing one event to a vendor global.
pub type DeliveryResult = DispatchResult<()>;

pub fn invalid_config(message: impl Into<String>) -> DispatchError {
    DispatchError::new(DispatchErrorCode::InvalidConfig, message)
}

pub fn destination_unavailable(message: impl Into<String>) -> DispatchError {
    DispatchError::new(DispatchErrorCode::DestinationUnavailable, message)
}

pub fn vendor_call_failed(message: impl Into<String>) -> DispatchError {
    DispatchError::new(DispatchErrorCode::VendorCallFailed, message)
}

pub fn internal_error(message: impl Into<String>) -> DispatchError {
    DispatchError::new(DispatchErrorCode::Internal, message)
}
