use thiserror::Error;
use uuid::Uuid;

use crate::api::central::PeripheralId;
use crate::host::resolver::ResolveError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("bluetooth is unavailable: no adapter present or access is unauthorized")]
    AdapterUnavailable,
    #[error("no connection to {0}, have you connected first?")]
    NotConnected(PeripheralId),
    #[error("connection with {0} already exists")]
    AlreadyConnected(PeripheralId),
    #[error("error when reconnecting to {0}")]
    ReconnectFailed(PeripheralId),
    #[error("another operation is still in progress on {0}")]
    OperationInProgress(PeripheralId),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("characteristic {0} cannot notify or indicate")]
    NotifySupportNotAvailable(Uuid),
    #[error("platform rejected {0}")]
    HardwareRejected(&'static str),
    #[error("invalid uuid: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("central manager is no longer running")]
    ManagerStopped,
    #[error("central manager must be created inside a tokio runtime")]
    NoRuntime,
}

/// Coarse classification used by callers deciding whether a retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Raised before any hardware call; retrying with a corrected request can succeed.
    LocalValidation,
    /// The platform refused the call; nothing was recorded.
    HardwareRejection,
    AdapterUnavailable,
    Internal,
}

impl Error {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Error::AdapterUnavailable => ErrorType::AdapterUnavailable,
            Error::NotConnected(_)
            | Error::AlreadyConnected(_)
            | Error::ReconnectFailed(_)
            | Error::OperationInProgress(_)
            | Error::Resolve(_)
            | Error::NotifySupportNotAvailable(_)
            | Error::InvalidUuid(_) => ErrorType::LocalValidation,
            Error::HardwareRejected(_) => ErrorType::HardwareRejection,
            Error::Config(_) | Error::ManagerStopped | Error::NoRuntime => ErrorType::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let id = PeripheralId::from("AA:BB:CC:DD:EE:FF");
        assert_eq!(
            Error::OperationInProgress(id.clone()).error_type(),
            ErrorType::LocalValidation
        );
        assert_eq!(
            Error::Resolve(ResolveError::ServiceNotFound(Uuid::nil())).error_type(),
            ErrorType::LocalValidation
        );
        assert_eq!(
            Error::HardwareRejected("read_characteristic").error_type(),
            ErrorType::HardwareRejection
        );
        assert_eq!(Error::AdapterUnavailable.error_type(), ErrorType::AdapterUnavailable);
        assert_eq!(Error::ManagerStopped.error_type(), ErrorType::Internal);
    }

    #[test]
    fn messages_name_the_peripheral() {
        let id = PeripheralId::from("AA:BB:CC:DD:EE:FF");
        assert_eq!(
            Error::NotConnected(id).to_string(),
            "no connection to AA:BB:CC:DD:EE:FF, have you connected first?"
        );
    }
}
