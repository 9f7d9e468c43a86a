use thiserror::Error;

use crate::domain::ride::RideStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid ride transition from {from:?} to {to:?}")]
    InvalidRideTransition { from: RideStatus, to: RideStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use crate::domain::ride::RideStatus;
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn domain_error_wraps_into_application_error() {
        let error = ApplicationError::from(DomainError::InvalidRideTransition {
            from: RideStatus::Cancelled,
            to: RideStatus::Scheduled,
        });

        assert!(matches!(error, ApplicationError::Domain(_)));
    }

    #[test]
    fn persistence_error_carries_detail() {
        let error = ApplicationError::Persistence("database lock timeout".to_owned());
        assert_eq!(error.to_string(), "persistence failure: database lock timeout");
    }
}
