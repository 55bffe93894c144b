//! Error taxonomy for the map subsystem.

use thiserror::Error;

/// Errors produced by the map session and its collaborators.
///
/// `Clone` because a single in-flight acquisition hands its outcome to every
/// caller that joined it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("map surface `{container}` never became ready after {attempts} attempts")]
    ResourceUnavailable { container: String, attempts: u32 },

    #[error("failed to initialize map: {0}")]
    InitializationFailed(String),

    #[error("map acquisition abandoned by release")]
    Abandoned,

    #[error("map is not ready")]
    NotReady,

    #[error("venue storage failed: {0}")]
    PersistenceFailed(String),

    #[error("address lookup failed: {0}")]
    LookupFailed(String),

    #[error("current location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("no pin has been dropped")]
    NoPendingPin,

    #[error("only the creator may delete this venue")]
    NotPermitted,
}

impl MapError {
    /// Failures that leave the session without a canvas and offer a retry.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            MapError::ResourceUnavailable { .. } | MapError::InitializationFailed(_)
        )
    }
}

/// Result alias for map operations.
pub type Result<T> = std::result::Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_failures_are_fatal() {
        let unavailable = MapError::ResourceUnavailable {
            container: "map".to_string(),
            attempts: 3,
        };
        assert!(unavailable.is_fatal_to_session());
        assert!(MapError::InitializationFailed("boom".to_string()).is_fatal_to_session());
    }

    #[test]
    fn test_local_failures_are_not_fatal() {
        assert!(!MapError::PersistenceFailed("disk".to_string()).is_fatal_to_session());
        assert!(!MapError::LookupFailed("offline".to_string()).is_fatal_to_session());
        assert!(!MapError::Abandoned.is_fatal_to_session());
    }

    #[test]
    fn test_error_messages() {
        let err = MapError::ResourceUnavailable {
            container: "venue-map".to_string(),
            attempts: 50,
        };
        assert_eq!(
            err.to_string(),
            "map surface `venue-map` never became ready after 50 attempts"
        );
    }
}
