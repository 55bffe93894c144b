use futures::future::{self, FutureExt};

use super::{Geolocation, ServiceFuture};
use crate::error::MapError;
use crate::geo::Coordinate;

/// Reports the home location from configuration.
/// A terminal has no positioning hardware, so this is the whole story.
#[derive(Clone, Debug, Default)]
pub struct ConfiguredLocation {
    home: Option<Coordinate>,
}

impl ConfiguredLocation {
    pub fn new(home: Option<Coordinate>) -> Self {
        Self { home }
    }
}

impl Geolocation for ConfiguredLocation {
    fn current_position(&self) -> ServiceFuture<Coordinate> {
        let result = match self.home {
            Some(home) => Coordinate::checked(home.lat, home.lng)
                .map_err(|e| MapError::LocationUnavailable(e.to_string())),
            None => Err(MapError::LocationUnavailable(
                "no home location configured".to_string(),
            )),
        };
        future::ready(result).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_home_is_reported() {
        let location = ConfiguredLocation::new(Some(Coordinate::new(30.2672, -97.7431)));
        assert_eq!(
            location.current_position().await,
            Ok(Coordinate::new(30.2672, -97.7431))
        );
    }

    #[tokio::test]
    async fn test_missing_or_bad_home_fails() {
        let missing = ConfiguredLocation::default();
        assert!(matches!(
            missing.current_position().await,
            Err(MapError::LocationUnavailable(_))
        ));

        let bad = ConfiguredLocation::new(Some(Coordinate::new(123.0, 0.0)));
        assert!(matches!(
            bad.current_position().await,
            Err(MapError::LocationUnavailable(_))
        ));
    }
}
