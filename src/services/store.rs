use futures::future::FutureExt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ServiceFuture, VenueStore};
use crate::error::MapError;
use crate::venue::{NewVenue, Venue, VenueId};

/// Venues kept as a JSON array in a single file.
/// Writes go through a temp file and a rename so a crash never leaves a
/// half-written list behind.
#[derive(Clone)]
pub struct JsonVenueStore {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonVenueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                path: path.into(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

fn persistence(context: &str, path: &Path, err: impl std::fmt::Display) -> MapError {
    MapError::PersistenceFailed(format!("{context} {}: {err}", path.display()))
}

impl StoreInner {
    async fn read_all(&self) -> Result<Vec<Venue>, MapError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(persistence("read", &self.path, e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| persistence("parse", &self.path, e))
    }

    async fn write_all(&self, venues: &[Venue]) -> Result<(), MapError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence("create", parent, e))?;
        }
        let json = serde_json::to_vec_pretty(venues).map_err(|e| persistence("encode", &self.path, e))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| persistence("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| persistence("replace", &self.path, e))
    }

    async fn create(&self, venue: NewVenue) -> Result<Venue, MapError> {
        if !venue.coordinate.is_valid() {
            return Err(MapError::InvalidCoordinate {
                lat: venue.coordinate.lat,
                lng: venue.coordinate.lng,
            });
        }
        if venue.details.name.trim().is_empty() {
            return Err(MapError::PersistenceFailed("venue name is required".to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let mut venues = self.read_all().await?;
        let venue = venue.into_venue(VenueId(uuid::Uuid::new_v4().to_string()));
        venues.push(venue.clone());
        self.write_all(&venues).await?;

        info!(id = %venue.id, name = %venue.name, "Venue stored");
        Ok(venue)
    }

    async fn delete(&self, id: VenueId) -> Result<(), MapError> {
        let _guard = self.write_lock.lock().await;
        let mut venues = self.read_all().await?;
        let before = venues.len();
        venues.retain(|v| v.id != id);
        if venues.len() == before {
            return Err(MapError::PersistenceFailed(format!("no venue with id {id}")));
        }
        self.write_all(&venues).await?;

        info!(%id, "Venue deleted");
        Ok(())
    }
}

impl VenueStore for JsonVenueStore {
    fn list_venues(&self) -> ServiceFuture<Vec<Venue>> {
        let inner = Rc::clone(&self.inner);
        async move {
            let venues = inner.read_all().await?;
            debug!(count = venues.len(), path = %inner.path.display(), "Venues loaded");
            Ok(venues)
        }
        .boxed_local()
    }

    fn create_venue(&self, venue: NewVenue) -> ServiceFuture<Venue> {
        let inner = Rc::clone(&self.inner);
        async move { inner.create(venue).await }.boxed_local()
    }

    fn delete_venue(&self, id: &VenueId) -> ServiceFuture<()> {
        let inner = Rc::clone(&self.inner);
        let id = id.clone();
        async move { inner.delete(id).await }.boxed_local()
    }
}
