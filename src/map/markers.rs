//! Incremental venue-marker synchronization.
//!
//! `sync` diffs the desired venue set against what is on the canvas by venue
//! id. Removed ids lose their marker, new ids get one, retained ids keep
//! their marker object and only have position, icon and info surface
//! refreshed. Work is proportional to the change, not the venue count.

use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

use crate::geo::Coordinate;
use crate::map::canvas::{MapCanvas, MarkerHandle, MarkerIcon, Popup, PopupAction};
use crate::venue::{Activity, Venue, VenueId, VenueSnapshot};

/// A venue marker the reconciler owns
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedMarker {
    pub venue_id: VenueId,
    pub handle: MarkerHandle,
    pub coordinate: Coordinate,
    pub icon: MarkerIcon,
}

/// Outcome of one `sync` call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub refreshed: usize,
    /// Snapshot and filter matched the previous call; nothing was touched
    pub unchanged: bool,
}

struct SyncKey {
    venues: VenueSnapshot,
    filter: Option<Activity>,
    viewer: Option<String>,
}

impl SyncKey {
    fn matches(&self, venues: &VenueSnapshot, filter: Option<Activity>, viewer: Option<&str>) -> bool {
        Rc::ptr_eq(&self.venues, venues) && self.filter == filter && self.viewer.as_deref() == viewer
    }
}

#[derive(Default)]
pub struct MarkerReconciler {
    rendered: HashMap<VenueId, RenderedMarker>,
    last: Option<SyncKey>,
}

impl MarkerReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the canvas markers in line with `venues` under `filter`.
    /// `viewer` decides whether the delete action is offered.
    pub fn sync(
        &mut self,
        canvas: &mut MapCanvas,
        venues: &VenueSnapshot,
        filter: Option<Activity>,
        viewer: Option<&str>,
    ) -> SyncReport {
        if self
            .last
            .as_ref()
            .is_some_and(|key| key.matches(venues, filter, viewer))
        {
            return SyncReport {
                unchanged: true,
                ..SyncReport::default()
            };
        }

        let desired: HashMap<&VenueId, &Venue> = venues
            .iter()
            .filter(|v| filter.map_or(true, |activity| v.offers(activity)))
            .map(|v| (&v.id, v))
            .collect();

        let mut report = SyncReport::default();

        let stale: Vec<VenueId> = self
            .rendered
            .keys()
            .filter(|id| !desired.contains_key(id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(marker) = self.rendered.remove(&id) {
                canvas.remove_marker(marker.handle);
                report.removed += 1;
            }
        }

        for (id, venue) in &desired {
            let icon = icon_for(venue);
            let popup = info_surface(venue, viewer);

            match self.rendered.get_mut(*id) {
                Some(marker) => {
                    // Content may have changed under the same id
                    canvas.set_marker_position(marker.handle, venue.coordinate);
                    canvas.set_marker_icon(marker.handle, icon);
                    canvas.set_marker_popup(marker.handle, popup);
                    marker.coordinate = venue.coordinate;
                    marker.icon = icon;
                    report.refreshed += 1;
                }
                None => {
                    let handle = canvas.add_marker(venue.coordinate, icon, false);
                    canvas.set_marker_popup(handle, popup);
                    self.rendered.insert(
                        (*id).clone(),
                        RenderedMarker {
                            venue_id: (*id).clone(),
                            handle,
                            coordinate: venue.coordinate,
                            icon,
                        },
                    );
                    report.added += 1;
                }
            }
        }

        self.last = Some(SyncKey {
            venues: Rc::clone(venues),
            filter,
            viewer: viewer.map(str::to_string),
        });

        debug!(
            added = report.added,
            removed = report.removed,
            refreshed = report.refreshed,
            "Markers reconciled"
        );
        report
    }

    /// Forget the last sync key so the next `sync` re-evaluates
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Remove every venue marker this reconciler placed
    pub fn clear(&mut self, canvas: &mut MapCanvas) {
        for (_, marker) in self.rendered.drain() {
            canvas.remove_marker(marker.handle);
        }
        self.last = None;
    }

    /// Drop bookkeeping without touching a canvas (it was destroyed)
    pub fn forget(&mut self) {
        self.rendered.clear();
        self.last = None;
    }

    pub fn rendered(&self) -> impl Iterator<Item = &RenderedMarker> + '_ {
        self.rendered.values()
    }

    pub fn marker_for(&self, id: &VenueId) -> Option<MarkerHandle> {
        self.rendered.get(id).map(|m| m.handle)
    }

    pub fn venue_for(&self, handle: MarkerHandle) -> Option<&VenueId> {
        self.rendered
            .values()
            .find(|m| m.handle == handle)
            .map(|m| &m.venue_id)
    }

    pub fn len(&self) -> usize {
        self.rendered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }
}

/// Icon for the venue's primary activity
fn icon_for(venue: &Venue) -> MarkerIcon {
    venue
        .primary_activity()
        .map(MarkerIcon::Activity)
        .unwrap_or(MarkerIcon::Venue)
}

/// Build the info surface shown when a venue marker is opened
pub fn info_surface(venue: &Venue, viewer: Option<&str>) -> Popup {
    let mut fields = vec![("Setting".to_string(), venue.setting.label().to_string())];

    let courts: Vec<String> = venue
        .courts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(activity, count)| format!("{} ×{}", activity.label(), count))
        .collect();
    fields.push((
        "Courts".to_string(),
        if courts.is_empty() {
            "none listed".to_string()
        } else {
            courts.join(", ")
        },
    ));

    fields.push((
        "Lighting".to_string(),
        if venue.lighting { "Yes" } else { "No" }.to_string(),
    ));
    fields.push(("Access".to_string(), venue.access.label().to_string()));

    let actions = if venue.is_created_by(viewer) {
        vec![PopupAction::Delete(venue.id.clone())]
    } else {
        Vec::new()
    };

    Popup {
        title: venue.name.clone(),
        subtitle: venue.address.clone(),
        fields,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::canvas::{CanvasId, SurfaceSize};
    use crate::venue::venue;

    fn canvas() -> MapCanvas {
        MapCanvas::new(
            CanvasId(1),
            "map",
            SurfaceSize::new(80, 24),
            Coordinate::new(30.2672, -97.7431),
            12.0,
        )
        .unwrap()
    }

    fn snapshot(venues: Vec<Venue>) -> VenueSnapshot {
        venues.into()
    }

    fn basketball(id: &str) -> Venue {
        venue(id, 30.2672, -97.7431, &[(Activity::Basketball, 2)])
    }

    #[test]
    fn test_diff_is_minimal() {
        let mut c = canvas();
        let mut reconciler = MarkerReconciler::new();

        let first = snapshot(vec![basketball("A"), basketball("B"), basketball("C")]);
        let report = reconciler.sync(&mut c, &first, None, None);
        assert_eq!(report.added, 3);

        let a = reconciler.marker_for(&VenueId::new("A")).unwrap();
        let b = reconciler.marker_for(&VenueId::new("B")).unwrap();
        let cc = reconciler.marker_for(&VenueId::new("C")).unwrap();

        let second = snapshot(vec![basketball("A"), basketball("C"), basketball("D")]);
        let report = reconciler.sync(&mut c, &second, None, None);

        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(reconciler.marker_for(&VenueId::new("A")), Some(a));
        assert_eq!(reconciler.marker_for(&VenueId::new("C")), Some(cc));
        assert!(reconciler.marker_for(&VenueId::new("B")).is_none());
        assert!(c.marker(b).is_none());
        assert!(reconciler.marker_for(&VenueId::new("D")).is_some());
        assert_eq!(c.marker_count(), 3);
    }

    #[test]
    fn test_same_snapshot_and_filter_is_noop() {
        let mut c = canvas();
        let mut reconciler = MarkerReconciler::new();
        let venues = snapshot(vec![basketball("A")]);

        reconciler.sync(&mut c, &venues, None, None);
        let report = reconciler.sync(&mut c, &venues, None, None);
        assert!(report.unchanged);

        // A new snapshot with equal content is a new list reference
        let copy = snapshot(venues.to_vec());
        let report = reconciler.sync(&mut c, &copy, None, None);
        assert!(!report.unchanged);
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.added, 0);
    }

    #[test]
    fn test_filter_scenario() {
        let mut c = canvas();
        let mut reconciler = MarkerReconciler::new();
        let venues = snapshot(vec![basketball("v1")]);

        reconciler.sync(&mut c, &venues, Some(Activity::Basketball), None);
        assert_eq!(reconciler.len(), 1);
        assert!(reconciler.marker_for(&VenueId::new("v1")).is_some());
        assert_eq!(c.marker_count(), 1);

        reconciler.sync(&mut c, &venues, Some(Activity::Tennis), None);
        assert!(reconciler.is_empty());
        assert_eq!(c.marker_count(), 0);
        assert!(c.is_ready());
    }

    #[test]
    fn test_retained_marker_content_is_refreshed() {
        let mut c = canvas();
        let mut reconciler = MarkerReconciler::new();
        reconciler.sync(&mut c, &snapshot(vec![basketball("A")]), None, None);
        let handle = reconciler.marker_for(&VenueId::new("A")).unwrap();

        let mut moved = venue("A", 30.3, -97.8, &[(Activity::Tennis, 3)]);
        moved.name = "Renamed".to_string();
        reconciler.sync(&mut c, &snapshot(vec![moved]), None, None);

        let marker = c.marker(handle).unwrap();
        assert_eq!(marker.position, Coordinate::new(30.3, -97.8));
        assert_eq!(marker.icon, MarkerIcon::Activity(Activity::Tennis));
        assert_eq!(marker.popup.as_ref().unwrap().title, "Renamed");
    }

    #[test]
    fn test_icon_follows_primary_activity() {
        let v = venue("A", 0.0, 0.0, &[(Activity::Tennis, 4), (Activity::Basketball, 1)]);
        assert_eq!(icon_for(&v), MarkerIcon::Activity(Activity::Tennis));
        assert_eq!(icon_for(&venue("B", 0.0, 0.0, &[])), MarkerIcon::Venue);
    }

    #[test]
    fn test_filtered_marker_keeps_primary_activity_icon() {
        let mut c = canvas();
        let mut reconciler = MarkerReconciler::new();
        let mixed = venue("A", 30.2672, -97.7431, &[(Activity::Tennis, 4), (Activity::Basketball, 1)]);

        reconciler.sync(&mut c, &snapshot(vec![mixed]), Some(Activity::Basketball), None);

        let handle = reconciler.marker_for(&VenueId::new("A")).unwrap();
        assert_eq!(c.marker(handle).unwrap().icon, MarkerIcon::Activity(Activity::Tennis));
    }

    #[test]
    fn test_delete_action_only_for_creator() {
        let mut v = basketball("A");
        v.created_by = Some("alice".to_string());

        let own = info_surface(&v, Some("alice"));
        assert_eq!(own.actions, vec![PopupAction::Delete(VenueId::new("A"))]);

        let other = info_surface(&v, Some("bob"));
        assert!(other.actions.is_empty());
        assert!(info_surface(&v, None).actions.is_empty());
    }

    #[test]
    fn test_info_surface_fields() {
        let mut v = venue("A", 0.0, 0.0, &[(Activity::Basketball, 2), (Activity::Tennis, 0)]);
        v.lighting = true;
        let popup = info_surface(&v, None);
        let courts = popup.fields.iter().find(|(k, _)| k == "Courts").unwrap();
        assert_eq!(courts.1, "Basketball ×2");
        let lighting = popup.fields.iter().find(|(k, _)| k == "Lighting").unwrap();
        assert_eq!(lighting.1, "Yes");
    }

    #[test]
    fn test_clear_removes_only_own_markers() {
        let mut c = canvas();
        let mut reconciler = MarkerReconciler::new();
        let other = c.add_marker(c.center(), MarkerIcon::Preview, true);
        reconciler.sync(&mut c, &snapshot(vec![basketball("A"), basketball("B")]), None, None);

        reconciler.clear(&mut c);
        assert_eq!(c.marker_count(), 1);
        assert!(c.marker(other).is_some());
    }

    #[test]
    fn test_venue_for_handle() {
        let mut c = canvas();
        let mut reconciler = MarkerReconciler::new();
        reconciler.sync(&mut c, &snapshot(vec![basketball("A")]), None, None);
        let handle = reconciler.marker_for(&VenueId::new("A")).unwrap();
        assert_eq!(reconciler.venue_for(handle), Some(&VenueId::new("A")));
    }
}
