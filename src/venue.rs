//! Venue records as read from the persistence collaborator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::geo::Coordinate;

/// Stable id assigned by the venue store
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(pub String);

impl VenueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sports a venue can host. Declaration order breaks court-count ties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Basketball,
    Tennis,
    Pickleball,
    Volleyball,
    Soccer,
}

impl Activity {
    pub const ALL: [Activity; 5] = [
        Activity::Basketball,
        Activity::Tennis,
        Activity::Pickleball,
        Activity::Volleyball,
        Activity::Soccer,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Activity::Basketball => "Basketball",
            Activity::Tennis => "Tennis",
            Activity::Pickleball => "Pickleball",
            Activity::Volleyball => "Volleyball",
            Activity::Soccer => "Soccer",
        }
    }

    /// Cycle through `None -> Basketball -> ... -> Soccer -> None`
    pub fn next_filter(current: Option<Activity>) -> Option<Activity> {
        match current {
            None => Some(Activity::ALL[0]),
            Some(activity) => {
                let idx = Activity::ALL.iter().position(|a| *a == activity).unwrap_or(0);
                Activity::ALL.get(idx + 1).copied()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Setting {
    Indoor,
    #[default]
    Outdoor,
}

impl Setting {
    pub fn label(self) -> &'static str {
        match self {
            Setting::Indoor => "Indoor",
            Setting::Outdoor => "Outdoor",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Public,
    Private,
    Membership,
}

impl Access {
    pub fn label(self) -> &'static str {
        match self {
            Access::Public => "Public",
            Access::Private => "Private",
            Access::Membership => "Membership",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Access::Public => Access::Private,
            Access::Private => Access::Membership,
            Access::Membership => Access::Public,
        }
    }
}

/// A sports location
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub setting: Setting,
    #[serde(default)]
    pub lighting: bool,
    #[serde(default)]
    pub access: Access,
    /// Court count per activity
    #[serde(default)]
    pub courts: BTreeMap<Activity, u32>,
    /// Viewer id of whoever added the venue
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Venue {
    /// Activity with the most courts; ties go to the earlier-declared activity
    pub fn primary_activity(&self) -> Option<Activity> {
        let mut best: Option<(Activity, u32)> = None;
        for (&activity, &count) in &self.courts {
            if count == 0 {
                continue;
            }
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((activity, count)),
            }
        }
        best.map(|(activity, _)| activity)
    }

    pub fn offers(&self, activity: Activity) -> bool {
        self.courts.get(&activity).copied().unwrap_or(0) > 0
    }

    pub fn is_created_by(&self, viewer: Option<&str>) -> bool {
        matches!((self.created_by.as_deref(), viewer), (Some(owner), Some(v)) if owner == v)
    }
}

/// Immutable venue list; pointer identity marks "the list changed"
pub type VenueSnapshot = Rc<[Venue]>;

/// Attributes the user supplies when adding a venue
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueDetails {
    pub name: String,
    pub setting: Setting,
    pub lighting: bool,
    pub access: Access,
    pub courts: BTreeMap<Activity, u32>,
}

/// A venue ready to be stored, before the store assigns an id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewVenue {
    pub details: VenueDetails,
    pub coordinate: Coordinate,
    pub address: String,
    pub created_by: Option<String>,
}

impl NewVenue {
    pub fn into_venue(self, id: VenueId) -> Venue {
        Venue {
            id,
            name: self.details.name,
            address: self.address,
            coordinate: self.coordinate,
            setting: self.details.setting,
            lighting: self.details.lighting,
            access: self.details.access,
            courts: self.details.courts,
            created_by: self.created_by,
        }
    }
}

#[cfg(test)]
pub(crate) fn venue(id: &str, lat: f64, lng: f64, courts: &[(Activity, u32)]) -> Venue {
    Venue {
        id: VenueId::new(id),
        name: format!("Venue {id}"),
        address: String::new(),
        coordinate: Coordinate::new(lat, lng),
        setting: Setting::Outdoor,
        lighting: false,
        access: Access::Public,
        courts: courts.iter().copied().collect(),
        created_by: None,
    }
}
