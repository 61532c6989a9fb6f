//! Cache region addressing.
//!
//! A region tag names a slice of the client-side read model. Tags are
//! opaque to the realtime layer: it only decides which ones went stale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::LIST_ID;

/// Entity kinds the REST data layer caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    Movie,
    QualityProfile,
    Queue,
    History,
    Activity,
    Health,
    WantedMovie,
}

impl RegionKind {
    /// Every kind, in declaration order.
    pub const ALL: [RegionKind; 7] = [
        RegionKind::Movie,
        RegionKind::QualityProfile,
        RegionKind::Queue,
        RegionKind::History,
        RegionKind::Activity,
        RegionKind::Health,
        RegionKind::WantedMovie,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::QualityProfile => "QualityProfile",
            Self::Queue => "Queue",
            Self::History => "History",
            Self::Activity => "Activity",
            Self::Health => "Health",
            Self::WantedMovie => "WantedMovie",
        }
    }
}

/// A cache region: a whole kind, or one identified slice of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheRegionTag {
    pub kind: RegionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl CacheRegionTag {
    /// The region covering every entry of `kind`.
    pub fn kind(kind: RegionKind) -> Self {
        Self { kind, id: None }
    }

    /// The region of a single entity.
    pub fn entity(kind: RegionKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
        }
    }

    /// The collection-level region (list views) of `kind`.
    pub fn list(kind: RegionKind) -> Self {
        Self::entity(kind, LIST_ID)
    }
}

impl fmt::Display for CacheRegionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{}", self.kind.as_str(), id),
            None => f.write_str(self.kind.as_str()),
        }
    }
}
