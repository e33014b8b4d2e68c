//! Cached payload shapes, one per resource class.
//!
//! Upstream responses carry many more fields than any call site reads; the
//! ones not named here are kept verbatim in `extra` so a cached payload
//! renders exactly like a fresh one.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::keys::ResourceClass;

const RATINGS_NO_DATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A payload that can be cached under a resource class.
pub trait CachedResource: Serialize + DeserializeOwned + Send + Sync + 'static {
    const CLASS: ResourceClass;

    /// Whether the payload is a private view. Only consulted for
    /// [`Scope::OwnerPrivate`](super::keys::Scope::OwnerPrivate) classes.
    fn is_private(&self) -> bool {
        false
    }

    /// TTL for this particular value, overriding the class TTL.
    fn ttl_override(&self) -> Option<Duration> {
        None
    }
}

/// Snap metadata as returned by the dashboard API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapInfo {
    pub snap_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedResource for SnapInfo {
    const CLASS: ResourceClass = ResourceClass::SnapInfo;

    fn is_private(&self) -> bool {
        self.private
    }
}

/// One released revision in a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub revision: u64,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Release history of a snap. `private` mirrors the snap's visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseHistory {
    pub releases: Vec<Release>,
    #[serde(default)]
    pub private: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedResource for ReleaseHistory {
    const CLASS: ResourceClass = ResourceClass::ReleaseHistory;

    fn is_private(&self) -> bool {
        self.private
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMember {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Members of a brand store, as visible to the requesting admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMembers {
    pub members: Vec<StoreMember>,
}

impl CachedResource for StoreMembers {
    const CLASS: ResourceClass = ResourceClass::StoreMembers;
}

/// Charm or bundle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub package_type: String,
    #[serde(default)]
    pub private: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedResource for PackageMetadata {
    const CLASS: ResourceClass = ResourceClass::PackageMetadata;

    fn is_private(&self) -> bool {
        self.private
    }
}

/// Details and outbound links shown on store cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub name: String,
    #[serde(default)]
    pub links: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedResource for ItemDetails {
    const CLASS: ResourceClass = ResourceClass::ItemDetails;
}

/// A block of snaps on the explore page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreBlock {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub snaps: Vec<Value>,
}

impl CachedResource for ExploreBlock {
    const CLASS: ResourceClass = ResourceClass::Explore;
}

/// Ratings of a snap, or the knowledge that it has too few votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapRatings {
    Rated { value: f64, count: u64 },
    InsufficientVotes,
}

impl CachedResource for SnapRatings {
    const CLASS: ResourceClass = ResourceClass::SnapRatings;

    fn ttl_override(&self) -> Option<Duration> {
        match self {
            // Keeps the ratings service from being asked again all day.
            SnapRatings::InsufficientVotes => Some(RATINGS_NO_DATA_TTL),
            SnapRatings::Rated { .. } => None,
        }
    }
}

/// Signing keys registered with a brand store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningKeys {
    pub keys: Vec<Value>,
}

impl CachedResource for SigningKeys {
    const CLASS: ResourceClass = ResourceClass::SigningKeys;
}

/// Device models registered with a brand store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreModels {
    pub models: Vec<Value>,
}

impl CachedResource for StoreModels {
    const CLASS: ResourceClass = ResourceClass::StoreModels;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubliciseTrending {
    pub trending: bool,
}

impl CachedResource for PubliciseTrending {
    const CLASS: ResourceClass = ResourceClass::Publicise;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snap_info_keeps_unknown_fields() {
        let raw = json!({
            "snap_name": "toto",
            "title": "Toto",
            "private": true,
            "media": [{"type": "icon"}],
        });
        let info: SnapInfo = serde_json::from_value(raw.clone()).expect("decodes");

        assert!(info.is_private());
        assert_eq!(info.extra.get("media"), raw.get("media"));
        assert_eq!(serde_json::to_value(&info).expect("encodes"), raw);
    }

    #[test]
    fn snap_info_private_defaults_to_false() {
        let info: SnapInfo = serde_json::from_value(json!({"snap_name": "toto"})).expect("decodes");
        assert!(!info.is_private());
    }

    #[test]
    fn ratings_sentinel_lives_for_a_day() {
        let rated = SnapRatings::Rated {
            value: 4.5,
            count: 120,
        };
        assert_eq!(rated.ttl_override(), None);
        assert_eq!(
            SnapRatings::InsufficientVotes.ttl_override(),
            Some(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn ratings_sentinel_is_tagged() {
        let encoded = serde_json::to_value(SnapRatings::InsufficientVotes).expect("encodes");
        assert_eq!(encoded, json!({"status": "insufficient_votes"}));
    }

    #[test]
    fn package_type_uses_wire_name() {
        let pkg: PackageMetadata =
            serde_json::from_value(json!({"name": "redis-k8s", "type": "charm"})).expect("decodes");
        assert_eq!(pkg.package_type, "charm");
        assert!(!pkg.is_private());
    }
}
