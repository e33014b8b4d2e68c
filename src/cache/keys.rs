//! Cache key definitions.
//!
//! Defines `ResourceClass` for the namespaces, `Identity` for requesters and
//! owners, and `ScopedKey` for the public/owner key variants.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

const SEGMENT_SEPARATOR: char = ':';

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// One category of cached data, with its own key prefix and TTL policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceClass {
    /// Snap metadata shown on snap pages and the listing editor.
    SnapInfo,
    /// Release history (revisions and channel map) of a snap.
    ReleaseHistory,
    /// Members of a brand store.
    StoreMembers,
    /// Charm/bundle package metadata.
    PackageMetadata,
    /// Item and link details shown in store cards.
    ItemDetails,
    /// Explore page and recommendation blocks.
    Explore,
    /// Snap ratings from the ratings service.
    SnapRatings,
    /// Signing keys of a brand store.
    SigningKeys,
    /// Device models of a brand store.
    StoreModels,
    /// Publicise page "trending" flag.
    Publicise,
}

/// How a resource class decides between the public and owner key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Never private; always cached under the public key.
    Shared,
    /// Private when the payload says so; cached only for the resource owner.
    OwnerPrivate,
    /// Always a per-requester view fetched with the requester's credentials.
    Requester,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 10] = [
        ResourceClass::SnapInfo,
        ResourceClass::ReleaseHistory,
        ResourceClass::StoreMembers,
        ResourceClass::PackageMetadata,
        ResourceClass::ItemDetails,
        ResourceClass::Explore,
        ResourceClass::SnapRatings,
        ResourceClass::SigningKeys,
        ResourceClass::StoreModels,
        ResourceClass::Publicise,
    ];

    /// Key prefix for the class. Unique per class.
    pub const fn prefix(self) -> &'static str {
        match self {
            ResourceClass::SnapInfo => "snap_info",
            ResourceClass::ReleaseHistory => "release_history",
            ResourceClass::StoreMembers => "store_members",
            ResourceClass::PackageMetadata => "package_metadata",
            ResourceClass::ItemDetails => "item_details",
            ResourceClass::Explore => "explore",
            ResourceClass::SnapRatings => "snap_ratings",
            ResourceClass::SigningKeys => "signing_keys",
            ResourceClass::StoreModels => "store_models",
            ResourceClass::Publicise => "publicise",
        }
    }

    pub const fn scope(self) -> Scope {
        match self {
            ResourceClass::SnapInfo
            | ResourceClass::ReleaseHistory
            | ResourceClass::PackageMetadata => Scope::OwnerPrivate,
            ResourceClass::StoreMembers
            | ResourceClass::SigningKeys
            | ResourceClass::StoreModels => Scope::Requester,
            ResourceClass::ItemDetails
            | ResourceClass::Explore
            | ResourceClass::SnapRatings
            | ResourceClass::Publicise => Scope::Shared,
        }
    }

    /// Built-in TTL, used unless configuration overrides it.
    pub const fn default_ttl(self) -> Duration {
        let secs = match self {
            // Fast-changing, low sensitivity.
            ResourceClass::ItemDetails | ResourceClass::Publicise => 5 * MINUTE,
            // Changes on explicit user action.
            ResourceClass::SnapInfo
            | ResourceClass::ReleaseHistory
            | ResourceClass::PackageMetadata
            | ResourceClass::StoreMembers => 30 * MINUTE,
            // Refreshed by upstream background jobs.
            ResourceClass::Explore => HOUR,
            ResourceClass::SigningKeys | ResourceClass::StoreModels => 3 * HOUR,
            ResourceClass::SnapRatings => 6 * HOUR,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl Serialize for ResourceClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.prefix())
    }
}

#[derive(Debug, Error)]
#[error("unknown resource class `{0}`")]
pub struct UnknownClass(pub String);

impl FromStr for ResourceClass {
    type Err = UnknownClass;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace('-', "_");
        ResourceClass::ALL
            .into_iter()
            .find(|class| class.prefix() == normalized)
            .ok_or_else(|| UnknownClass(value.to_string()))
    }
}

/// Authenticated identity of a requester or of a resource owner.
///
/// Anonymous requests carry no identity at all, so an `Identity` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Returns `None` for empty input and for input with surrounding
    /// whitespace. Owner keys are derived from the exact name, so it is
    /// never normalised.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let value = value.as_ref();
        (!value.is_empty() && value.trim() == value).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cache key for one resource, either shared or bound to one owner.
///
/// Owner keys of requester-scoped classes also carry the resource's
/// generation, see [`ScopedKey::with_generation`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedKey {
    class: ResourceClass,
    resource_id: String,
    owner: Option<Identity>,
    generation: Option<u64>,
}

impl ScopedKey {
    pub fn public(class: ResourceClass, resource_id: &str) -> Self {
        Self {
            class,
            resource_id: resource_id.to_string(),
            owner: None,
            generation: None,
        }
    }

    pub fn owner(class: ResourceClass, resource_id: &str, owner: &Identity) -> Self {
        Self {
            class,
            resource_id: resource_id.to_string(),
            owner: Some(owner.clone()),
            generation: None,
        }
    }

    /// Bind an owner key to a generation of its resource. Entries written
    /// under an older generation are never read again. Public keys are
    /// returned unchanged.
    pub fn with_generation(mut self, generation: u64) -> Self {
        if self.owner.is_some() {
            self.generation = Some(generation);
        }
        self
    }

    pub fn class(&self) -> ResourceClass {
        self.class
    }

    pub fn is_public(&self) -> bool {
        self.owner.is_none()
    }

    /// Label used in logs and metrics.
    pub fn scope_label(&self) -> &'static str {
        if self.is_public() { "public" } else { "owner" }
    }

    /// Render the storage key, `class:{id}`, `class:{id}:{owner}` or
    /// `class:{id}:{owner}:{generation}`.
    ///
    /// Segments are escaped so an id containing the separator cannot alias
    /// another resource's owner key.
    pub fn render(&self) -> String {
        let mut key = String::with_capacity(
            self.class.prefix().len()
                + self.resource_id.len()
                + self.owner.as_ref().map_or(0, |owner| owner.0.len() + 1)
                + 1,
        );
        key.push_str(self.class.prefix());
        key.push(SEGMENT_SEPARATOR);
        escape_segment(&self.resource_id, &mut key);
        if let Some(owner) = &self.owner {
            key.push(SEGMENT_SEPARATOR);
            escape_segment(owner.as_str(), &mut key);
        }
        if let Some(generation) = self.generation {
            key.push(SEGMENT_SEPARATOR);
            key.push_str(&generation.to_string());
        }
        key
    }
}

impl fmt::Display for ScopedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn escape_segment(segment: &str, out: &mut String) {
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn id(value: &str) -> Identity {
        Identity::new(value).expect("non-empty identity")
    }

    #[test]
    fn prefixes_are_unique() {
        let prefixes: HashSet<_> = ResourceClass::ALL.iter().map(|c| c.prefix()).collect();
        assert_eq!(prefixes.len(), ResourceClass::ALL.len());
    }

    #[test]
    fn public_and_owner_keys_render() {
        let public = ScopedKey::public(ResourceClass::SnapInfo, "toto");
        let owner = ScopedKey::owner(ResourceClass::SnapInfo, "toto", &id("ownerA"));

        assert_eq!(public.render(), "snap_info:toto");
        assert_eq!(owner.render(), "snap_info:toto:ownerA");
        assert!(public.is_public());
        assert!(!owner.is_public());
    }

    #[test]
    fn separator_in_resource_id_cannot_alias_owner_key() {
        let crafted = ScopedKey::public(ResourceClass::SnapInfo, "toto:ownerA");
        let owner = ScopedKey::owner(ResourceClass::SnapInfo, "toto", &id("ownerA"));
        assert_ne!(crafted.render(), owner.render());
        assert_eq!(crafted.render(), "snap_info:toto%3AownerA");
    }

    #[test]
    fn escaping_is_injective_for_percent() {
        let a = ScopedKey::public(ResourceClass::Explore, "a%3Ab");
        let b = ScopedKey::public(ResourceClass::Explore, "a:b");
        assert_ne!(a.render(), b.render());
    }

    #[test]
    fn same_id_in_different_classes_differs() {
        let a = ScopedKey::public(ResourceClass::SnapInfo, "toto");
        let b = ScopedKey::public(ResourceClass::PackageMetadata, "toto");
        assert_ne!(a.render(), b.render());
    }

    #[test]
    fn identity_rejects_blank() {
        assert!(Identity::new("").is_none());
        assert!(Identity::new("   ").is_none());
        assert_eq!(id("ownerA").as_str(), "ownerA");
    }

    #[test]
    fn identity_rejects_surrounding_whitespace() {
        assert!(Identity::new(" ownerA").is_none());
        assert!(Identity::new("ownerA\n").is_none());
        assert!(Identity::new("owner A").is_some());
    }

    #[test]
    fn generation_binds_owner_keys_only() {
        let public = ScopedKey::public(ResourceClass::StoreMembers, "brand").with_generation(7);
        let owner =
            ScopedKey::owner(ResourceClass::StoreMembers, "brand", &id("admin")).with_generation(7);

        assert_eq!(public.render(), "store_members:brand");
        assert_eq!(owner.render(), "store_members:brand:admin:7");
        assert_ne!(
            owner.render(),
            ScopedKey::owner(ResourceClass::StoreMembers, "brand", &id("admin"))
                .with_generation(8)
                .render()
        );
    }

    #[test]
    fn class_parses_from_prefix_and_kebab_case() {
        assert_eq!(
            "snap_info".parse::<ResourceClass>().ok(),
            Some(ResourceClass::SnapInfo)
        );
        assert_eq!(
            "store-members".parse::<ResourceClass>().ok(),
            Some(ResourceClass::StoreMembers)
        );
        assert!("snaps".parse::<ResourceClass>().is_err());
    }

    #[test]
    fn ttl_tiers_are_ordered() {
        assert!(ResourceClass::ItemDetails.default_ttl() < ResourceClass::SnapInfo.default_ttl());
        assert!(ResourceClass::SnapInfo.default_ttl() < ResourceClass::SnapRatings.default_ttl());
    }
}
