//! Snapfront Cache System
//!
//! Request-scoped caching for storefront and publisher-dashboard data:
//!
//! - **CacheStore**: namespaced key/value store over Redis with an in-process
//!   fallback while Redis is unreachable
//! - **CacheKeyPolicy**: per resource class key derivation, public/owner
//!   scoping, TTLs and invalidation
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `snapfront.toml`:
//!
//! ```toml
//! [cache]
//! namespace = "snapfront"
//! maxsize = 1000
//! ttl = 300
//! redis_url = "redis://127.0.0.1:6379/"
//!
//! [cache.class_ttl]
//! snap_info = 600
//! ```

mod backend;
mod config;
mod fallback;
mod keys;
mod lock;
mod policy;
mod resources;
mod store;

pub use backend::{BackendError, PrimaryBackend, RedisBackend};
pub use config::CacheConfig;
pub use fallback::FallbackStore;
pub use keys::{Identity, ResourceClass, Scope, ScopedKey, UnknownClass};
pub use policy::{
    CacheKeyPolicy, CachePolicies, Fetched, Placement, invalidation_keys, placement, read_keys,
};
pub use resources::{
    CachedResource, ExploreBlock, ItemDetails, PackageMetadata, PubliciseTrending, Release,
    ReleaseHistory, SigningKeys, SnapInfo, SnapRatings, StoreMember, StoreMembers, StoreModels,
};
pub use store::CacheStore;
