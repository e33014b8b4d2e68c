//! Key derivation, scoping and invalidation per resource class.
//!
//! Every call site goes through `CacheKeyPolicy`, so the public/owner rules
//! live here and nowhere else:
//!
//! - Reads try the public key, then the requester's own owner key. A requester
//!   can only ever derive their own owner key.
//! - Writes place a value with [`placement`]; a private view is cached only
//!   for its owner, and never under the public key.
//! - Invalidation removes the public key and, when the actor is known, the
//!   actor's owner key. Requester-scoped classes keep one view per requester,
//!   so their invalidation instead moves the resource to a new generation,
//!   which retires every requester's view at once.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::config::CacheConfig;
use super::keys::{Identity, ResourceClass, Scope, ScopedKey};
use super::resources::{
    CachedResource, ExploreBlock, ItemDetails, PackageMetadata, PubliciseTrending, ReleaseHistory,
    SigningKeys, SnapInfo, SnapRatings, StoreMembers, StoreModels,
};
use super::store::CacheStore;

const METRIC_CACHE_HIT_TOTAL: &str = "snapfront_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "snapfront_cache_miss_total";
const METRIC_CACHE_WRITE_TOTAL: &str = "snapfront_cache_write_total";

/// Where a freshly fetched value may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<'a> {
    /// Shared slot, readable by anyone.
    Public,
    /// Slot only the given requester can derive.
    Owner(&'a Identity),
    /// Not cached at all.
    Skip,
}

/// Decide the slot for a value from the class scope, the payload's private
/// flag and who is asking.
///
/// `owner` is the resource owner as reported by upstream, not something the
/// requester claims.
pub fn placement<'a>(
    scope: Scope,
    is_private: bool,
    requester: Option<&'a Identity>,
    owner: Option<&Identity>,
) -> Placement<'a> {
    match scope {
        Scope::Shared => Placement::Public,
        Scope::Requester => requester.map_or(Placement::Skip, Placement::Owner),
        Scope::OwnerPrivate if !is_private => Placement::Public,
        Scope::OwnerPrivate => match (requester, owner) {
            (Some(requester), Some(owner)) if requester == owner => Placement::Owner(requester),
            _ => Placement::Skip,
        },
    }
}

/// Keys a read consults, in order. Mirrors [`placement`]: a slot the write
/// path can never fill for this requester is not looked up.
///
/// For requester-scoped classes the owner key still has to be bound to the
/// resource's current generation; [`CachePolicies::lookup_keys`] does that.
pub fn read_keys(
    class: ResourceClass,
    resource_id: &str,
    requester: Option<&Identity>,
) -> Vec<ScopedKey> {
    let scope = class.scope();
    let mut keys = Vec::with_capacity(2);
    if scope != Scope::Requester {
        keys.push(ScopedKey::public(class, resource_id));
    }
    if let Some(requester) = requester.filter(|_| scope != Scope::Shared) {
        keys.push(ScopedKey::owner(class, resource_id, requester));
    }
    keys
}

async fn read_scoped<T: DeserializeOwned>(
    store: &CacheStore,
    class: ResourceClass,
    resource_id: &str,
    requester: Option<&Identity>,
) -> Option<T> {
    for key in lookup_keys(store, class, resource_id, requester).await {
        if let Some(value) = store.get::<T>(&key.render()).await {
            debug!(class = %class, scope = key.scope_label(), outcome = "hit", "cache hit");
            counter!(
                METRIC_CACHE_HIT_TOTAL,
                "class" => class.prefix(),
                "scope" => key.scope_label()
            )
            .increment(1);
            return Some(value);
        }
    }

    debug!(class = %class, outcome = "miss", "cache miss");
    counter!(METRIC_CACHE_MISS_TOTAL, "class" => class.prefix()).increment(1);
    None
}

/// Keys an invalidation touches: the public key and, when a requester is
/// given, their owner key. Unlike [`read_keys`] this ignores the class scope,
/// so entries left behind by an earlier scoping are dropped too.
///
/// For requester-scoped classes only the public key is returned. It holds the
/// resource's generation, which invalidation advances instead of deleting.
pub fn invalidation_keys(
    class: ResourceClass,
    resource_id: &str,
    requester: Option<&Identity>,
) -> Vec<ScopedKey> {
    let mut keys = vec![ScopedKey::public(class, resource_id)];
    if class.scope() == Scope::Requester {
        return keys;
    }
    if let Some(requester) = requester {
        keys.push(ScopedKey::owner(class, resource_id, requester));
    }
    keys
}

/// [`read_keys`] with owner keys bound to the current generation.
async fn lookup_keys(
    store: &CacheStore,
    class: ResourceClass,
    resource_id: &str,
    requester: Option<&Identity>,
) -> Vec<ScopedKey> {
    let keys = read_keys(class, resource_id, requester);
    if class.scope() != Scope::Requester || keys.is_empty() {
        return keys;
    }
    let generation = current_generation(store, class, resource_id).await;
    keys.into_iter()
        .map(|key| key.with_generation(generation))
        .collect()
}

/// Generation of a requester-scoped resource, kept under its public key.
/// Zero until the resource is first invalidated.
async fn current_generation(store: &CacheStore, class: ResourceClass, resource_id: &str) -> u64 {
    store
        .get::<u64>(&ScopedKey::public(class, resource_id).render())
        .await
        .unwrap_or(0)
}

// Generations are wall-clock milliseconds, bumped past the previous value, so
// one that expired and restarted at zero is never reached again by counting.
async fn advance_generation(
    store: &CacheStore,
    class: ResourceClass,
    resource_id: &str,
    ttl: Duration,
) {
    let previous = current_generation(store, class, resource_id).await;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    let next = now.max(previous.saturating_add(1));
    store
        .set_with_ttl(&ScopedKey::public(class, resource_id).render(), &next, ttl)
        .await;
    debug!(class = %class, generation = next, "requester views retired");
}

// `ttl` bounds the generation key's lifetime; it must cover the entries it
// retires, so callers pass the class TTL.
async fn invalidate_scoped(
    store: &CacheStore,
    class: ResourceClass,
    resource_id: &str,
    requester: Option<&Identity>,
    ttl: Duration,
) {
    if class.scope() == Scope::Requester {
        advance_generation(store, class, resource_id, ttl).await;
        return;
    }
    for key in invalidation_keys(class, resource_id, requester) {
        store.delete(&key.render()).await;
    }
}

/// A value fetched from upstream together with the resource owner upstream
/// reported for it.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub owner: Option<Identity>,
}

impl<T> Fetched<T> {
    pub fn new(value: T, owner: Option<Identity>) -> Self {
        Self { value, owner }
    }

    /// A value with no owner, e.g. from a public endpoint.
    pub fn public(value: T) -> Self {
        Self { value, owner: None }
    }
}

/// Cache access for one resource class.
pub struct CacheKeyPolicy<T> {
    store: Arc<CacheStore>,
    ttl: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheKeyPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
            _payload: PhantomData,
        }
    }
}

impl<T: CachedResource> CacheKeyPolicy<T> {
    pub fn new(store: Arc<CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            _payload: PhantomData,
        }
    }

    /// Policy using the configured TTL for `T`'s class.
    pub fn from_config(store: Arc<CacheStore>, config: &CacheConfig) -> Self {
        Self::new(store, config.class_ttl(T::CLASS))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `resource_id` as visible to `requester`, if any.
    #[instrument(skip_all, fields(class = T::CLASS.prefix(), resource_id = %resource_id))]
    pub async fn read(&self, resource_id: &str, requester: Option<&Identity>) -> Option<T> {
        read_scoped(&self.store, T::CLASS, resource_id, requester).await
    }

    /// Cache a value fetched on behalf of `requester`. `owner` is the owner of
    /// the resource as reported by upstream.
    #[instrument(skip_all, fields(class = T::CLASS.prefix(), resource_id = %resource_id))]
    pub async fn write(
        &self,
        resource_id: &str,
        value: &T,
        requester: Option<&Identity>,
        owner: Option<&Identity>,
    ) {
        let scope = T::CLASS.scope();
        let is_private = scope == Scope::OwnerPrivate && value.is_private();
        if is_private {
            // The resource is private now; a shared entry from before is stale.
            self.store
                .delete(&ScopedKey::public(T::CLASS, resource_id).render())
                .await;
        }

        let key = match placement(scope, is_private, requester, owner) {
            Placement::Public => ScopedKey::public(T::CLASS, resource_id),
            Placement::Owner(identity) if scope == Scope::Requester => {
                let generation = current_generation(&self.store, T::CLASS, resource_id).await;
                ScopedKey::owner(T::CLASS, resource_id, identity).with_generation(generation)
            }
            Placement::Owner(identity) => ScopedKey::owner(T::CLASS, resource_id, identity),
            Placement::Skip => {
                debug!(outcome = "skipped", "view not cacheable for this requester");
                counter!(
                    METRIC_CACHE_WRITE_TOTAL,
                    "class" => T::CLASS.prefix(),
                    "scope" => "skipped"
                )
                .increment(1);
                return;
            }
        };

        let ttl = value.ttl_override().unwrap_or(self.ttl);
        self.store.set_with_ttl(&key.render(), value, ttl).await;
        counter!(
            METRIC_CACHE_WRITE_TOTAL,
            "class" => T::CLASS.prefix(),
            "scope" => key.scope_label()
        )
        .increment(1);
    }

    /// Drop cached entries after a mutation by `requester`.
    #[instrument(skip_all, fields(class = T::CLASS.prefix(), resource_id = %resource_id))]
    pub async fn invalidate(&self, resource_id: &str, requester: Option<&Identity>) {
        invalidate_scoped(&self.store, T::CLASS, resource_id, requester, self.ttl).await;
    }

    /// Read, or on a miss run `fetch` and cache its result.
    ///
    /// Upstream errors are returned unchanged and nothing is cached.
    pub async fn fetch_through<F, Fut, E>(
        &self,
        resource_id: &str,
        requester: Option<&Identity>,
        fetch: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Fetched<T>, E>>,
    {
        if let Some(cached) = self.read(resource_id, requester).await {
            return Ok(cached);
        }

        let fetched = fetch().await?;
        self.write(
            resource_id,
            &fetched.value,
            requester,
            fetched.owner.as_ref(),
        )
        .await;
        Ok(fetched.value)
    }
}

/// One policy per resource class over a shared store.
///
/// Built once at startup and handed to whatever serves requests.
#[derive(Clone)]
pub struct CachePolicies {
    store: Arc<CacheStore>,
    pub snap_info: CacheKeyPolicy<SnapInfo>,
    pub release_history: CacheKeyPolicy<ReleaseHistory>,
    pub store_members: CacheKeyPolicy<StoreMembers>,
    pub package_metadata: CacheKeyPolicy<PackageMetadata>,
    pub item_details: CacheKeyPolicy<ItemDetails>,
    pub explore: CacheKeyPolicy<ExploreBlock>,
    pub snap_ratings: CacheKeyPolicy<SnapRatings>,
    pub signing_keys: CacheKeyPolicy<SigningKeys>,
    pub store_models: CacheKeyPolicy<StoreModels>,
    pub publicise: CacheKeyPolicy<PubliciseTrending>,
}

impl CachePolicies {
    pub fn new(store: Arc<CacheStore>, config: &CacheConfig) -> Self {
        Self {
            snap_info: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            release_history: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            store_members: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            package_metadata: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            item_details: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            explore: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            snap_ratings: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            signing_keys: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            store_models: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            publicise: CacheKeyPolicy::from_config(Arc::clone(&store), config),
            store,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Invalidate by class name, for callers that only know the class at runtime.
    pub async fn invalidate(
        &self,
        class: ResourceClass,
        resource_id: &str,
        requester: Option<&Identity>,
    ) {
        match class {
            ResourceClass::SnapInfo => self.snap_info.invalidate(resource_id, requester).await,
            ResourceClass::ReleaseHistory => {
                self.release_history.invalidate(resource_id, requester).await
            }
            ResourceClass::StoreMembers => {
                self.store_members.invalidate(resource_id, requester).await
            }
            ResourceClass::PackageMetadata => {
                self.package_metadata.invalidate(resource_id, requester).await
            }
            ResourceClass::ItemDetails => self.item_details.invalidate(resource_id, requester).await,
            ResourceClass::Explore => self.explore.invalidate(resource_id, requester).await,
            ResourceClass::SnapRatings => self.snap_ratings.invalidate(resource_id, requester).await,
            ResourceClass::SigningKeys => self.signing_keys.invalidate(resource_id, requester).await,
            ResourceClass::StoreModels => self.store_models.invalidate(resource_id, requester).await,
            ResourceClass::Publicise => self.publicise.invalidate(resource_id, requester).await,
        }
    }

    /// Storage keys a read by `requester` consults, in order, with
    /// requester-scoped owner keys bound to the current generation.
    pub async fn lookup_keys(
        &self,
        class: ResourceClass,
        resource_id: &str,
        requester: Option<&Identity>,
    ) -> Vec<ScopedKey> {
        lookup_keys(&self.store, class, resource_id, requester).await
    }

    /// The cached JSON `requester` would be served for a resource, without
    /// decoding it into the class payload.
    pub async fn inspect(
        &self,
        class: ResourceClass,
        resource_id: &str,
        requester: Option<&Identity>,
    ) -> Option<Value> {
        read_scoped(&self.store, class, resource_id, requester).await
    }
}
