//! Operator commands over the cache: probe the primary, look at what a
//! requester would be served, and drop entries after an upstream change.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::cache::{
    CachePolicies, Identity, ResourceClass, ScopedKey, invalidation_keys,
};

#[derive(Debug, Error)]
pub enum CacheAdminError {
    #[error("identity must be non-empty without surrounding whitespace")]
    InvalidIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub namespace: String,
    pub primary_configured: bool,
    pub primary_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectReport {
    pub class: ResourceClass,
    pub resource_id: String,
    pub keys: Vec<String>,
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidateReport {
    pub class: ResourceClass,
    pub resource_id: String,
    pub keys: Vec<String>,
}

#[derive(Clone)]
pub struct CacheAdminService {
    policies: CachePolicies,
}

impl CacheAdminService {
    pub fn new(policies: CachePolicies) -> Self {
        Self { policies }
    }

    pub async fn probe(&self) -> ProbeReport {
        let store = self.policies.store();
        let primary_available = store.probe().await;
        ProbeReport {
            namespace: store.namespace().to_string(),
            primary_configured: store.has_primary(),
            primary_available,
        }
    }

    pub async fn inspect(
        &self,
        class: ResourceClass,
        resource_id: &str,
        identity: Option<&str>,
    ) -> Result<InspectReport, CacheAdminError> {
        let requester = parse_identity(identity)?;
        let keys = self
            .policies
            .lookup_keys(class, resource_id, requester.as_ref())
            .await;
        let value = self
            .policies
            .inspect(class, resource_id, requester.as_ref())
            .await;

        Ok(InspectReport {
            class,
            resource_id: resource_id.to_string(),
            keys: self.rendered_keys(keys),
            hit: value.is_some(),
            value,
        })
    }

    pub async fn invalidate(
        &self,
        class: ResourceClass,
        resource_id: &str,
        identity: Option<&str>,
    ) -> Result<InvalidateReport, CacheAdminError> {
        let requester = parse_identity(identity)?;
        self.policies
            .invalidate(class, resource_id, requester.as_ref())
            .await;

        let keys = self.rendered_keys(invalidation_keys(class, resource_id, requester.as_ref()));
        info!(
            class = class.prefix(),
            resource_id,
            keys = keys.len(),
            "cache entries invalidated"
        );

        Ok(InvalidateReport {
            class,
            resource_id: resource_id.to_string(),
            keys,
        })
    }

    fn rendered_keys(&self, keys: Vec<ScopedKey>) -> Vec<String> {
        let namespace = self.policies.store().namespace();
        keys.iter()
            .map(|key| format!("{namespace}:{}", key.render()))
            .collect()
    }
}

fn parse_identity(identity: Option<&str>) -> Result<Option<Identity>, CacheAdminError> {
    identity
        .map(|value| Identity::new(value).ok_or(CacheAdminError::InvalidIdentity))
        .transpose()
}
