//! Versioned ConfigMap lifecycle for scenario-owned config objects
//!
//! The scenario owns exactly one transient ConfigMap: seeded before the
//! first deploy, fully replaced (never merged) for the redeploy mutation,
//! and deleted unconditionally at scenario exit. Content changes are only
//! guaranteed visible to the workload after a rollout; callers must not
//! assume synchronous propagation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tracing::{debug, info};

use crate::{Error, Result};

/// Kind string used in error reporting
const KIND: &str = "ConfigMap";

/// Config object store with create/replace/delete semantics.
///
/// `create` fails on a live same-named object, `replace_content` fails on
/// an absent one, and `delete` is idempotent.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Create a config object; fails with [`Error::AlreadyExists`] if live
    async fn create(&self, name: &str, content: BTreeMap<String, String>) -> Result<()>;

    /// Fully replace the content map of an existing object.
    ///
    /// Full-document substitution, not a diff/patch: the resulting object
    /// holds exactly `content`, never a merge of old and new. Fails with
    /// [`Error::NotFound`] if the object is absent.
    async fn replace_content(&self, name: &str, content: BTreeMap<String, String>) -> Result<()>;

    /// Read the content map of a config object, if it exists
    async fn get(&self, name: &str) -> Result<Option<BTreeMap<String, String>>>;

    /// Delete a config object; absence of the target is not an error
    async fn delete(&self, name: &str) -> Result<()>;
}

/// [`ConfigStore`] backed by the Kubernetes ConfigMap API in one namespace.
#[derive(Clone)]
pub struct KubeConfigStore {
    client: Client,
    namespace: String,
}

impl KubeConfigStore {
    /// Create a store scoped to the given namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn build(name: &str, content: BTreeMap<String, String>) -> ConfigMap {
        ConfigMap {
            metadata: kube::core::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            data: Some(content),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ConfigStore for KubeConfigStore {
    async fn create(&self, name: &str, content: BTreeMap<String, String>) -> Result<()> {
        info!(name = %name, namespace = %self.namespace, "creating config object");
        self.api()
            .create(&PostParams::default(), &Self::build(name, content))
            .await
            .map_err(|e| Error::from_kube(e, KIND, name))?;
        Ok(())
    }

    async fn replace_content(&self, name: &str, content: BTreeMap<String, String>) -> Result<()> {
        // Fetch first: replace needs the live resourceVersion, and absence
        // must surface as NotFound rather than an implicit create.
        let mut existing = match self.api().get(name).await {
            Ok(cm) => cm,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                return Err(Error::not_found(KIND, name));
            }
            Err(e) => return Err(Error::from_kube(e, KIND, name)),
        };

        existing.data = Some(content);
        existing.binary_data = None;

        info!(name = %name, namespace = %self.namespace, "replacing config object content");
        self.api()
            .replace(name, &PostParams::default(), &existing)
            .await
            .map_err(|e| Error::from_kube(e, KIND, name))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        match self.api().get(name).await {
            Ok(cm) => Ok(Some(cm.data.unwrap_or_default())),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::from_kube(e, KIND, name)),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.api().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(name = %name, namespace = %self.namespace, "deleted config object");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(name = %name, "config object already gone");
                Ok(())
            }
            Err(e) => Err(Error::from_kube(e, KIND, name)),
        }
    }
}
