//! A thin wrapper around [`kube::Client`] providing the narrow, `snafu`-wrapped surface the
//! reconciler and webhook handlers need.

use kube::{
    Api, Client as KubeClient, Resource, ResourceExt,
    api::{Patch, PatchParams},
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};
use std::fmt::Debug;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to get {kind} {name:?}"))]
    Get {
        source: kube::Error,
        kind: &'static str,
        name: String,
    },

    #[snafu(display("failed to list {kind}"))]
    List { source: kube::Error, kind: &'static str },

    #[snafu(display("failed to apply {kind} {name:?}"))]
    Apply {
        source: kube::Error,
        kind: &'static str,
        name: String,
    },

    #[snafu(display("failed to patch status of {kind} {name:?}"))]
    PatchStatus {
        source: kube::Error,
        kind: &'static str,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    Delete {
        source: kube::Error,
        kind: &'static str,
        name: String,
    },
}

/// Wraps a [`kube::Client`] with helpers that apply a consistent field manager and surface
/// `snafu` errors instead of bare [`kube::Error`].
#[derive(Clone)]
pub struct Client {
    client: KubeClient,
    field_manager: String,
}

impl Client {
    pub fn new(client: KubeClient, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    /// Returns the underlying [`kube::Client`], e.g. to construct an [`Api`] for a dynamic
    /// resource kind the typed helpers below can't express.
    pub fn as_kube_client(&self) -> KubeClient {
        self.client.clone()
    }

    pub async fn get<K>(&self, name: &str, namespace: Option<&str>) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        self.api::<K>(namespace)
            .get(name)
            .await
            .context(GetSnafu {
                kind: std::any::type_name::<K>(),
                name: name.to_owned(),
            })
    }

    pub async fn list<K>(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let params = kube::api::ListParams::default().labels(label_selector);
        self.api::<K>(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .context(ListSnafu {
                kind: std::any::type_name::<K>(),
            })
    }

    /// Server-side applies `resource`, scoped to this crate's field manager.
    pub async fn apply<K>(&self, resource: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        let name = resource.name_any();
        let namespace = resource.namespace();
        let patch_params = PatchParams::apply(&self.field_manager).force();

        self.api::<K>(namespace.as_deref())
            .patch(&name, &patch_params, &Patch::Apply(resource))
            .await
            .context(ApplySnafu {
                kind: std::any::type_name::<K>(),
                name,
            })
    }

    /// Merge-patches just the `status` subresource of `name` with `status`.
    pub async fn apply_status<K, S>(&self, name: &str, namespace: Option<&str>, status: &S) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        S: Serialize,
    {
        let patch = serde_json::json!({ "status": status });
        let patch_params = PatchParams::apply(&self.field_manager);

        self.api::<K>(namespace)
            .patch_status(name, &patch_params, &Patch::Merge(&patch))
            .await
            .context(PatchStatusSnafu {
                kind: std::any::type_name::<K>(),
                name: name.to_owned(),
            })
    }

    /// Deletes `name`, returning `Ok(())` whether or not the object was already absent.
    pub async fn delete_ignore_not_found<K>(&self, name: &str, namespace: Option<&str>) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        match self
            .api::<K>(namespace)
            .delete(name, &kube::api::DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(source) => Err(Error::Delete {
                source,
                kind: std::any::type_name::<K>(),
                name: name.to_owned(),
            }),
        }
    }

    fn api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}
