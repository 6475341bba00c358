//! Typed CRUD client over the `SshUser` custom resource, plus CRD bootstrap.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    Api, Client, CustomResourceExt, Resource,
    api::{DeleteParams, ListParams, PostParams},
};
use snafu::{ResultExt, Snafu};

use crate::identity::{SshUser, SshUserSpec};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("identity record {name} not found in namespace {namespace}, error: {source}"))]
    Get {
        namespace: String,
        name: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("failed to list identity records in {namespace}, error: {source}"))]
    List {
        namespace: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("failed to create identity record {name} in {namespace}, error: {source}"))]
    Create {
        namespace: String,
        name: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("failed to update identity record {name} in {namespace}, error: {source}"))]
    Update {
        namespace: String,
        name: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("failed to delete identity record {name} in {namespace}, error: {source}"))]
    Delete {
        namespace: String,
        name: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("failed to install the SshUser custom resource definition, error: {source}"))]
    InstallCrd {
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },
}

/// Selects which namespaces a `list` call should span.
#[derive(Clone, Debug)]
pub enum NamespaceScope {
    Namespace(String),
    All,
}

/// Typed CRUD access to `SshUser` records.
///
/// Parametric over one namespace for writes (`get`/`create`/`update`/
/// `delete`); `list` additionally accepts [`NamespaceScope::All`] for
/// cross-namespace reads, matching the `"all"` namespace sentinel in the
/// operation contract this client implements.
#[derive(Clone)]
pub struct StoreClient {
    client: Client,
    namespace: String,
}

impl StoreClient {
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self { client, namespace: namespace.into() }
    }

    fn api(&self) -> Api<SshUser> { Api::namespaced(self.client.clone(), &self.namespace) }

    fn api_in(&self, namespace: &str) -> Api<SshUser> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Installs the `sshusers.skpr.io` CRD. An `AlreadyExists` response is
    /// treated as success, since either the gateway or the reconciler may
    /// win the race to install it first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallCrd`] for any failure other than the
    /// resource already existing.
    pub async fn install_crd(client: &Client) -> Result<(), Error> {
        let api: Api<CustomResourceDefinition> = Api::all(client.clone());
        let crd = SshUser::crd();
        match api.create(&PostParams::default(), &crd).await {
            Ok(_) | Err(kube::Error::Api(kube::error::ErrorResponse { code: 409, .. })) => Ok(()),
            Err(source) => Err(source).with_context(|_| InstallCrdSnafu),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Get`] if the record does not exist or the request
    /// fails.
    pub async fn get(&self, name: &str) -> Result<SshUser, Error> {
        self.api()
            .get(name)
            .await
            .with_context(|_| GetSnafu { namespace: self.namespace.clone(), name })
    }

    /// # Errors
    ///
    /// Returns [`Error::List`] if the request fails.
    pub async fn list(&self, scope: &NamespaceScope) -> Result<Vec<SshUser>, Error> {
        let (api, namespace_label) = match scope {
            NamespaceScope::Namespace(ns) => (self.api_in(ns), ns.clone()),
            NamespaceScope::All => (Api::all(self.client.clone()), "all".to_string()),
        };
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .with_context(|_| ListSnafu { namespace: namespace_label })
    }

    /// # Errors
    ///
    /// Returns [`Error::Create`] if a record with the same name already
    /// exists or the request fails.
    pub async fn create(&self, name: &str, spec: SshUserSpec) -> Result<SshUser, Error> {
        let mut user = SshUser::new(name, spec);
        user.meta_mut().namespace = Some(self.namespace.clone());
        self.api()
            .create(&PostParams::default(), &user)
            .await
            .with_context(|_| CreateSnafu { namespace: self.namespace.clone(), name })
    }

    /// Full replace of `name`'s spec. The record must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Update`] if the record does not exist or the
    /// request fails.
    pub async fn update(&self, name: &str, spec: SshUserSpec) -> Result<SshUser, Error> {
        let api = self.api();
        let mut existing = api
            .get(name)
            .await
            .with_context(|_| UpdateSnafu { namespace: self.namespace.clone(), name })?;
        existing.spec = spec;
        api.replace(name, &PostParams::default(), &existing)
            .await
            .with_context(|_| UpdateSnafu { namespace: self.namespace.clone(), name })
    }

    /// # Errors
    ///
    /// Returns [`Error::Delete`] if the record does not exist or the
    /// request fails.
    pub async fn delete(&self, name: &str) -> Result<(), Error> {
        let _ = self
            .api()
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|_| DeleteSnafu { namespace: self.namespace.clone(), name })?;
        Ok(())
    }
}

/// Synthesizes the cluster pod-exec streaming URL. Pure string formatting:
/// it never touches the network and cannot fail, matching the contract's
/// split between synthesizing the request and opening the stream (the
/// latter is `kube::Api<Pod>::exec`, driven directly by the gateway).
#[must_use]
pub fn exec_url(
    namespace: &str,
    pod: &str,
    container: &str,
    command: &[String],
    stdin: bool,
    tty: bool,
) -> String {
    let command_query =
        command.iter().map(|arg| format!("command={arg}")).collect::<Vec<_>>().join("&");
    format!(
        "/api/v1/namespaces/{namespace}/pods/{pod}/exec?container={container}&stdin={stdin}&\
         stdout=true&stderr=true&tty={tty}{sep}{command_query}",
        sep = if command_query.is_empty() { "" } else { "&" },
    )
}

#[cfg(test)]
mod tests {
    use super::exec_url;

    #[test]
    fn exec_url_is_pure_and_deterministic() {
        let url = exec_url("team-a", "web-0", "php", &["/bin/bash".to_string()], true, true);
        assert_eq!(
            url,
            "/api/v1/namespaces/team-a/pods/web-0/exec?container=php&stdin=true&stdout=true&\
             stderr=true&tty=true&command=/bin/bash"
        );
    }

    #[test]
    fn exec_url_omits_trailing_separator_with_no_command() {
        let url = exec_url("ns", "pod", "container", &[], false, false);
        assert!(!url.ends_with('&'));
    }
}
