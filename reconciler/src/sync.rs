//! One reconciliation tick: projects the provider's desired identities onto
//! every target namespace in the cluster identity store.

use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Resource, api::ListParams};
use skpr_ssh_core::{NamespaceScope, SshUser, SshUserSpec, StoreClient};

use crate::provider::GithubProvider;

/// Runs one tick: fetches desired identities from `provider` and projects
/// them onto every namespace in `namespaces` (or, if that list is empty,
/// every namespace visible to the cluster credential), skipping anything
/// named in `exclude`.
///
/// A provider-fetch failure is logged and the whole tick is skipped (§4.3
/// step 1-2); a per-record store failure is logged and reconciliation
/// continues with the next record (§9 "Reconciler robustness").
pub async fn tick(
    kube_client: &kube::Client,
    provider: &GithubProvider,
    org: &str,
    namespaces: &[String],
    exclude: &[String],
) {
    let identities = match provider.fetch_identities(org).await {
        Ok(identities) => identities,
        Err(error) => {
            tracing::warn!(%error, "failed to fetch identities from provider, skipping this tick");
            return;
        }
    };

    let desired: Vec<(String, SshUserSpec)> = identities
        .into_iter()
        .map(|identity| {
            (identity.login.to_lowercase(), SshUserSpec::new(identity.authorized_keys))
        })
        .collect();

    let targets = match resolve_target_namespaces(kube_client, namespaces).await {
        Ok(targets) => targets,
        Err(error) => {
            tracing::warn!(%error, "failed to enumerate namespaces, skipping this tick");
            return;
        }
    };

    for namespace in targets {
        if exclude.iter().any(|excluded| excluded == &namespace) {
            tracing::debug!(%namespace, "skipping excluded namespace");
            continue;
        }
        reconcile_namespace(kube_client, &namespace, &desired).await;
    }
}

/// An explicit, non-empty inclusion list is used verbatim; an empty one
/// falls back to every namespace the cluster credential can see (§4.3
/// step 3, §9 "Namespace targeting"). Exclusion is applied uniformly by the
/// caller regardless of which path produced the list.
async fn resolve_target_namespaces(
    kube_client: &kube::Client,
    namespaces: &[String],
) -> Result<Vec<String>, kube::Error> {
    let explicit: Vec<String> = namespaces.iter().filter(|ns| !ns.is_empty()).cloned().collect();
    if !explicit.is_empty() {
        return Ok(explicit);
    }

    let api: Api<Namespace> = Api::all(kube_client.clone());
    let list = api.list(&ListParams::default()).await?;
    Ok(list.items.into_iter().filter_map(|namespace| namespace.metadata.name).collect())
}

async fn reconcile_namespace(
    kube_client: &kube::Client,
    namespace: &str,
    desired: &[(String, SshUserSpec)],
) {
    let store = StoreClient::new(kube_client.clone(), namespace.to_string());

    let existing = match store.list(&NamespaceScope::Namespace(namespace.to_string())).await {
        Ok(existing) => existing,
        Err(error) => {
            tracing::warn!(%namespace, %error, "failed to list existing identity records");
            return;
        }
    };

    let plan = diff(&existing, desired);

    for name in &plan.deletes {
        match store.delete(name).await {
            Ok(()) => tracing::info!(%namespace, name, "deleted stale identity record"),
            Err(error) => {
                tracing::warn!(%namespace, name, %error, "failed to delete stale identity record");
            }
        }
    }

    for (name, spec) in &plan.updates {
        match store.update(name, spec.clone()).await {
            Ok(_) => tracing::info!(%namespace, name, "updated identity record"),
            Err(error) => {
                tracing::warn!(%namespace, name, %error, "failed to update identity record");
            }
        }
    }

    for (name, spec) in &plan.creates {
        match store.create(name, spec.clone()).await {
            Ok(_) => tracing::info!(%namespace, name, "created identity record"),
            Err(error) => {
                tracing::warn!(%namespace, name, %error, "failed to create identity record");
            }
        }
    }
}

/// The set of CRUD operations one namespace needs to converge its existing
/// `SshUser` records onto `desired`. Pure with respect to the cluster: given
/// the same `existing`/`desired` inputs it always produces the same plan,
/// which is what makes spec §8 properties 4 ("convergence") and 5
/// ("idempotence") checkable without a live `kube::Client`.
#[derive(Debug, Default, Eq, PartialEq)]
struct Plan {
    creates: Vec<(String, SshUserSpec)>,
    updates: Vec<(String, SshUserSpec)>,
    deletes: Vec<String>,
}

fn diff(existing: &[SshUser], desired: &[(String, SshUserSpec)]) -> Plan {
    let desired_names: std::collections::HashSet<&str> =
        desired.iter().map(|(name, _)| name.as_str()).collect();

    let deletes = existing
        .iter()
        .filter_map(|record| record.meta().name.clone())
        .filter(|name| !desired_names.contains(name.as_str()))
        .collect();

    let mut creates = Vec::new();
    let mut updates = Vec::new();

    for (name, spec) in desired {
        let existing_record =
            existing.iter().find(|record| record.meta().name.as_deref() == Some(name.as_str()));

        match existing_record {
            Some(record) if record.spec.authorized_keys == spec.authorized_keys => {}
            Some(_) => updates.push((name.clone(), spec.clone())),
            None => creates.push((name.clone(), spec.clone())),
        }
    }

    Plan { creates, updates, deletes }
}

#[cfg(test)]
mod tests {
    use skpr_ssh_core::{SshUser, SshUserSpec};

    use super::{Plan, diff};

    fn record(name: &str, keys: &[&str]) -> SshUser {
        SshUser::new(name, SshUserSpec::new(keys.iter().map(ToString::to_string)))
    }

    fn desired(name: &str, keys: &[&str]) -> (String, SshUserSpec) {
        (name.to_string(), SshUserSpec::new(keys.iter().map(ToString::to_string)))
    }

    #[test]
    fn spec_equality_ignores_nothing_but_authorized_keys() {
        let a = SshUserSpec::new(["key-a".to_string()]);
        let b = SshUserSpec::new(["key-a".to_string()]);
        assert_eq!(a.authorized_keys, b.authorized_keys);
    }

    /// Spec §8 scenario 5: an empty namespace converges to exactly the
    /// provider's desired records, all via `create`.
    #[test]
    fn convergence_creates_every_desired_record_from_empty() {
        let existing: Vec<SshUser> = Vec::new();
        let desired = vec![desired("alice", &["key-alice"]), desired("bob", &["key-bob"])];

        let plan = diff(&existing, &desired);

        assert_eq!(plan.creates, desired);
        assert!(plan.updates.is_empty());
        assert!(plan.deletes.is_empty());
    }

    /// Spec §8 scenario 6: a namespace holding a record absent from the
    /// desired set deletes it while creating the missing desired records.
    #[test]
    fn convergence_deletes_records_absent_from_desired() {
        let existing = vec![record("carol", &["key-carol"])];
        let desired = vec![desired("alice", &["key-alice"]), desired("bob", &["key-bob"])];

        let plan = diff(&existing, &desired);

        assert_eq!(plan.deletes, vec!["carol".to_string()]);
        assert_eq!(plan.creates, desired);
        assert!(plan.updates.is_empty());
    }

    /// A record whose keys differ from the desired set is updated in place,
    /// not deleted and recreated.
    #[test]
    fn convergence_updates_records_with_stale_keys() {
        let existing = vec![record("alice", &["old-key"])];
        let desired = vec![desired("alice", &["new-key"])];

        let plan = diff(&existing, &desired);

        assert_eq!(plan.updates, desired);
        assert!(plan.creates.is_empty());
        assert!(plan.deletes.is_empty());
    }

    /// Spec §8 property 5: a tick against an already-converged store plans
    /// zero writes.
    #[test]
    fn idempotence_plans_no_writes_when_already_converged() {
        let existing = vec![record("alice", &["key-alice"]), record("bob", &["key-bob"])];
        let desired = vec![desired("alice", &["key-alice"]), desired("bob", &["key-bob"])];

        let plan = diff(&existing, &desired);

        assert_eq!(plan, Plan::default());
    }
}
