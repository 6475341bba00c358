//! Top-level error type for the reconciler binary.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to initialize Kubernetes client, error: {source}"))]
    KubeConfig { source: kube::Error },

    #[snafu(display("failed to install the SshUser custom resource definition, error: {source}"))]
    InstallCrd { source: skpr_ssh_core::store::Error },
}
