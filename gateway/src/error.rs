//! Top-level error type for the gateway binary.

use std::net::SocketAddr;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Core { source: skpr_ssh_core::Error },

    #[snafu(display("failed to initialize Kubernetes client, error: {source}"))]
    KubeConfig { source: kube::Error },

    #[snafu(display("failed to install the SshUser custom resource definition, error: {source}"))]
    InstallCrd { source: skpr_ssh_core::store::Error },

    #[snafu(display("failed to bind TCP socket {socket_address}, error: {source}"))]
    BindTcpSocket { socket_address: SocketAddr, source: std::io::Error },

    #[snafu(display("invalid listen address {address}, error: {source}"))]
    ParseListenAddress { address: String, source: std::net::AddrParseError },

    #[snafu(display("invalid Kubernetes API URL {url}, error: {source}"))]
    ParseClusterUrl { url: String, source: http::uri::InvalidUri },
}

impl From<skpr_ssh_core::Error> for Error {
    fn from(source: skpr_ssh_core::Error) -> Self { Self::Core { source } }
}

impl From<skpr_ssh_core::signer::Error> for Error {
    fn from(source: skpr_ssh_core::signer::Error) -> Self {
        Self::Core { source: source.into() }
    }
}
