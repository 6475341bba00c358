//! Entry point for the SSH gateway: loads or generates the host key, installs
//! the `SshUser` custom resource definition, and accepts connections.

mod cli;
mod error;
mod handler;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use clap::Parser;
use russh::{MethodSet, server::Config as ServerConfig};
use skpr_ssh_core::{LogConfig, StoreClient, signer};
use snafu::ResultExt;
use tokio::net::TcpListener;
use tracing::Instrument;

use self::{
    cli::Cli,
    error::{
        BindTcpSocketSnafu, Error, InstallCrdSnafu, KubeConfigSnafu, ParseClusterUrlSnafu,
        ParseListenAddressSnafu,
    },
    handler::GatewayHandler,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config =
        LogConfig { level: cli.log_level, emit_journald: cli.log_journald, ..LogConfig::default() };
    log_config.registry();

    if let Err(error) = run(cli).await {
        tracing::error!(%error, "gateway exited with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let signer = match cli.resolve_signer() {
        Some(path) => signer::load_or_generate(&path).await?,
        None => signer::ephemeral()?,
    };

    let kube_client = match &cli.k8s {
        Some(url) => {
            let mut config = kube::Config::infer().await.context(KubeConfigSnafu)?;
            config.cluster_url =
                url.parse().context(ParseClusterUrlSnafu { url: url.clone() })?;
            kube::Client::try_from(config).context(KubeConfigSnafu)?
        }
        None => kube::Client::try_default().await.context(KubeConfigSnafu)?,
    };

    StoreClient::install_crd(&kube_client).await.context(InstallCrdSnafu)?;

    let listen = cli.resolve_listen();
    let listen_address: std::net::SocketAddr =
        listen.parse().context(ParseListenAddressSnafu { address: listen.clone() })?;

    let server_config = Arc::new(ServerConfig {
        keys: vec![signer],
        methods: MethodSet::PUBLICKEY,
        ..ServerConfig::default()
    });

    let listener = TcpListener::bind(listen_address)
        .await
        .context(BindTcpSocketSnafu { socket_address: listen_address })?;

    tracing::info!(address = %listen_address, "gateway listening for SSH connections");

    let shell = shell_words::split(&cli.shell).unwrap_or_else(|_| vec![cli.shell.clone()]);
    let next_connection_id = AtomicU64::new(1);

    loop {
        let (socket, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!(%error, "failed to accept incoming connection");
                continue;
            }
        };

        let connection_id = next_connection_id.fetch_add(1, Ordering::Relaxed);
        let server_config = server_config.clone();
        let handler =
            GatewayHandler::new(kube_client.clone(), shell.clone(), peer_addr.to_string());

        let span = tracing::info_span!("ssh_connection", connection_id, peer_addr = %peer_addr);
        let _handle = tokio::spawn(
            async move {
                if let Err(error) =
                    russh::server::run_stream(server_config, socket, handler).await
                {
                    tracing::warn!(%error, "SSH session ended with an error");
                }
            }
            .instrument(span),
        );
    }
}
