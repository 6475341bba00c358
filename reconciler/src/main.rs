//! Entry point for the identity reconciler: installs the `SshUser` custom
//! resource definition, then periodically projects a GitHub organization's
//! member list onto the cluster identity store.

mod cli;
mod error;
mod provider;
mod sync;

use clap::Parser;
use skpr_ssh_core::{LogConfig, StoreClient};
use snafu::ResultExt;

use self::{
    cli::Cli,
    error::{Error, InstallCrdSnafu, KubeConfigSnafu},
    provider::GithubProvider,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config =
        LogConfig { level: cli.log_level, emit_journald: cli.log_journald, ..LogConfig::default() };
    log_config.registry();

    if let Err(error) = run(cli).await {
        tracing::error!(%error, "reconciler exited with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let kube_client = kube::Client::try_default().await.context(KubeConfigSnafu)?;
    StoreClient::install_crd(&kube_client).await.context(InstallCrdSnafu)?;

    let provider = GithubProvider::new(cli.token.clone());

    tracing::info!(
        org = %cli.org,
        namespaces = ?cli.namespaces,
        exclude = ?cli.exclude,
        frequency = ?cli.frequency,
        "reconciler starting"
    );

    let mut interval = tokio::time::interval(cli.frequency);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let outcome = tokio::time::timeout(
            cli.frequency,
            sync::tick(&kube_client, &provider, &cli.org, &cli.namespaces, &cli.exclude),
        )
        .await;

        if outcome.is_err() {
            tracing::warn!(
                "reconciliation tick exceeded one period and was abandoned; the store may be \
                 partially reconciled until the next tick"
            );
        }
    }
}
