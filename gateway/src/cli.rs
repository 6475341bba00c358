//! Command-line surface for the gateway binary.
//!
//! A flat flag struct rather than `axon`'s subcommand tree: the gateway has
//! exactly one mode of operation (listen and serve), so there is nothing to
//! dispatch on.

use std::path::PathBuf;

use clap::Parser;

/// Listens for SSH connections, authenticates against the cluster identity
/// store, and proxies accepted sessions into the target container.
#[derive(Parser, Debug)]
#[command(
    name = "skpr-ssh-gateway",
    author,
    version,
    about = "SSH gateway backed by cluster-held identities",
    color = clap::ColorChoice::Always
)]
pub struct Cli {
    /// Address to bind the SSH listener on. Falls back to the bare `LISTEN`
    /// environment variable, then `0.0.0.0:22`, when `--listen`/`SSH_LISTEN`
    /// is unset; see [`Cli::resolve_listen`].
    #[clap(long = "listen", env = "SSH_LISTEN", help = "Address to bind the SSH listener on")]
    pub listen: Option<String>,

    /// Path to the host private key. Generated on first run if missing; if
    /// unset, an ephemeral key is generated fresh on every startup. Falls
    /// back to the bare `SIGNER` environment variable when
    /// `--signer`/`SSH_SIGNER` is unset; see [`Cli::resolve_signer`].
    #[clap(
        long = "signer",
        env = "SSH_SIGNER",
        help = "Path to the host private key, generated on first run if missing"
    )]
    pub signer: Option<PathBuf>,

    /// Command substituted for sessions that request an interactive shell.
    #[clap(
        long = "shell",
        env = "SSH_SHELL",
        default_value = "/bin/bash",
        help = "Command substituted for interactive shell sessions"
    )]
    pub shell: String,

    /// Kubernetes API base URL. When unset, in-cluster service-account
    /// discovery is used.
    #[clap(long = "k8s", env = "K8S_URL", help = "Kubernetes API base URL")]
    pub k8s: Option<String>,

    /// Logging level.
    #[clap(long = "log-level", env = "SSH_LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,

    /// Also emit logs to the systemd journal.
    #[clap(long = "log-journald", env = "SSH_LOG_JOURNALD")]
    pub log_journald: bool,
}

impl Cli {
    /// Resolves the listen address: `--listen`/`SSH_LISTEN` if given,
    /// otherwise the bare `LISTEN` environment variable (kept for
    /// compatibility with the Go predecessor's two source variants),
    /// otherwise `0.0.0.0:22`.
    #[must_use]
    pub fn resolve_listen(&self) -> String {
        self.listen
            .clone()
            .or_else(|| std::env::var("LISTEN").ok())
            .unwrap_or_else(|| "0.0.0.0:22".to_string())
    }

    /// Resolves the host signer path: `--signer`/`SSH_SIGNER` if given,
    /// otherwise the bare `SIGNER` environment variable, otherwise `None`
    /// (an ephemeral signer is generated each startup).
    #[must_use]
    pub fn resolve_signer(&self) -> Option<PathBuf> {
        self.signer.clone().or_else(|| std::env::var_os("SIGNER").map(PathBuf::from))
    }
}
