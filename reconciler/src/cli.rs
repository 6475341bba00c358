//! Command-line surface for the reconciler binary.

use clap::Parser;

/// Periodically synchronizes GitHub organization membership and public keys
/// into the cluster identity store.
#[derive(Parser, Debug)]
#[command(
    name = "skpr-ssh-reconciler",
    author,
    version,
    about = "Synchronizes a GitHub organization's members and keys into the cluster identity store",
    color = clap::ColorChoice::Always
)]
pub struct Cli {
    /// GitHub personal access token used to query the organization.
    #[clap(long = "token", env = "TOKEN", help = "GitHub personal access token")]
    pub token: String,

    /// GitHub organization slug to synchronize membership from.
    #[clap(long = "org", env = "ORG", help = "GitHub organization slug")]
    pub org: String,

    /// Namespaces never touched by reconciliation, regardless of inclusion.
    #[clap(
        long = "exclude",
        env = "EXCLUDE",
        default_value = "kube-system,kube-public",
        value_delimiter = ',',
        help = "Comma-separated namespace blacklist"
    )]
    pub exclude: Vec<String>,

    /// Namespaces reconciliation targets.
    #[clap(
        long = "namespaces",
        env = "NAMESPACES",
        default_value = "default",
        value_delimiter = ',',
        help = "Comma-separated namespace inclusion list"
    )]
    pub namespaces: Vec<String>,

    /// How often a reconciliation tick runs.
    #[clap(
        long = "frequency",
        env = "FREQUENCY",
        default_value = "120s",
        value_parser = parse_duration,
        help = "Reconciliation period, e.g. \"120s\" or \"5m\""
    )]
    pub frequency: std::time::Duration,

    /// Logging level.
    #[clap(long = "log-level", env = "RECONCILER_LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,

    /// Also emit logs to the systemd journal.
    #[clap(long = "log-journald", env = "RECONCILER_LOG_JOURNALD")]
    pub log_journald: bool,
}

fn parse_duration(input: &str) -> Result<std::time::Duration, String> {
    humantime::parse_duration(input).map_err(|error| error.to_string())
}
