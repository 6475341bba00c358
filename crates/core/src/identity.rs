//! The cluster-persisted identity record and its derived session types.
//!
//! `SshUser` is the custom resource that the gateway reads during public-key
//! authentication and the reconciler writes during each sync tick. It is the
//! sole source of truth for which keys may authenticate as a given principal
//! in a given namespace.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `SshUser` identity record, group `skpr.io`, version `v1`, namespaced.
///
/// Mirrors the `SSHSpec`/`SSH` custom resource of the Go predecessor, with
/// the historical singular `authorizedKey` field long dropped in favor of
/// the plural `authorizedKeys` list.
#[derive(Clone, Debug, Eq, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "skpr.io",
    version = "v1",
    kind = "SshUser",
    plural = "sshusers",
    namespaced,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct SshUserSpec {
    /// OpenSSH `authorized_keys`-format public key lines. An empty list
    /// disables login for this principal without deleting the record.
    #[serde(default)]
    pub authorized_keys: Vec<String>,

    /// Deprecated field carried over from the `ThirdPartyResource` era.
    /// Accepted on read for compatibility with records any older tooling
    /// may still have written; never populated by this implementation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

impl SshUserSpec {
    #[must_use]
    pub fn new<I, S>(authorized_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { authorized_keys: authorized_keys.into_iter().map(Into::into).collect(), groups: None }
    }
}

/// The four-field coordinate parsed out of an SSH username: which namespace,
/// pod, and container to proxy into, and which principal's keys to check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionKey {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub principal: String,
}

/// What an accepted session should do with the remote process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionMode {
    /// Empty command: allocate a PTY and run the configured login shell.
    Shell,
    /// `command[0] == "rsync"`: attach stdin, no PTY.
    Rsync,
    /// Anything else: attach stdout/stderr only, no stdin, no PTY.
    Exec,
}

impl SessionMode {
    /// Classifies a client-supplied command vector per the gateway's
    /// session-mode rules (see `skpr-ssh-core::username::classify`).
    #[must_use]
    pub fn classify(command: &[String]) -> Self {
        match command.first().map(String::as_str) {
            None => Self::Shell,
            Some("rsync") => Self::Rsync,
            Some(_) => Self::Exec,
        }
    }

    #[must_use]
    pub const fn wants_pty(&self) -> bool { matches!(self, Self::Shell) }

    #[must_use]
    pub const fn wants_stdin(&self) -> bool { matches!(self, Self::Shell | Self::Rsync) }
}

#[cfg(test)]
mod tests {
    use super::SessionMode;

    #[test]
    fn empty_command_is_shell() {
        assert_eq!(SessionMode::classify(&[]), SessionMode::Shell);
    }

    #[test]
    fn rsync_command_is_rsync() {
        let command = vec!["rsync".to_string(), "--server".to_string()];
        assert_eq!(SessionMode::classify(&command), SessionMode::Rsync);
    }

    #[test]
    fn other_command_is_exec() {
        let command = vec!["ls".to_string(), "-la".to_string()];
        assert_eq!(SessionMode::classify(&command), SessionMode::Exec);
    }

    #[test]
    fn only_shell_wants_pty_and_stdin() {
        assert!(SessionMode::Shell.wants_pty());
        assert!(SessionMode::Shell.wants_stdin());

        assert!(!SessionMode::Rsync.wants_pty());
        assert!(SessionMode::Rsync.wants_stdin());

        assert!(!SessionMode::Exec.wants_pty());
        assert!(!SessionMode::Exec.wants_stdin());
    }
}
