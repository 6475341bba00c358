//! Shared identity schema, store client, host-signer lifecycle, and session
//! primitives for the SSH gateway and the GitHub identity reconciler.

pub mod error;
pub mod identity;
pub mod log;
pub mod resize;
pub mod signer;
pub mod store;
pub mod username;

pub use self::{
    error::Error,
    identity::{SessionKey, SessionMode, SshUser, SshUserSpec},
    log::LogConfig,
    resize::{ResizeProducer, ResizeQueue, TerminalSize},
    store::{NamespaceScope, StoreClient},
};

/// Default namespaces excluded from reconciliation, matching the Go
/// predecessor's exclude-list defaults.
pub const DEFAULT_EXCLUDED_NAMESPACES: [&str; 2] = ["kube-system", "kube-public"];

/// Default namespace the reconciler targets when no inclusion list is given.
pub const DEFAULT_NAMESPACE: &str = "default";
