//! A small GitHub REST API v3 client: organization members and their keys.
//!
//! None of the five example repos talk to the GitHub API; `reqwest` is the
//! general-purpose async HTTP client used across the broader retrieval pack
//! (see `DESIGN.md`), wrapped here the same way `skpr_ssh_core::store`
//! wraps the Kubernetes API: a handful of typed calls, nothing more.

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

const USER_AGENT: &str = concat!("skpr-ssh-reconciler/", env!("CARGO_PKG_VERSION"));
const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to list members of organization {org}, error: {source}"))]
    ListMembers { org: String, source: reqwest::Error },

    #[snafu(display("failed to list public keys for user {login}, error: {source}"))]
    ListKeys { login: String, source: reqwest::Error },
}

#[derive(Debug, Deserialize)]
struct Member {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PublicKey {
    key: String,
}

/// One organization member and the `authorized_keys` lines GitHub has on
/// file for them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    pub login: String,
    pub authorized_keys: Vec<String>,
}

/// Thin wrapper over the GitHub REST API v3 endpoints the reconciler needs.
#[derive(Clone)]
pub struct GithubProvider {
    client: reqwest::Client,
    token: String,
}

impl GithubProvider {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), token: token.into() }
    }

    /// Fetches every member's login and public-key set for `org`.
    ///
    /// Mirrors the Go predecessor's `getGithubKeys`: list org members, then
    /// list each member's keys. A failure anywhere in the call surfaces as
    /// an error for the whole fetch; the reconciliation tick (§4.3) treats
    /// that as "skip this tick" rather than returning a partial set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ListMembers`] if the organization member list
    /// request fails, or [`Error::ListKeys`] if any member's key list
    /// request fails.
    pub async fn fetch_identities(&self, org: &str) -> Result<Vec<Identity>, Error> {
        let members = self.list_members(org).await?;

        let mut identities = Vec::with_capacity(members.len());
        for member in members {
            let authorized_keys = self.list_keys(&member.login).await?;
            identities.push(Identity { login: member.login, authorized_keys });
        }
        Ok(identities)
    }

    async fn list_members(&self, org: &str) -> Result<Vec<Member>, Error> {
        self.client
            .get(format!("{API_BASE}/orgs/{org}/members"))
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(ListMembersSnafu { org })?
            .json::<Vec<Member>>()
            .await
            .context(ListMembersSnafu { org })
    }

    async fn list_keys(&self, login: &str) -> Result<Vec<String>, Error> {
        let keys = self
            .client
            .get(format!("{API_BASE}/users/{login}/keys"))
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(ListKeysSnafu { login })?
            .json::<Vec<PublicKey>>()
            .await
            .context(ListKeysSnafu { login })?;

        Ok(keys.into_iter().map(|key| key.key).collect())
    }
}
