//! Loads the gateway's host key, generating one if none exists yet.
//!
//! The Go predecessor generates a 768-bit RSA key and writes it world- and
//! group-readable (mode `0644`). Both defaults are insecure; this
//! implementation raises the key size to 2048 bits and writes the file with
//! mode `0600`.

use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, pkcs1::EncodeRsaPrivateKey, pkcs1::LineEnding};
use russh::keys::PrivateKey;
use snafu::{ResultExt, Snafu};

/// Minimum RSA modulus size, in bits, for a freshly generated host key.
pub const MIN_KEY_BITS: usize = 2048;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to generate a {bits}-bit RSA key, error: {source}"))]
    GenerateKey { bits: usize, source: rsa::Error },

    #[snafu(display("failed to encode the generated RSA key as PKCS#1 PEM, error: {source}"))]
    EncodeKey { source: rsa::pkcs1::Error },

    #[snafu(display("failed to write the host key to {}, error: {source}", path.display()))]
    WriteKey { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to restrict permissions on {}, error: {source}", path.display()))]
    SetPermissions { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to read the host key at {}, error: {source}", path.display()))]
    ReadKey { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse the host key at {}", path.display()))]
    ParseKey { path: PathBuf },

    #[snafu(display("failed to generate an ephemeral host key, error: {source}"))]
    GenerateEphemeralKey { source: russh::keys::Error },
}

/// Loads the host signer from `path`, generating and persisting a new
/// 2048-bit RSA key there first if the file does not exist.
///
/// # Errors
///
/// Returns an [`Error`] if key generation, encoding, file I/O, permission
/// restriction, or parsing of the on-disk key fails.
pub async fn load_or_generate(path: &Path) -> Result<PrivateKey, Error> {
    if !path.try_exists().unwrap_or(false) {
        generate_and_write(path).await?;
    }

    let pem = tokio::fs::read_to_string(path)
        .await
        .with_context(|_| ReadKeySnafu { path: path.to_path_buf() })?;
    russh::keys::decode_secret_key(pem.trim(), None)
        .map_err(|_| ParseKeySnafu { path: path.to_path_buf() }.build())
}

/// Generates a host key that lives only for this process's lifetime.
///
/// Used when `--signer` is unset: the Go predecessor leaves its
/// `srv.HostSigners` list empty in that case and relies on the underlying
/// SSH library's own fallback behavior. `russh` has no equivalent implicit
/// default, so this generates a fresh Ed25519 key in memory each startup
/// rather than silently failing to offer a host key at all.
///
/// # Errors
///
/// Returns [`Error::GenerateEphemeralKey`] if key generation fails.
pub fn ephemeral() -> Result<PrivateKey, Error> {
    PrivateKey::random(&mut OsRng, russh::keys::Algorithm::Ed25519).context(GenerateEphemeralKeySnafu)
}

async fn generate_and_write(path: &Path) -> Result<(), Error> {
    let private_key = RsaPrivateKey::new(&mut OsRng, MIN_KEY_BITS)
        .with_context(|_| GenerateKeySnafu { bits: MIN_KEY_BITS })?;
    let pem =
        private_key.to_pkcs1_pem(LineEnding::LF).context(EncodeKeySnafu)?;

    tokio::fs::write(path, pem.as_bytes())
        .await
        .with_context(|_| WriteKeySnafu { path: path.to_path_buf() })?;

    set_owner_only_permissions(path).await?;
    Ok(())
}

#[cfg(unix)]
async fn set_owner_only_permissions(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|_| SetPermissionsSnafu { path: path.to_path_buf() })
}

#[cfg(not(unix))]
async fn set_owner_only_permissions(_path: &Path) -> Result<(), Error> { Ok(()) }

#[cfg(test)]
mod tests {
    use super::{MIN_KEY_BITS, ephemeral, load_or_generate};

    #[tokio::test]
    async fn generates_a_key_when_missing_and_reuses_it() {
        let dir = tempfile_dir();
        let path = dir.join("host_key");
        assert!(!path.exists());

        let first = load_or_generate(&path).await.unwrap();
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }

        let first_contents = std::fs::read_to_string(&path).unwrap();
        let second = load_or_generate(&path).await.unwrap();
        let second_contents = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first_contents, second_contents);
        assert_eq!(
            first.public_key().to_openssh().unwrap(),
            second.public_key().to_openssh().unwrap()
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn minimum_key_size_meets_the_raised_floor() {
        assert!(MIN_KEY_BITS >= 2048);
    }

    #[test]
    fn ephemeral_keys_are_distinct_each_call() {
        let first = ephemeral().unwrap();
        let second = ephemeral().unwrap();
        assert_ne!(
            first.public_key().to_openssh().unwrap(),
            second.public_key().to_openssh().unwrap()
        );
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("skpr-ssh-core-signer-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
