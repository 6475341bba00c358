//! Aggregated error type for the shared core crate.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Store { source: crate::store::Error },

    #[snafu(display("{source}"))]
    Signer { source: crate::signer::Error },

    #[snafu(display("{source}"))]
    Username { source: crate::username::Error },
}

impl From<crate::store::Error> for Error {
    fn from(source: crate::store::Error) -> Self { Self::Store { source } }
}

impl From<crate::signer::Error> for Error {
    fn from(source: crate::signer::Error) -> Self { Self::Signer { source } }
}

impl From<crate::username::Error> for Error {
    fn from(source: crate::username::Error) -> Self { Self::Username { source } }
}
