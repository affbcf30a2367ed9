//! Tool errors.

use std::{io, path::PathBuf};

use duet_core::StateError;
use duet_crypto::CryptoError;
use duet_proto::ProtocolError;
use thiserror::Error;

/// Errors from a tool command.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Reading or writing a file failed
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A key file or argument is not valid hex
    #[error("{what} is not valid hex: {source}")]
    Hex {
        /// What was being parsed
        what: &'static str,
        /// Underlying error
        #[source]
        source: hex::FromHexError,
    },

    /// The message header carries no escrow package
    #[error("message carries no escrow package")]
    NotEscrowed,

    /// Writing to stdout failed
    #[error("output failed: {0}")]
    Output(#[from] io::Error),

    /// Key material was rejected
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A wire structure failed to encode or decode
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A state document failed to export, import or open
    #[error(transparent)]
    State(#[from] StateError),
}

impl ToolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
