use console_plugin::PluginError;
use thiserror::Error;

use crate::cipher::CipherError;

/// Runtime failure taxonomy. Transport faults are user-facing and non-fatal;
/// decode faults kill the single call they occurred in; plugin faults carry
/// the offending plugin's name.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The server could not be reached at all. Tears down the keepalive.
    #[error("server unreachable")]
    Unreachable,

    /// The request timed out; worth retrying.
    #[error("request timed out")]
    Timeout,

    /// Any other transport-level failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response was neither recognisable plaintext nor decryptable.
    #[error("malformed server response: {0}")]
    Decode(String),

    /// An encrypted response arrived while no cipher is active.
    #[error("encrypted response but no cipher is active")]
    CipherMissing,

    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// A registered plugin's handler failed while processing its event.
    #[error("plugin `{plugin}` failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: PluginError,
    },
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Decode(err.to_string())
    }
}
