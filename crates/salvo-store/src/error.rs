use salvo_protocol::ProtocolError;

/// Errors from a session store.
///
/// "Not found" is never an error: lookups return `Ok(None)` or an empty
/// value. These variants mean the store itself misbehaved.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record exists but could not be decoded (or encoded).
    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: ProtocolError,
    },
}
