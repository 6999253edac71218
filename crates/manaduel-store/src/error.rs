/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The client handle has not called `connect()`, or has disconnected.
    #[error("store client is not connected")]
    NotConnected,

    /// A path or field key was malformed (empty segment, embedded `/`).
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    /// The backing store rejected or could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
