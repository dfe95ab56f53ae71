/// Orchestrator-level failure taxonomy. Every variant is recovered at the
/// worker or orchestrator boundary and surfaced as status text through the
/// UI sink; none of these propagate as fatal errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Empty host field after trimming.
    NoServerDefined,
    /// An operation that needs a live session was requested before connect.
    NotConnected,
    ConnectFailed,
    /// Post-connect or post-batch listing fetch failed.
    ListingFailed,
    /// Space-joined names of the files that failed to upload.
    UploadFailed(String),
    /// Space-joined names of the files that failed to download.
    DownloadFailed(String),
    /// Space-joined names of the entries that could not be removed.
    DeleteFailed(String),
    MkdirFailed(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ClientError::*;
        match self {
            NoServerDefined => write!(f, "No server defined."),
            NotConnected => write!(f, "Not connected to any server."),
            ConnectFailed => write!(f, "Connect failed."),
            ListingFailed => write!(f, "Could not list the directory, check the firewall."),
            UploadFailed(names) => write!(f, "Error uploading: {}", names),
            DownloadFailed(names) => write!(f, "Error downloading: {}", names),
            DeleteFailed(names) => write!(f, "Could not delete: {}", names),
            MkdirFailed(name) => write!(f, "Could not create the directory {}.", name),
        }
    }
}

impl std::error::Error for ClientError {}

/// Wire-level errors reported by a `RemoteSession`. A forced shutdown from
/// another thread surfaces as `Aborted` so cancellation is never mistaken
/// for a genuine remote failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Transport failure (TCP connect, read/write, unexpected close).
    Io(String),
    /// The server answered, but with something the client cannot use.
    Protocol(String),
    /// The session was force-closed by a cancellation request.
    Aborted,
}

impl SessionError {
    pub fn is_abort(&self) -> bool {
        matches!(self, SessionError::Aborted)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(msg) => write!(f, "transfer/IO error: {}", msg),
            SessionError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            SessionError::Aborted => write!(f, "session aborted"),
        }
    }
}

impl std::error::Error for SessionError {}
