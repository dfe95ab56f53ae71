use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::SessionError;

pub type SessionResult<T> = Result<T, SessionError>;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_file: bool,
}

/// Trait abstracting one logical connection to the server. A session supports
/// a single command pipeline and is NOT safe for concurrent use: exactly one
/// worker owns a session from connect to disconnect. Boolean returns mirror
/// the server saying "no" to an otherwise healthy request (login rejected,
/// file missing, cwd into a file); hard transport failures come back as
/// `SessionError`.
pub trait RemoteSession: Send {
    fn login(&mut self, user: &str, password: &str) -> SessionResult<bool>;
    fn set_binary(&mut self) -> SessionResult<()>;
    fn list(&mut self) -> SessionResult<Vec<RemoteEntry>>;
    fn store(&mut self, name: &str, source: &mut dyn Read) -> SessionResult<bool>;
    fn retrieve(&mut self, name: &str, sink: &mut dyn Write) -> SessionResult<bool>;
    fn delete_file(&mut self, name: &str) -> SessionResult<bool>;
    fn remove_dir(&mut self, name: &str) -> SessionResult<bool>;
    fn make_dir(&mut self, name: &str) -> SessionResult<bool>;
    fn change_dir(&mut self, path: &str) -> SessionResult<bool>;
    fn to_parent(&mut self) -> SessionResult<bool>;
    fn working_dir(&mut self) -> SessionResult<String>;
    /// Best-effort teardown; errors are swallowed.
    fn disconnect(&mut self);
}

/// Opens fresh logical connections. Shared across worker threads; every
/// concurrently running job gets its own physical session through this.
pub trait Connector: Send + Sync {
    /// Establish the transport. Implementations arm `abort` with whatever is
    /// needed to break a blocked call from another thread.
    fn connect(&self, host: &str, abort: &AbortHandle) -> SessionResult<Box<dyn RemoteSession>>;
}

/// Cooperative cancellation handle for one worker's session. Cancellation is
/// purely a forced connection shutdown: a worker blocked in a network call
/// cannot observe a flag, so `abort` breaks the socket under it instead.
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortState>,
}

#[derive(Default)]
struct AbortState {
    aborted: AtomicBool,
    stream: Mutex<Option<TcpStream>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the transport socket once the connection is up so a later
    /// `abort` can unblock an in-flight read or write.
    pub fn arm(&self, stream: TcpStream) {
        if let Ok(mut guard) = self.inner.stream.lock() {
            // The abort may already have been requested while connecting.
            if self.is_aborted() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            *guard = Some(stream);
        }
    }

    /// Force-close the session's transport. Any blocked network call in the
    /// owning worker fails with an I/O error; the worker then sees the
    /// aborted flag and classifies it as a cancellation.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        if let Ok(guard) = self.inner.stream.lock()
            && let Some(stream) = guard.as_ref()
        {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }
}
