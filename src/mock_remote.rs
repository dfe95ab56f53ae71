//! Scripted in-memory remote used by the integration tests. Plays the role
//! of a real server: sessions share one `MockServer`, tests flip its knobs
//! and inspect what the orchestrator's workers did to it.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;

use crate::SessionError;
use crate::remote::{AbortHandle, Connector, RemoteEntry, RemoteSession, SessionResult};

pub fn file(name: &str) -> RemoteEntry {
    RemoteEntry { name: name.to_string(), is_file: true }
}

pub fn dir(name: &str) -> RemoteEntry {
    RemoteEntry { name: name.to_string(), is_file: false }
}

#[derive(Default)]
pub struct MockServer {
    pub listing: Mutex<Vec<RemoteEntry>>,
    /// Current remote working directory, shared by all sessions for
    /// inspection convenience.
    pub remote_dir: Mutex<String>,
    pub refuse_connect: AtomicBool,
    pub refuse_login: AtomicBool,
    pub fail_listing: AtomicBool,
    pub refuse_cwd: AtomicBool,
    pub refuse_cdup: AtomicBool,
    pub refuse_mkdir: AtomicBool,
    /// Names whose retrieve answers "no such file".
    pub missing_files: Mutex<HashSet<String>>,
    /// Names whose store is rejected by the server.
    pub rejected_stores: Mutex<HashSet<String>>,
    /// Names whose delete/rmdir is refused.
    pub undeletable: Mutex<HashSet<String>>,
    /// When set, every connect blocks until a token arrives (or the sender
    /// is dropped). Lets tests hold workers mid-connect.
    pub connect_gate: Mutex<Option<Receiver<()>>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub stored: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub made_dirs: Mutex<Vec<String>>,
    pub cwd_log: Mutex<Vec<String>>,
}

impl MockServer {
    pub fn with_listing(entries: Vec<RemoteEntry>) -> Arc<Self> {
        let server = Arc::new(Self::default());
        *server.remote_dir.lock().unwrap() = "/".to_string();
        *server.listing.lock().unwrap() = entries;
        server
    }
}

pub struct MockConnector(pub Arc<MockServer>);

impl Connector for MockConnector {
    fn connect(&self, _host: &str, abort: &AbortHandle) -> SessionResult<Box<dyn RemoteSession>> {
        let server = &self.0;
        server.connects.fetch_add(1, Ordering::SeqCst);
        let gate = server.connect_gate.lock().unwrap().clone();
        if let Some(rx) = gate {
            // Park here until the test releases us (send) or gives up (drop).
            let _ = rx.recv();
        }
        if abort.is_aborted() {
            return Err(SessionError::Aborted);
        }
        if server.refuse_connect.load(Ordering::SeqCst) {
            return Err(SessionError::Io("connection refused".to_string()));
        }
        Ok(Box::new(MockSession { server: server.clone(), abort: abort.clone() }))
    }
}

pub struct MockSession {
    server: Arc<MockServer>,
    abort: AbortHandle,
}

impl MockSession {
    fn check_abort(&self) -> SessionResult<()> {
        if self.abort.is_aborted() { Err(SessionError::Aborted) } else { Ok(()) }
    }
}

impl RemoteSession for MockSession {
    fn login(&mut self, _user: &str, _password: &str) -> SessionResult<bool> {
        self.check_abort()?;
        Ok(!self.server.refuse_login.load(Ordering::SeqCst))
    }

    fn set_binary(&mut self) -> SessionResult<()> {
        self.check_abort()
    }

    fn list(&mut self) -> SessionResult<Vec<RemoteEntry>> {
        self.check_abort()?;
        if self.server.fail_listing.load(Ordering::SeqCst) {
            return Err(SessionError::Io("listing failed".to_string()));
        }
        Ok(self.server.listing.lock().unwrap().clone())
    }

    fn store(&mut self, name: &str, source: &mut dyn Read) -> SessionResult<bool> {
        self.check_abort()?;
        let mut payload = Vec::new();
        source.read_to_end(&mut payload).map_err(|e| SessionError::Io(e.to_string()))?;
        if self.server.rejected_stores.lock().unwrap().contains(name) {
            return Ok(false);
        }
        self.server.stored.lock().unwrap().push(name.to_string());
        self.server.listing.lock().unwrap().push(file(name));
        Ok(true)
    }

    fn retrieve(&mut self, name: &str, sink: &mut dyn Write) -> SessionResult<bool> {
        self.check_abort()?;
        if self.server.missing_files.lock().unwrap().contains(name) {
            return Ok(false);
        }
        sink.write_all(format!("contents of {}", name).as_bytes())
            .map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(true)
    }

    fn delete_file(&mut self, name: &str) -> SessionResult<bool> {
        self.check_abort()?;
        if self.server.undeletable.lock().unwrap().contains(name) {
            return Ok(false);
        }
        self.server.listing.lock().unwrap().retain(|e| e.name != name);
        self.server.deleted.lock().unwrap().push(format!("file:{}", name));
        Ok(true)
    }

    fn remove_dir(&mut self, name: &str) -> SessionResult<bool> {
        self.check_abort()?;
        if self.server.undeletable.lock().unwrap().contains(name) {
            return Ok(false);
        }
        self.server.listing.lock().unwrap().retain(|e| e.name != name);
        self.server.deleted.lock().unwrap().push(format!("dir:{}", name));
        Ok(true)
    }

    fn make_dir(&mut self, name: &str) -> SessionResult<bool> {
        self.check_abort()?;
        if self.server.refuse_mkdir.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.server.made_dirs.lock().unwrap().push(name.to_string());
        self.server.listing.lock().unwrap().push(dir(name));
        Ok(true)
    }

    fn change_dir(&mut self, path: &str) -> SessionResult<bool> {
        self.check_abort()?;
        self.server.cwd_log.lock().unwrap().push(path.to_string());
        if self.server.refuse_cwd.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut dir = self.server.remote_dir.lock().unwrap();
        if path.starts_with('/') {
            *dir = path.to_string();
        } else if dir.ends_with('/') {
            *dir = format!("{}{}", dir, path);
        } else {
            *dir = format!("{}/{}", dir, path);
        }
        Ok(true)
    }

    fn to_parent(&mut self) -> SessionResult<bool> {
        self.check_abort()?;
        if self.server.refuse_cdup.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut dir = self.server.remote_dir.lock().unwrap();
        let parent = match dir.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => dir[..idx].to_string(),
        };
        *dir = parent;
        Ok(true)
    }

    fn working_dir(&mut self) -> SessionResult<String> {
        self.check_abort()?;
        Ok(self.server.remote_dir.lock().unwrap().clone())
    }

    fn disconnect(&mut self) {
        self.server.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
