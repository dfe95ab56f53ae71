use std::cell::RefCell;
use std::io::{Read, Write};

use ftp::types::FileType;
use ftp::{FtpError, FtpStream};

use crate::SessionError;
use crate::remote::{AbortHandle, Connector, RemoteEntry, RemoteSession, SessionResult};

const DEFAULT_FTP_PORT: u16 = 21;

/// Opens plain FTP control connections. The default port is used unless the
/// host string carries an explicit `host:port`.
#[derive(Debug, Clone)]
pub struct FtpConnector {
    pub port: u16,
}

impl Default for FtpConnector {
    fn default() -> Self {
        Self { port: DEFAULT_FTP_PORT }
    }
}

impl Connector for FtpConnector {
    fn connect(&self, host: &str, abort: &AbortHandle) -> SessionResult<Box<dyn RemoteSession>> {
        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:{}", host, self.port)
        };
        let stream = FtpStream::connect(addr.as_str()).map_err(|e| {
            if abort.is_aborted() {
                SessionError::Aborted
            } else {
                SessionError::Io(format!("{}: {}", addr, e))
            }
        })?;
        // Hand a clone of the control socket to the abort handle so a
        // cancellation can break a blocked call from another thread.
        match stream.get_ref().try_clone() {
            Ok(sock) => abort.arm(sock),
            Err(e) => tracing::debug!("could not clone control socket for abort: {}", e),
        }
        Ok(Box::new(FtpSession { stream, abort: abort.clone() }))
    }
}

/// Adapter that owns an `ftp::FtpStream` and implements `RemoteSession` so it
/// can be boxed into a trait object for worker use.
pub struct FtpSession {
    stream: FtpStream,
    abort: AbortHandle,
}

impl FtpSession {
    /// Hard transport/protocol failure. Checked against the abort flag first
    /// so a forced shutdown never masquerades as a remote failure.
    fn hard(&self, e: FtpError) -> SessionError {
        if self.abort.is_aborted() {
            return SessionError::Aborted;
        }
        match e {
            FtpError::ConnectionError(err) => SessionError::Io(err.to_string()),
            other => SessionError::Protocol(other.to_string()),
        }
    }

    /// A negative server reply to a healthy request maps to `Ok(false)`;
    /// anything else stays an error.
    fn soft(&self, e: FtpError) -> SessionResult<bool> {
        match e {
            FtpError::InvalidResponse(_) if !self.abort.is_aborted() => Ok(false),
            other => Err(self.hard(other)),
        }
    }
}

impl RemoteSession for FtpSession {
    fn login(&mut self, user: &str, password: &str) -> SessionResult<bool> {
        match self.stream.login(user, password) {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn set_binary(&mut self) -> SessionResult<()> {
        self.stream.transfer_type(FileType::Binary).map_err(|e| self.hard(e))
    }

    fn list(&mut self) -> SessionResult<Vec<RemoteEntry>> {
        let lines = self.stream.list(None).map_err(|e| self.hard(e))?;
        Ok(lines.iter().filter_map(|l| parse_list_line(l)).collect())
    }

    fn store(&mut self, name: &str, mut source: &mut dyn Read) -> SessionResult<bool> {
        match self.stream.put(name, &mut source) {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn retrieve(&mut self, name: &str, sink: &mut dyn Write) -> SessionResult<bool> {
        // RefCell because the ftp crate wants a Fn closure.
        let sink = RefCell::new(sink);
        let res = self.stream.retr(name, |reader| {
            let mut out = sink.borrow_mut();
            match std::io::copy(reader, &mut **out) {
                Ok(_) => Ok(()),
                Err(e) => Err(FtpError::ConnectionError(e)),
            }
        });
        match res {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn delete_file(&mut self, name: &str) -> SessionResult<bool> {
        match self.stream.rm(name) {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn remove_dir(&mut self, name: &str) -> SessionResult<bool> {
        match self.stream.rmdir(name) {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn make_dir(&mut self, name: &str) -> SessionResult<bool> {
        match self.stream.mkdir(name) {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn change_dir(&mut self, path: &str) -> SessionResult<bool> {
        match self.stream.cwd(path) {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn to_parent(&mut self) -> SessionResult<bool> {
        match self.stream.cdup() {
            Ok(()) => Ok(true),
            Err(e) => self.soft(e),
        }
    }

    fn working_dir(&mut self) -> SessionResult<String> {
        self.stream.pwd().map_err(|e| self.hard(e))
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.stream.quit() {
            tracing::debug!("quit failed (already torn down?): {}", e);
        }
    }
}

/// Parse one unix-style LIST line into a listing entry. Returns `None` for
/// blank lines, `.`/`..` and anything that does not look like a LIST row.
fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return None;
    }
    let is_dir = trimmed.starts_with('d');
    // The name starts after the eighth whitespace-delimited field.
    let mut rest = trimmed;
    for _ in 0..8 {
        let cut = rest.find(char::is_whitespace)?;
        rest = rest[cut..].trim_start();
    }
    if rest.is_empty() {
        return None;
    }
    // Symlink rows carry an arrow suffix.
    let name = rest.split(" -> ").next().unwrap_or(rest);
    if name == "." || name == ".." {
        return None;
    }
    Some(RemoteEntry { name: name.to_string(), is_file: !is_dir })
}
