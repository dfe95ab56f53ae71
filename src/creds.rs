use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Default user when the login form leaves the user field empty.
pub const ANONYMOUS_USER: &str = "Anonymous";

/// Login data captured once per connect attempt and cloned into every worker
/// spawned for that session's batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    pub password: String,
}

// The session file holds host, user and password in that fixed order, each
// as a big-endian u16 length prefix followed by the UTF-8 bytes. Existing
// session files on disk use this layout, so it must not change.

fn read_field(reader: &mut impl Read) -> Option<String> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len).ok()?;
    let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
    reader.read_exact(&mut buf).ok()?;
    String::from_utf8(buf).ok()
}

fn write_field(writer: &mut impl Write, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    let len = u16::try_from(bytes.len())
        .with_context(|| format!("session field too long ({} bytes)", bytes.len()))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Read the credentials of the last successful connect. A missing or corrupt
/// file is silently treated as "no previous session".
pub fn load_previous_session(path: &Path) -> Option<Credentials> {
    let mut file = File::open(path).ok()?;
    let host = read_field(&mut file)?;
    let user = read_field(&mut file)?;
    let password = read_field(&mut file)?;
    Some(Credentials { host, user, password })
}

/// Persist the credentials that just connected successfully.
pub fn save_previous_session(path: &Path, creds: &Credentials) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("cannot create session file {}", path.display()))?;
    write_field(&mut file, &creds.host)?;
    write_field(&mut file, &creds.user)?;
    write_field(&mut file, &creds.password)?;
    file.flush()?;
    Ok(())
}
