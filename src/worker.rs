use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::SessionError;
use crate::creds::Credentials;
use crate::orchestrator::Orchestrator;
use crate::remote::{AbortHandle, Connector, RemoteSession, SessionResult};

/// Which way a batch moves files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// One unit of concurrent work. Every job, including transfers, opens its
/// own session: the session client cannot run concurrent command pipelines,
/// so correctness requires one physical session per running job.
#[derive(Debug, Clone)]
pub enum Job {
    Connect,
    Upload { local_path: PathBuf },
    Download { remote_name: String },
}

pub(crate) struct WorkerCtx {
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) credentials: Credentials,
    pub(crate) job: Job,
    /// Remote working directory snapshot taken when the batch started; later
    /// directory changes do not affect in-flight jobs. Absent for connects.
    pub(crate) remote_dir: Option<String>,
    /// Generation of the batch (or connect attempt) this job belongs to.
    pub(crate) epoch: u64,
    pub(crate) abort: AbortHandle,
    pub(crate) downloads_dir: PathBuf,
}

pub(crate) fn spawn(ctx: WorkerCtx) -> JoinHandle<()> {
    std::thread::spawn(move || run(ctx))
}

fn run(ctx: WorkerCtx) {
    let WorkerCtx {
        orchestrator,
        connector,
        credentials,
        job,
        remote_dir,
        epoch,
        abort,
        downloads_dir,
    } = ctx;

    let session = open_session(connector.as_ref(), &credentials, &abort);

    match job {
        Job::Connect => {
            if abort.is_aborted() {
                // The attempt was cancelled while we were connecting; the
                // orchestrator already discarded the attempt state, so this
                // worker reports nothing.
                if let Ok(mut sess) = session {
                    sess.disconnect();
                }
                tracing::debug!("connect worker aborted mid-flight, session dropped");
                return;
            }
            match session {
                Ok(sess) => orchestrator.on_connect_result(epoch, Some(sess)),
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}", credentials.host, e);
                    orchestrator.on_connect_result(epoch, None);
                }
            }
        }
        Job::Upload { local_path } => {
            let item = local_file_name(&local_path);
            let ok = match session {
                Ok(mut sess) => {
                    enter_remote_dir(sess.as_mut(), remote_dir.as_deref());
                    let ok = upload_one(sess.as_mut(), &local_path);
                    sess.disconnect();
                    ok
                }
                Err(e) => {
                    tracing::debug!("upload worker has no session: {}", e);
                    false
                }
            };
            // An aborted transfer still reports failure so the batch
            // denominator shrinks instead of waiting forever.
            orchestrator.on_job_outcome(Direction::Upload, epoch, ok, &item);
        }
        Job::Download { remote_name } => {
            let ok = match session {
                Ok(mut sess) => {
                    enter_remote_dir(sess.as_mut(), remote_dir.as_deref());
                    let ok = download_one(sess.as_mut(), &remote_name, &downloads_dir);
                    sess.disconnect();
                    ok
                }
                Err(e) => {
                    tracing::debug!("download worker has no session: {}", e);
                    false
                }
            };
            orchestrator.on_job_outcome(Direction::Download, epoch, ok, &remote_name);
        }
    }
}

/// Connect, log in and switch to binary mode on a fresh session owned by
/// this worker alone.
fn open_session(
    connector: &dyn Connector,
    creds: &Credentials,
    abort: &AbortHandle,
) -> SessionResult<Box<dyn RemoteSession>> {
    let mut sess = connector.connect(&creds.host, abort)?;
    match sess.login(&creds.user, &creds.password) {
        Ok(true) => {}
        Ok(false) => {
            sess.disconnect();
            return Err(SessionError::Protocol("login rejected".to_string()));
        }
        Err(e) => return Err(e),
    }
    sess.set_binary()?;
    Ok(sess)
}

/// Best-effort cd into the batch's directory snapshot; a failure is logged
/// but the transfer still runs from wherever the server left us.
fn enter_remote_dir(sess: &mut dyn RemoteSession, remote_dir: Option<&str>) {
    if let Some(dir) = remote_dir {
        match sess.change_dir(dir) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("server refused cwd into {}", dir),
            Err(e) => tracing::debug!("cwd into {} failed: {}", dir, e),
        }
    }
}

fn upload_one(sess: &mut dyn RemoteSession, local_path: &Path) -> bool {
    let name = local_file_name(local_path);
    if name.is_empty() {
        tracing::debug!("upload path {} has no usable file name", local_path.display());
        return false;
    }
    let mut file = match File::open(local_path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("cannot open {}: {}", local_path.display(), e);
            return false;
        }
    };
    match sess.store(&name, &mut file) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::debug!("store {} failed: {}", name, e);
            false
        }
    }
}

fn download_one(sess: &mut dyn RemoteSession, remote_name: &str, downloads_dir: &Path) -> bool {
    let target = downloads_dir.join(remote_name);
    let mut file = match File::create(&target) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("cannot create {}: {}", target.display(), e);
            return false;
        }
    };
    match sess.retrieve(remote_name, &mut file) {
        Ok(retrieved) => retrieved,
        Err(e) => {
            tracing::debug!("retrieve {} failed: {}", remote_name, e);
            false
        }
    }
}

fn local_file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
