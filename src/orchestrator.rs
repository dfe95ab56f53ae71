use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ClientError;
use crate::config::Config;
use crate::creds::{self, ANONYMOUS_USER, Credentials};
use crate::remote::{AbortHandle, Connector, RemoteSession};
use crate::sink::UiSink;
use crate::worker::{self, Direction, Job, WorkerCtx};

/// Per-direction batch bookkeeping. `epoch` is a generation counter bumped
/// on every start and cancel; outcome reports carrying an older epoch are
/// ignored, so a late callback from a cancelled batch can never touch the
/// counters of a batch started afterwards.
#[derive(Default)]
struct BatchState {
    running: bool,
    epoch: u64,
    queued: u32,
    completed: u32,
    failed: Vec<String>,
    aborts: Vec<AbortHandle>,
}

impl BatchState {
    fn cancel(&mut self) {
        for handle in self.aborts.drain(..) {
            handle.abort();
        }
        self.epoch += 1;
        self.running = false;
        self.queued = 0;
        self.completed = 0;
        self.failed.clear();
    }
}

/// At most one connect attempt is in flight; a second request while one is
/// active is a cancellation, not a second attempt.
#[derive(Default)]
struct ConnectAttempt {
    active: bool,
    epoch: u64,
    abort: AbortHandle,
    /// Credentials of the in-flight attempt; promoted to the shared
    /// credentials only once the connect succeeds.
    pending: Option<Credentials>,
}

struct Shared {
    /// Last credentials that connected successfully; cloned into every
    /// transfer worker so each can open its own session.
    credentials: Option<Credentials>,
    /// The session promoted by a successful connect. Owned by the
    /// orchestrator and used from caller threads only; transfer workers
    /// never touch it.
    session: Option<Box<dyn RemoteSession>>,
    remote_dir: String,
    connected: bool,
    attempt: ConnectAttempt,
    upload: BatchState,
    download: BatchState,
}

impl Shared {
    fn batch_mut(&mut self, direction: Direction) -> &mut BatchState {
        match direction {
            Direction::Upload => &mut self.upload,
            Direction::Download => &mut self.download,
        }
    }
}

/// Owns batch lifecycle: spawns one worker per unit of work, aggregates
/// outcomes under a single lock, drives progress and status reporting and
/// exposes cancellation. Every public entry point runs on the caller's
/// thread and serializes through one mutex; workers report back through
/// `on_connect_result` / `on_job_outcome`.
pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn UiSink>,
    config: Config,
    state: Mutex<Shared>,
}

impl Orchestrator {
    pub fn new(config: Config, connector: Arc<dyn Connector>, sink: Arc<dyn UiSink>) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            connector,
            sink,
            config,
            state: Mutex::new(Shared {
                credentials: None,
                session: None,
                remote_dir: "/".to_string(),
                connected: false,
                attempt: ConnectAttempt::default(),
                upload: BatchState::default(),
                download: BatchState::default(),
            }),
        });
        // Prefill the login form from the previous session, if any.
        if let Some(prev) = creds::load_previous_session(&orchestrator.config.session_file_path) {
            orchestrator.sink.set_server_name(&prev.host);
            orchestrator.sink.set_user_name(&prev.user);
        }
        orchestrator
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        // A poisoned lock only means a worker panicked mid-report; the
        // counters are still commutative, keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate the login form and spawn a connect worker. Calling this
    /// while an attempt is in flight cancels that attempt instead.
    pub fn start_connect(self: &Arc<Self>, host: &str, user: &str, password: &str) {
        let host = host.trim().to_string();
        if host.is_empty() {
            self.sink.set_status(&ClientError::NoServerDefined.to_string());
            return;
        }
        let mut user = user.trim().to_string();
        if user.is_empty() {
            user = ANONYMOUS_USER.to_string();
            self.sink.set_user_name(&user);
        }

        let mut st = self.shared();
        if st.attempt.active {
            Self::cancel_attempt_locked(&mut st);
            self.sink.set_connecting(false);
            self.sink.set_status("Connect cancelled.");
            return;
        }

        let credentials = Credentials { host, user, password: password.to_string() };
        st.attempt.active = true;
        st.attempt.epoch += 1;
        st.attempt.abort = AbortHandle::new();
        st.attempt.pending = Some(credentials.clone());
        let epoch = st.attempt.epoch;
        let abort = st.attempt.abort.clone();
        self.sink.set_connecting(true);
        self.sink.set_status("Connecting...");
        drop(st);

        worker::spawn(WorkerCtx {
            orchestrator: self.clone(),
            connector: self.connector.clone(),
            credentials,
            job: Job::Connect,
            remote_dir: None,
            epoch,
            abort,
            downloads_dir: self.config.downloads_dir.clone(),
        });
    }

    /// Cancel the in-flight connect attempt, if any.
    pub fn cancel_connect(&self) {
        let mut st = self.shared();
        if !st.attempt.active {
            return;
        }
        Self::cancel_attempt_locked(&mut st);
        self.sink.set_connecting(false);
        self.sink.set_status("Connect cancelled.");
    }

    fn cancel_attempt_locked(st: &mut Shared) {
        st.attempt.abort.abort();
        st.attempt.epoch += 1;
        st.attempt.active = false;
        st.attempt.pending = None;
    }

    /// Invoked exactly once by a connect worker. A result from a cancelled
    /// attempt (stale epoch) is discarded entirely.
    pub(crate) fn on_connect_result(&self, epoch: u64, session: Option<Box<dyn RemoteSession>>) {
        let mut st = self.shared();
        if !st.attempt.active || epoch != st.attempt.epoch {
            if let Some(mut sess) = session {
                sess.disconnect();
            }
            tracing::debug!("ignoring stale connect result (epoch {})", epoch);
            return;
        }
        st.attempt.active = false;

        let Some(sess) = session else {
            st.attempt.pending = None;
            self.sink.set_connecting(false);
            self.sink.set_status(&ClientError::ConnectFailed.to_string());
            return;
        };

        st.session = Some(sess);
        let credentials = st.attempt.pending.take();
        if self.refresh_listing_locked(&mut st).is_err() {
            // Session stays promoted (it is live), but we do not enter the
            // connected view state; a later explicit refresh may recover.
            self.sink.set_connecting(false);
            self.sink.set_status(&ClientError::ListingFailed.to_string());
            return;
        }

        st.connected = true;
        st.credentials = credentials.clone();
        self.publish_remote_path(&mut st);
        self.sink.set_connecting(false);
        if let Some(c) = credentials {
            tracing::info!("connected to {} as {}", c.host, c.user);
            self.sink.set_server_name(&c.host);
            self.sink.set_user_name(&c.user);
            if let Err(e) = creds::save_previous_session(&self.config.session_file_path, &c) {
                tracing::warn!("cannot save session data: {:#}", e);
            }
        }
        self.sink.set_status("Connected.");
    }

    /// Upload the given local files to the current remote directory, one
    /// worker and one session per file. Calling this while an upload batch
    /// is running cancels that batch instead.
    pub fn start_upload_batch(self: &Arc<Self>, local_files: &[PathBuf]) {
        let mut st = self.shared();
        if st.upload.running {
            Self::cancel_batch_locked(&mut st, Direction::Upload);
            self.sink.set_uploading(false);
            self.publish_progress(&st);
            self.sink.set_status("Upload cancelled.");
            return;
        }
        if local_files.is_empty() {
            self.sink.set_status("Nothing to upload.");
            return;
        }
        let Some(credentials) = st.credentials.clone() else {
            self.sink.set_status(&ClientError::NotConnected.to_string());
            return;
        };

        let jobs: Vec<Job> =
            local_files.iter().map(|p| Job::Upload { local_path: p.clone() }).collect();
        self.sink.set_uploading(true);
        self.sink.set_status("Uploading files...");
        let ctxs = self.arm_batch_locked(&mut st, Direction::Upload, credentials, jobs);
        drop(st);
        for ctx in ctxs {
            worker::spawn(ctx);
        }
    }

    /// Download the given remote names into the downloads directory, one
    /// worker and one session per name. Calling this while a download batch
    /// is running cancels that batch instead.
    pub fn start_download_batch(self: &Arc<Self>, remote_names: &[String]) {
        let mut st = self.shared();
        if st.download.running {
            Self::cancel_batch_locked(&mut st, Direction::Download);
            self.sink.set_downloading(false);
            self.publish_progress(&st);
            self.sink.set_status("Download cancelled.");
            return;
        }
        if remote_names.is_empty() {
            self.sink.set_status("Nothing to download.");
            return;
        }
        let Some(credentials) = st.credentials.clone() else {
            self.sink.set_status(&ClientError::NotConnected.to_string());
            return;
        };
        if let Err(e) = std::fs::create_dir_all(&self.config.downloads_dir) {
            tracing::warn!(
                "cannot create downloads dir {}: {}",
                self.config.downloads_dir.display(),
                e
            );
            self.sink.set_status("Could not create the downloads folder.");
            return;
        }

        let jobs: Vec<Job> =
            remote_names.iter().map(|n| Job::Download { remote_name: n.clone() }).collect();
        self.sink.set_downloading(true);
        self.sink.set_status("Downloading files...");
        let ctxs = self.arm_batch_locked(&mut st, Direction::Download, credentials, jobs);
        drop(st);
        for ctx in ctxs {
            worker::spawn(ctx);
        }
    }

    /// Cancel a running batch: force-abort every worker session, reset the
    /// counters and bump the generation so late outcome reports are no-ops.
    pub fn cancel_batch(&self, direction: Direction) {
        let mut st = self.shared();
        if !st.batch_mut(direction).running {
            return;
        }
        Self::cancel_batch_locked(&mut st, direction);
        match direction {
            Direction::Upload => {
                self.sink.set_uploading(false);
                self.publish_progress(&st);
                self.sink.set_status("Upload cancelled.");
            }
            Direction::Download => {
                self.sink.set_downloading(false);
                self.publish_progress(&st);
                self.sink.set_status("Download cancelled.");
            }
        }
    }

    fn cancel_batch_locked(st: &mut Shared, direction: Direction) {
        st.batch_mut(direction).cancel();
    }

    /// Mark the batch running and build one worker context per job, all
    /// bound to the current remote directory snapshot.
    fn arm_batch_locked(
        self: &Arc<Self>,
        st: &mut Shared,
        direction: Direction,
        credentials: Credentials,
        jobs: Vec<Job>,
    ) -> Vec<WorkerCtx> {
        let remote_dir = st.remote_dir.clone();
        let batch = st.batch_mut(direction);
        batch.running = true;
        batch.epoch += 1;
        batch.queued = jobs.len() as u32;
        batch.completed = 0;
        batch.failed.clear();
        batch.aborts.clear();
        let epoch = batch.epoch;

        let mut ctxs = Vec::with_capacity(jobs.len());
        for job in jobs {
            let abort = AbortHandle::new();
            batch.aborts.push(abort.clone());
            ctxs.push(WorkerCtx {
                orchestrator: self.clone(),
                connector: self.connector.clone(),
                credentials: credentials.clone(),
                job,
                remote_dir: Some(remote_dir.clone()),
                epoch,
                abort,
                downloads_dir: self.config.downloads_dir.clone(),
            });
        }
        self.publish_progress(st);
        ctxs
    }

    /// Invoked exactly once per transfer worker. Success grows the numerator,
    /// failure shrinks the denominator; the batch finishes when the two meet,
    /// which can only happen at the last report of the generation.
    pub(crate) fn on_job_outcome(&self, direction: Direction, epoch: u64, success: bool, item: &str) {
        let mut st = self.shared();
        let batch = st.batch_mut(direction);
        if !batch.running || epoch != batch.epoch {
            tracing::debug!("ignoring stale {:?} outcome for '{}' (epoch {})", direction, item, epoch);
            return;
        }
        if success {
            batch.completed += 1;
        } else {
            batch.queued = batch.queued.saturating_sub(1);
            batch.failed.push(item.to_string());
        }
        let finished = batch.completed >= batch.queued;
        let failed = if finished {
            batch.running = false;
            batch.queued = 0;
            batch.completed = 0;
            batch.aborts.clear();
            Some(std::mem::take(&mut batch.failed))
        } else {
            None
        };

        self.publish_progress(&st);
        let Some(failed) = failed else {
            return;
        };

        tracing::info!("{:?} batch finished, {} item(s) failed", direction, failed.len());
        let status = match (direction, failed.is_empty()) {
            (Direction::Upload, true) => "Files uploaded successfully.".to_string(),
            (Direction::Download, true) => "Files downloaded successfully.".to_string(),
            (Direction::Upload, false) => ClientError::UploadFailed(failed.join(" ")).to_string(),
            (Direction::Download, false) => {
                ClientError::DownloadFailed(failed.join(" ")).to_string()
            }
        };
        match direction {
            Direction::Upload => self.sink.set_uploading(false),
            Direction::Download => self.sink.set_downloading(false),
        }
        self.sink.set_status(&status);
        let _ = self.refresh_listing_locked(&mut st);
    }

    /// Fetch the current directory's entries and publish the name list.
    pub fn refresh(&self) {
        let mut st = self.shared();
        if let Err(e) = self.refresh_listing_locked(&mut st) {
            self.sink.set_status(&e.to_string());
        }
    }

    fn refresh_listing_locked(&self, st: &mut Shared) -> Result<(), ClientError> {
        let Some(sess) = st.session.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        match sess.list() {
            Ok(entries) => {
                let names: Vec<String> = entries.into_iter().map(|e| e.name).collect();
                self.sink.set_listing(&names);
                Ok(())
            }
            Err(e) => {
                tracing::debug!("listing failed: {}", e);
                Err(ClientError::ListingFailed)
            }
        }
    }

    fn publish_remote_path(&self, st: &mut Shared) {
        let Some(sess) = st.session.as_mut() else {
            return;
        };
        match sess.working_dir() {
            Ok(path) => {
                st.remote_dir = path.clone();
                self.sink.set_remote_path(&path);
            }
            Err(e) => tracing::debug!("pwd failed: {}", e),
        }
    }

    /// Enter `name`. Refusal (the target is a file) is non-fatal and leaves
    /// the directory unchanged.
    pub fn change_directory(&self, name: &str) {
        let mut st = self.shared();
        let entered = match st.session.as_mut() {
            Some(sess) => sess.change_dir(name),
            None => {
                self.sink.set_status(&ClientError::NotConnected.to_string());
                return;
            }
        };
        match entered {
            Ok(true) => {
                self.sink.set_status("Double-click to enter, right-click to go up.");
                let _ = self.refresh_listing_locked(&mut st);
            }
            Ok(false) => self.sink.set_status("You cannot enter a file."),
            Err(e) => tracing::debug!("cwd {} failed: {}", name, e),
        }
        self.publish_remote_path(&mut st);
    }

    /// Go up one directory; if the server refuses, fall back to the root.
    /// The listing is refreshed afterwards either way.
    pub fn go_to_parent(&self) {
        let mut st = self.shared();
        let moved = match st.session.as_mut() {
            Some(sess) => sess.to_parent(),
            None => {
                self.sink.set_status(&ClientError::NotConnected.to_string());
                return;
            }
        };
        match moved {
            Ok(true) => {
                self.publish_remote_path(&mut st);
                self.sink.set_status("Double-click to enter, right-click to go up.");
            }
            Ok(false) => {
                if let Some(sess) = st.session.as_mut() {
                    let _ = sess.change_dir("/");
                }
                self.publish_remote_path(&mut st);
                self.sink.set_status("Could not go up, returned to the root.");
            }
            Err(e) => tracing::debug!("cdup failed: {}", e),
        }
        let _ = self.refresh_listing_locked(&mut st);
    }

    /// Remove the named entries, each as a file or a directory according to
    /// its type in a fresh listing. Failures are collected into one
    /// aggregate status; the listing is refreshed regardless of outcome.
    pub fn delete(&self, names: &[String]) {
        if names.is_empty() {
            self.sink.set_status("Nothing to delete.");
            return;
        }
        let mut st = self.shared();
        let Some(sess) = st.session.as_mut() else {
            self.sink.set_status(&ClientError::NotConnected.to_string());
            return;
        };
        self.sink.set_status("Deleting entries...");
        let entries = match sess.list() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("listing before delete failed: {}", e);
                Vec::new()
            }
        };
        let mut failed: Vec<String> = Vec::new();
        for name in names {
            for entry in entries.iter().filter(|e| &e.name == name) {
                let removed = if entry.is_file {
                    sess.delete_file(name)
                } else {
                    sess.remove_dir(name)
                };
                match removed {
                    Ok(true) => {}
                    Ok(false) => failed.push(name.clone()),
                    Err(e) => {
                        tracing::debug!("delete {} failed: {}", name, e);
                        failed.push(name.clone());
                    }
                }
            }
        }
        if failed.is_empty() {
            self.sink.set_status("Entries deleted successfully.");
        } else {
            self.sink.set_status(&ClientError::DeleteFailed(failed.join(" ")).to_string());
        }
        let _ = self.refresh_listing_locked(&mut st);
    }

    /// Create one directory in the current remote directory. The listing is
    /// refreshed regardless of outcome.
    pub fn make_directory(&self, name: &str) {
        let mut st = self.shared();
        let Some(sess) = st.session.as_mut() else {
            self.sink.set_status(&ClientError::NotConnected.to_string());
            return;
        };
        self.sink.set_status("Creating directory...");
        let status = match sess.make_dir(name) {
            Ok(true) => format!("Directory {} created.", name),
            Ok(false) => ClientError::MkdirFailed(name.to_string()).to_string(),
            Err(e) => {
                tracing::debug!("mkdir {} failed: {}", name, e);
                ClientError::MkdirFailed(name.to_string()).to_string()
            }
        };
        self.sink.set_status(&status);
        let _ = self.refresh_listing_locked(&mut st);
    }

    /// Tear everything down: cancel in-flight work, quit the current session
    /// and reset the view state.
    pub fn disconnect(&self) {
        let mut st = self.shared();
        Self::cancel_attempt_locked(&mut st);
        st.upload.cancel();
        st.download.cancel();
        if let Some(mut sess) = st.session.take() {
            sess.disconnect();
        }
        st.connected = false;
        st.credentials = None;
        st.remote_dir = "/".to_string();
        self.sink.set_connecting(false);
        self.sink.set_uploading(false);
        self.sink.set_downloading(false);
        self.publish_progress(&st);
        self.sink.set_status("Disconnected.");
    }

    fn publish_progress(&self, st: &Shared) {
        let queued = st.upload.queued + st.download.queued;
        let completed = st.upload.completed + st.download.completed;
        self.sink.set_progress(queued, completed);
    }

    // Read accessors for frontends that poll instead of listening.

    pub fn progress(&self) -> (u32, u32) {
        let st = self.shared();
        (st.upload.queued + st.download.queued, st.upload.completed + st.download.completed)
    }

    pub fn is_connected(&self) -> bool {
        self.shared().connected
    }

    pub fn is_connecting(&self) -> bool {
        self.shared().attempt.active
    }

    pub fn is_batch_running(&self, direction: Direction) -> bool {
        let mut st = self.shared();
        st.batch_mut(direction).running
    }

    pub fn remote_dir(&self) -> String {
        self.shared().remote_dir.clone()
    }
}
