use crossbeam_channel::{Receiver, Sender, unbounded};

/// Receives status text, listing snapshots and progress from the
/// orchestrator. Implementations are called from worker threads and from UI
/// caller threads alike, so they must be `Send + Sync` and should not block.
/// The orchestrator has no compile-time dependency on any presentation
/// layer; a GUI implements this trait, tests use `ChannelSink`.
pub trait UiSink: Send + Sync {
    fn set_status(&self, text: &str);
    fn set_listing(&self, names: &[String]);
    /// `(queued, completed)` aggregated over both directions.
    fn set_progress(&self, queued: u32, completed: u32);
    fn set_connecting(&self, on: bool);
    fn set_uploading(&self, on: bool);
    fn set_downloading(&self, on: bool);
    fn set_remote_path(&self, path: &str);
    fn set_server_name(&self, name: &str);
    fn set_user_name(&self, name: &str);
}

/// Everything the orchestrator can tell a UI, as a value. Mirrors `UiSink`
/// one to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Status(String),
    Listing(Vec<String>),
    Progress(u32, u32),
    Connecting(bool),
    Uploading(bool),
    Downloading(bool),
    RemotePath(String),
    ServerName(String),
    UserName(String),
}

/// Sink that forwards every notification onto an unbounded channel. Lets a
/// frontend (or a test) consume orchestrator output on its own thread
/// instead of being called back directly.
pub struct ChannelSink {
    tx: Sender<UiEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<UiEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn push(&self, event: UiEvent) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.tx.send(event);
    }
}

impl UiSink for ChannelSink {
    fn set_status(&self, text: &str) {
        self.push(UiEvent::Status(text.to_string()));
    }

    fn set_listing(&self, names: &[String]) {
        self.push(UiEvent::Listing(names.to_vec()));
    }

    fn set_progress(&self, queued: u32, completed: u32) {
        self.push(UiEvent::Progress(queued, completed));
    }

    fn set_connecting(&self, on: bool) {
        self.push(UiEvent::Connecting(on));
    }

    fn set_uploading(&self, on: bool) {
        self.push(UiEvent::Uploading(on));
    }

    fn set_downloading(&self, on: bool) {
        self.push(UiEvent::Downloading(on));
    }

    fn set_remote_path(&self, path: &str) {
        self.push(UiEvent::RemotePath(path.to_string()));
    }

    fn set_server_name(&self, name: &str) {
        self.push(UiEvent::ServerName(name.to_string()));
    }

    fn set_user_name(&self, name: &str) {
        self.push(UiEvent::UserName(name.to_string()));
    }
}

/// Sink that ignores everything. Useful for headless callers that only poll
/// the orchestrator's accessors.
pub struct NullSink;

impl UiSink for NullSink {
    fn set_status(&self, _text: &str) {}
    fn set_listing(&self, _names: &[String]) {}
    fn set_progress(&self, _queued: u32, _completed: u32) {}
    fn set_connecting(&self, _on: bool) {}
    fn set_uploading(&self, _on: bool) {}
    fn set_downloading(&self, _on: bool) {}
    fn set_remote_path(&self, _path: &str) {}
    fn set_server_name(&self, _name: &str) {}
    fn set_user_name(&self, _name: &str) {}
}
