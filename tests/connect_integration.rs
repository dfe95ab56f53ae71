use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use ftpilot::config::Config;
use ftpilot::creds::{self, Credentials};
use ftpilot::mock_remote::{MockConnector, MockServer, dir, file};
use ftpilot::orchestrator::Orchestrator;
use ftpilot::remote::RemoteEntry;
use ftpilot::sink::{ChannelSink, UiEvent};

struct Harness {
    server: Arc<MockServer>,
    orch: Arc<Orchestrator>,
    rx: Receiver<UiEvent>,
    session_file: PathBuf,
}

fn temp_path(tag: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!(
        "ftpilot_connect_{}_{}_{}",
        tag,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    p
}

fn setup(tag: &str, entries: Vec<RemoteEntry>) -> Harness {
    let server = MockServer::with_listing(entries);
    let downloads_dir = temp_path(&format!("{}_dl", tag));
    let session_file = temp_path(&format!("{}_session", tag));
    let config = Config { downloads_dir, session_file_path: session_file.clone() };
    let (sink, rx) = ChannelSink::new();
    let orch = Orchestrator::new(config, Arc::new(MockConnector(server.clone())), Arc::new(sink));
    Harness { server, orch, rx, session_file }
}

fn wait_for_status(rx: &Receiver<UiEvent>, needle: &str) -> Vec<UiEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        if let Ok(ev) = rx.recv_timeout(Duration::from_millis(100)) {
            let hit = matches!(&ev, UiEvent::Status(s) if s == needle);
            seen.push(ev);
            if hit {
                return seen;
            }
        }
    }
    panic!("timed out waiting for status '{}'; saw: {:?}", needle, seen);
}

fn drain_for(rx: &Receiver<UiEvent>, ms: u64) -> Vec<UiEvent> {
    let deadline = Instant::now() + Duration::from_millis(ms);
    let mut seen = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(ev) => seen.push(ev),
            Err(_) => break,
        }
    }
    seen
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting until {}", what);
}

#[test]
fn connect_success_publishes_listing_and_saves_session() {
    let h = setup("success", vec![file("a.txt"), dir("docs")]);
    h.orch.start_connect("mockhost", "carol", "secret");
    let seen = wait_for_status(&h.rx, "Connected.");

    assert!(h.orch.is_connected());
    assert!(!h.orch.is_connecting());
    assert!(seen.contains(&UiEvent::Connecting(true)));
    assert!(seen.contains(&UiEvent::Connecting(false)));
    assert!(seen.contains(&UiEvent::Listing(vec!["a.txt".to_string(), "docs".to_string()])));
    assert!(seen.contains(&UiEvent::RemotePath("/".to_string())));

    let saved = creds::load_previous_session(&h.session_file).expect("session file written");
    assert_eq!(
        saved,
        Credentials {
            host: "mockhost".to_string(),
            user: "carol".to_string(),
            password: "secret".to_string(),
        }
    );
    let _ = std::fs::remove_file(&h.session_file);
}

#[test]
fn empty_host_reports_validation_and_spawns_nothing() {
    let h = setup("empty_host", vec![]);
    h.orch.start_connect("   ", "u", "p");
    wait_for_status(&h.rx, "No server defined.");
    assert_eq!(h.server.connects.load(Ordering::SeqCst), 0);
    assert!(!h.orch.is_connecting());
}

#[test]
fn empty_user_defaults_to_anonymous() {
    let h = setup("anon", vec![]);
    h.orch.start_connect("mockhost", "  ", "p");
    let seen = wait_for_status(&h.rx, "Connected.");
    assert!(seen.contains(&UiEvent::UserName("Anonymous".to_string())));
}

#[test]
fn refused_connection_reports_connect_failed() {
    let h = setup("refused", vec![]);
    h.server.refuse_connect.store(true, Ordering::SeqCst);
    h.orch.start_connect("mockhost", "u", "p");
    wait_for_status(&h.rx, "Connect failed.");
    assert!(!h.orch.is_connected());
    assert!(!h.orch.is_connecting());
}

#[test]
fn rejected_login_reports_connect_failed() {
    let h = setup("badlogin", vec![]);
    h.server.refuse_login.store(true, Ordering::SeqCst);
    h.orch.start_connect("mockhost", "u", "wrong");
    wait_for_status(&h.rx, "Connect failed.");
    assert!(!h.orch.is_connected());
    // The worker disposed its session instead of handing it over.
    assert_eq!(h.server.disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn listing_failure_withholds_connected_state() {
    let h = setup("firewall", vec![file("a.txt")]);
    h.server.fail_listing.store(true, Ordering::SeqCst);
    h.orch.start_connect("mockhost", "u", "p");
    wait_for_status(&h.rx, "Could not list the directory, check the firewall.");
    assert!(!h.orch.is_connected());
    // No successful connect, no persisted session.
    assert!(creds::load_previous_session(&h.session_file).is_none());
}

#[test]
fn second_connect_cancels_the_first() {
    let h = setup("cancel", vec![file("a.txt")]);
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    *h.server.connect_gate.lock().unwrap() = Some(gate_rx);

    h.orch.start_connect("mockhost", "u", "p");
    wait_until("first worker reaches connect", || {
        h.server.connects.load(Ordering::SeqCst) == 1
    });

    // Second click while the attempt is pending: cancellation, not a retry.
    h.orch.start_connect("mockhost", "u", "p");
    wait_for_status(&h.rx, "Connect cancelled.");
    assert!(!h.orch.is_connecting());
    assert!(!h.orch.is_connected());

    // Release the parked worker; its late result must change nothing.
    drop(gate_tx);
    let late = drain_for(&h.rx, 400);
    for ev in &late {
        if let UiEvent::Status(s) = ev {
            assert_ne!(s, "Connected.");
            assert_ne!(s, "Connect failed.");
        }
    }
    assert_eq!(h.server.connects.load(Ordering::SeqCst), 1);
    assert!(!h.orch.is_connected());
}

#[test]
fn previous_session_prefills_login_form() {
    let session_file = temp_path("prefill_session");
    let prev = Credentials {
        host: "ftp.example.com".to_string(),
        user: "carol".to_string(),
        password: "secret".to_string(),
    };
    creds::save_previous_session(&session_file, &prev).expect("seed session file");

    let server = MockServer::with_listing(vec![]);
    let config =
        Config { downloads_dir: temp_path("prefill_dl"), session_file_path: session_file.clone() };
    let (sink, rx) = ChannelSink::new();
    let _orch = Orchestrator::new(config, Arc::new(MockConnector(server)), Arc::new(sink));

    let seen = drain_for(&rx, 200);
    assert!(seen.contains(&UiEvent::ServerName("ftp.example.com".to_string())));
    assert!(seen.contains(&UiEvent::UserName("carol".to_string())));
    let _ = std::fs::remove_file(&session_file);
}

#[test]
fn disconnect_resets_view_state() {
    let h = setup("disconnect", vec![file("a.txt")]);
    h.orch.start_connect("mockhost", "u", "p");
    wait_for_status(&h.rx, "Connected.");

    h.orch.disconnect();
    wait_for_status(&h.rx, "Disconnected.");
    assert!(!h.orch.is_connected());
    assert_eq!(h.orch.progress(), (0, 0));
    assert_eq!(h.server.disconnects.load(Ordering::SeqCst), 1);
}
