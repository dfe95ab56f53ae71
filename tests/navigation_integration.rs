use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use ftpilot::config::Config;
use ftpilot::mock_remote::{MockConnector, MockServer, dir, file};
use ftpilot::orchestrator::Orchestrator;
use ftpilot::remote::RemoteEntry;
use ftpilot::sink::{ChannelSink, UiEvent};

struct Harness {
    server: Arc<MockServer>,
    orch: Arc<Orchestrator>,
    rx: Receiver<UiEvent>,
}

fn temp_path(tag: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!(
        "ftpilot_nav_{}_{}_{}",
        tag,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    p
}

fn setup(tag: &str, entries: Vec<RemoteEntry>) -> Harness {
    let server = MockServer::with_listing(entries);
    let config = Config {
        downloads_dir: temp_path(&format!("{}_dl", tag)),
        session_file_path: temp_path(tag),
    };
    let (sink, rx) = ChannelSink::new();
    let orch = Orchestrator::new(config, Arc::new(MockConnector(server.clone())), Arc::new(sink));
    Harness { server, orch, rx }
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

fn connect(h: &Harness) {
    h.orch.start_connect("mockhost", "u", "p");
    wait_for_status(&h.rx, "Connected.");
}

#[test]
fn entering_a_directory_updates_path_and_listing() {
    let h = setup("enter", vec![dir("docs"), file("a.txt")]);
    connect(&h);

    h.orch.change_directory("docs");
    let seen = wait_for_status(&h.rx, "Double-click to enter, right-click to go up.");
    let seen = [seen, drain_for(&h.rx, 200)].concat();
    assert!(seen.contains(&UiEvent::RemotePath("/docs".to_string())));
    assert!(seen.iter().any(|ev| matches!(ev, UiEvent::Listing(_))));
    assert_eq!(h.orch.remote_dir(), "/docs");
}

#[test]
fn entering_a_file_is_refused_and_path_stays() {
    let h = setup("refuse_cwd", vec![file("notes.txt")]);
    connect(&h);
    h.server.refuse_cwd.store(true, Ordering::SeqCst);

    h.orch.change_directory("notes.txt");
    wait_for_status(&h.rx, "You cannot enter a file.");
    assert_eq!(h.orch.remote_dir(), "/");
}

#[test]
fn going_up_from_a_directory() {
    let h = setup("parent", vec![dir("docs")]);
    connect(&h);
    h.orch.change_directory("docs");
    wait_for_status(&h.rx, "Double-click to enter, right-click to go up.");

    h.orch.go_to_parent();
    let seen = wait_for_status(&h.rx, "Double-click to enter, right-click to go up.");
    assert!(seen.contains(&UiEvent::RemotePath("/".to_string())));
    assert_eq!(h.orch.remote_dir(), "/");
}

#[test]
fn refused_cdup_falls_back_to_the_root() {
    let h = setup("cdup", vec![dir("docs")]);
    connect(&h);
    h.orch.change_directory("docs");
    wait_for_status(&h.rx, "Double-click to enter, right-click to go up.");
    h.server.refuse_cdup.store(true, Ordering::SeqCst);

    h.orch.go_to_parent();
    wait_for_status(&h.rx, "Could not go up, returned to the root.");
    assert_eq!(h.orch.remote_dir(), "/");
    assert!(h.server.cwd_log.lock().unwrap().contains(&"/".to_string()));
}

#[test]
fn delete_dispatches_files_and_directories_by_listed_type() {
    let h = setup("delete", vec![file("a.txt"), dir("docs"), file("keep.txt")]);
    connect(&h);

    h.orch.delete(&["a.txt".to_string(), "docs".to_string()]);
    let seen = wait_for_status(&h.rx, "Entries deleted successfully.");
    assert!(seen.contains(&UiEvent::Status("Deleting entries...".to_string())));
    assert_eq!(
        h.server.deleted.lock().unwrap().clone(),
        vec!["file:a.txt".to_string(), "dir:docs".to_string()]
    );

    // The refresh right after the status no longer lists the removed names.
    let listing = drain_for(&h.rx, 300)
        .into_iter()
        .filter_map(|ev| match ev {
            UiEvent::Listing(names) => Some(names),
            _ => None,
        })
        .last()
        .expect("listing refreshed after delete");
    assert_eq!(listing, vec!["keep.txt".to_string()]);
}

#[test]
fn refused_deletes_are_collected_into_one_status() {
    let h = setup("delete_fail", vec![file("locked.bin"), file("a.txt")]);
    connect(&h);
    h.server.undeletable.lock().unwrap().insert("locked.bin".to_string());

    h.orch.delete(&["locked.bin".to_string(), "a.txt".to_string()]);
    wait_for_status(&h.rx, "Could not delete: locked.bin");
    assert_eq!(h.server.deleted.lock().unwrap().clone(), vec!["file:a.txt".to_string()]);
}

#[test]
fn deleting_nothing_says_so() {
    let h = setup("delete_empty", vec![file("a.txt")]);
    connect(&h);
    h.orch.delete(&[]);
    wait_for_status(&h.rx, "Nothing to delete.");
    assert!(h.server.deleted.lock().unwrap().is_empty());
}

#[test]
fn make_directory_reports_and_refreshes() {
    let h = setup("mkdir", vec![]);
    connect(&h);

    h.orch.make_directory("newdir");
    let seen = wait_for_status(&h.rx, "Directory newdir created.");
    assert!(seen.contains(&UiEvent::Status("Creating directory...".to_string())));
    assert_eq!(h.server.made_dirs.lock().unwrap().clone(), vec!["newdir".to_string()]);

    let listing = drain_for(&h.rx, 300)
        .into_iter()
        .filter_map(|ev| match ev {
            UiEvent::Listing(names) => Some(names),
            _ => None,
        })
        .last()
        .expect("listing refreshed after mkdir");
    assert!(listing.contains(&"newdir".to_string()));
}

#[test]
fn refused_mkdir_reports_the_name() {
    let h = setup("mkdir_fail", vec![]);
    connect(&h);
    h.server.refuse_mkdir.store(true, Ordering::SeqCst);

    h.orch.make_directory("newdir");
    wait_for_status(&h.rx, "Could not create the directory newdir.");
    assert!(h.server.made_dirs.lock().unwrap().is_empty());
}

#[test]
fn refresh_failure_reports_the_firewall_hint() {
    let h = setup("refresh_fail", vec![file("a.txt")]);
    connect(&h);
    h.server.fail_listing.store(true, Ordering::SeqCst);

    h.orch.refresh();
    wait_for_status(&h.rx, "Could not list the directory, check the firewall.");
}

#[test]
fn navigation_requires_a_session() {
    let h = setup("no_session", vec![]);
    h.orch.change_directory("docs");
    wait_for_status(&h.rx, "Not connected to any server.");
    h.orch.go_to_parent();
    wait_for_status(&h.rx, "Not connected to any server.");
    h.orch.delete(&["a.txt".to_string()]);
    wait_for_status(&h.rx, "Not connected to any server.");
    h.orch.make_directory("docs");
    wait_for_status(&h.rx, "Not connected to any server.");
    assert_eq!(h.server.connects.load(Ordering::SeqCst), 0);
}
