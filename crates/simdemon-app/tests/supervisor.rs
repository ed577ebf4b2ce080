//! End-to-end Session Supervisor tests
//!
//! The simulator is faked: `DeviceControl` runs `sh` scripts as the app
//! console and window processes, and writes real log and crash files into a
//! temporary directory, so process exit, log tailing, lifecycle detection and
//! crash correlation all run for real.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use simdemon_app::{
    watch_results, LaunchOptions, LaunchStream, LifecycleEvent, SessionSupervisor,
    SupervisorConfig,
};
use simdemon_core::{
    issue_ids, DetectionResult, DeviceRuntime, Error, LogSource, ProcessEvent, ProcessRole,
    Result, SessionKind, SessionState,
};
use simdemon_daemon::test_utils::{detection, device, watch};
use simdemon_daemon::{CrashCorrelator, DeviceControl, ManagedProcess, RuntimeDetector};

const BUNDLE_ID: &str = "com.example.TestApp";
const WATCH_BUNDLE_ID: &str = "com.example.TestApp.watchkitapp";
const STREAM_TIMEOUT: Duration = Duration::from_secs(20);

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

struct FixedCatalog(DetectionResult);

impl RuntimeDetector for FixedCatalog {
    async fn detect(&self) -> DetectionResult {
        self.0.clone()
    }
}

#[derive(Clone, Default)]
struct FakeSimulator {
    /// Shell script run as the app after it prints its launch line
    app_script: String,
    watch_script: String,
    never_boots: bool,
    /// Errors `is_booted` returns, last first, before answering normally
    boot_check_errors: Arc<Mutex<Vec<Error>>>,
    /// Device whose `install` fails
    fail_install_on: Option<String>,
    container: Option<PathBuf>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSimulator {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl DeviceControl for FakeSimulator {
    async fn boot(&self, device: &DeviceRuntime) -> Result<()> {
        self.record(format!("boot {}", device.udid));
        Ok(())
    }

    async fn is_booted(&self, _device: &DeviceRuntime) -> Result<bool> {
        if let Some(e) = self.boot_check_errors.lock().unwrap().pop() {
            return Err(e);
        }
        Ok(!self.never_boots)
    }

    async fn open_window(
        &self,
        device: &DeviceRuntime,
        activate: bool,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ManagedProcess> {
        self.record(format!("window {} activate={}", device.udid, activate));
        ManagedProcess::spawn(ProcessRole::Device, "sleep", ["30"], event_tx)
    }

    async fn install(&self, device: &DeviceRuntime, app: &Path) -> Result<()> {
        self.record(format!(
            "install {} {}",
            device.udid,
            app.file_name().unwrap().to_string_lossy()
        ));
        if self.fail_install_on.as_deref() == Some(device.udid.as_str()) {
            return Err(Error::simctl("install failed: No space left on device"));
        }
        Ok(())
    }

    async fn launch_app(
        &self,
        device: &DeviceRuntime,
        bundle_id: &str,
        role: ProcessRole,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ManagedProcess> {
        self.record(format!("launch {} {}", device.udid, bundle_id));
        let body = match role {
            ProcessRole::CompanionConsole => &self.watch_script,
            _ => &self.app_script,
        };
        let script = format!("echo '{}: '$$; {}", bundle_id, body);
        ManagedProcess::spawn(role, "sh", ["-c", script.as_str()], event_tx)
    }

    async fn terminate_app(&self, device: &DeviceRuntime, bundle_id: &str) -> Result<()> {
        self.record(format!("terminate {} {}", device.udid, bundle_id));
        Ok(())
    }

    async fn app_data_container(
        &self,
        _device: &DeviceRuntime,
        _bundle_id: &str,
    ) -> Result<Option<PathBuf>> {
        Ok(self.container.clone())
    }

    async fn shutdown(&self, device: &DeviceRuntime) -> Result<()> {
        self.record(format!("shutdown {}", device.udid));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().unwrap(),
        };
        std::fs::create_dir_all(fixture.crash_dir()).unwrap();
        std::fs::write(fixture.system_log(), "stale line from an earlier boot\n").unwrap();
        fixture
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn crash_dir(&self) -> PathBuf {
        self.path().join("DiagnosticReports")
    }

    fn system_log(&self) -> PathBuf {
        self.path().join("system.log")
    }

    /// A `TestApp.app` bundle, optionally with a watch app inside
    fn bundle(&self, with_watch: bool) -> PathBuf {
        let app = self.path().join("TestApp.app");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join("Info.plist"), plist(BUNDLE_ID, "TestApp")).unwrap();

        if with_watch {
            let watch_app = app.join("Watch").join("TestWatchApp.app");
            std::fs::create_dir_all(&watch_app).unwrap();
            std::fs::write(
                watch_app.join("Info.plist"),
                plist(WATCH_BUNDLE_ID, "TestWatchApp"),
            )
            .unwrap();
        }
        app
    }

    fn catalog(&self, paired: bool) -> FixedCatalog {
        let phone = device("PHONE", "17.2").system_log(self.system_log()).build();
        let watch = watch("WATCH", "10.2").build();
        let pairs: &[(&str, &str)] = if paired { &[("WATCH", "PHONE")] } else { &[] };
        FixedCatalog(detection(vec![phone], vec![watch], pairs))
    }

    fn config(&self) -> SupervisorConfig {
        SupervisorConfig {
            boot_timeout: Duration::from_secs(5),
            boot_poll_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_millis(500),
            activate_window: false,
            tailer_poll_interval: Duration::from_millis(20),
            crash_grace_period: Duration::from_millis(400),
            crash_poll_interval: Duration::from_millis(50),
            crash_dir: Some(self.crash_dir()),
            auto_exit_idle: Duration::from_secs(5),
            companion_boot_timeout: Duration::from_secs(5),
            ..SupervisorConfig::default()
        }
    }

    fn supervisor(
        &self,
        paired: bool,
        simulator: FakeSimulator,
    ) -> SessionSupervisor<FixedCatalog, FakeSimulator> {
        SessionSupervisor::new(self.catalog(paired), simulator, self.config())
    }
}

fn plist(bundle_id: &str, executable: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>{bundle_id}</string>
	<key>CFBundleExecutable</key>
	<string>{executable}</string>
</dict>
</plist>
"#
    )
}

async fn next_event(stream: &mut LaunchStream) -> Option<LifecycleEvent> {
    timeout(STREAM_TIMEOUT, stream.next())
        .await
        .expect("event stream stalled")
}

/// Every event until the stream closes
async fn collect(mut stream: LaunchStream) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(&mut stream).await {
        events.push(event);
    }
    events
}

/// Events up to and including the first one named `name`
async fn collect_until(stream: &mut LaunchStream, name: &str) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(stream).await {
        let done = event.name() == name;
        events.push(event);
        if done {
            return events;
        }
    }
    panic!("stream closed before {name}: {:?}", names(&events));
}

fn names(events: &[LifecycleEvent]) -> Vec<&'static str> {
    events.iter().map(LifecycleEvent::name).collect()
}

fn count(events: &[LifecycleEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

fn position(events: &[LifecycleEvent], name: &str) -> usize {
    events
        .iter()
        .position(|e| e.name() == name)
        .unwrap_or_else(|| panic!("no {name} in {:?}", names(events)))
}

fn log_lines<'a>(events: &'a [LifecycleEvent], wanted: &LogSource) -> Vec<&'a str> {
    events
        .iter()
        .filter_map(|e| match e {
            LifecycleEvent::Log { source, line, .. } if source == wanted => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Launch scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_launch_with_auto_exit_reports_clean_quit() {
    let fixture = Fixture::new();
    let app = fixture.bundle(false);
    let simulator = FakeSimulator {
        app_script: format!(
            "echo 'TestApp['$$']: hello from syslog' >> '{}'; \
             echo hello; echo '[INFO] RESULT_START'; echo '[INFO] {{\"foo\":\"bar\"}}'; \
             echo '[INFO] RESULT_STOP'; sleep 0.3; exit 0",
            fixture.system_log().display()
        ),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator.clone());

    let stream = supervisor.launch(None, LaunchOptions::new().app_path(&app).auto_exit(true));
    let handle = stream.handle().clone();
    let events = collect(stream).await;

    assert_eq!(count(&events, "launched"), 1, "{:?}", names(&events));
    assert_eq!(count(&events, "app-started"), 1, "{:?}", names(&events));
    assert_eq!(count(&events, "app-quit"), 1, "{:?}", names(&events));
    assert_eq!(count(&events, "error"), 0);
    assert!(count(&events, "log") > 0);
    assert!(position(&events, "launched") < position(&events, "app-started"));
    assert!(position(&events, "app-started") < position(&events, "app-quit"));

    let quit = events.iter().find(|e| e.name() == "app-quit").unwrap();
    assert!(matches!(quit, LifecycleEvent::AppQuit { crash: None, .. }));

    let result = events
        .iter()
        .find_map(|e| match e {
            LifecycleEvent::StructuredResult { result, .. } => Some(result.clone()),
            _ => None,
        })
        .expect("structured result");
    assert_eq!(result, Ok(json!({"foo": "bar"})));

    let console = log_lines(&events, &LogSource::AppConsole);
    assert!(console.contains(&"hello"));
    let system = log_lines(&events, &LogSource::SystemLog);
    assert!(system.iter().any(|l| l.contains("hello from syslog")));
    assert!(!system.iter().any(|l| l.contains("stale line")));

    assert_eq!(handle.state(), SessionState::Stopped);
    let calls = simulator.calls();
    assert!(calls.contains(&"boot PHONE".to_string()));
    assert!(calls.contains(&"install PHONE TestApp.app".to_string()));
    assert!(calls.contains(&format!("launch PHONE {}", BUNDLE_ID)));
    assert!(calls.contains(&"shutdown PHONE".to_string()));
}

#[tokio::test]
async fn test_crash_is_reported_with_report_files() {
    let fixture = Fixture::new();
    let app = fixture.bundle(false);
    let report = fixture
        .crash_dir()
        .join("TestApp_2026-01-01-120000_host.crash");
    let simulator = FakeSimulator {
        app_script: format!(
            "echo 'about to crash'; sleep 0.1; echo 'Exception' > '{}'; exit 1",
            report.display()
        ),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator);

    let mut stream = supervisor.launch(None, LaunchOptions::new().app_path(&app));
    let events = collect_until(&mut stream, "app-quit").await;

    let crash = match events.last() {
        Some(LifecycleEvent::AppQuit {
            crash: Some(crash), ..
        }) => crash.clone(),
        other => panic!("expected a crash, got {:?}", other),
    };
    assert_eq!(crash.crash_files, vec![report.clone()]);
    assert!(crash.crash_files.iter().all(|f| f.exists()));
    assert_eq!(crash.to_string(), "App crashed in the iOS Simulator");

    // The handle is still open; stopping it completes cleanly
    timeout(Duration::from_secs(10), stream.stop())
        .await
        .expect("stop completes");
    assert_eq!(stream.handle().state(), SessionState::Stopped);
    while next_event(&mut stream).await.is_some() {}

    // Files belong to the caller
    assert!(report.exists());
    crash.remove_files().unwrap();
    let rescan = CrashCorrelator::new(fixture.crash_dir(), SystemTime::UNIX_EPOCH);
    assert!(rescan.scan("TestApp").is_empty());
}

#[tokio::test]
async fn test_launch_without_app_never_reports_app_events() {
    let fixture = Fixture::new();
    let simulator = FakeSimulator::default();
    let supervisor = fixture.supervisor(false, simulator.clone());

    let mut stream = supervisor.launch(Some("PHONE"), LaunchOptions::new());
    let events = collect_until(&mut stream, "launched").await;
    match events.last() {
        Some(LifecycleEvent::Launched {
            primary,
            companion,
            issues,
        }) => {
            assert_eq!(primary.udid().as_deref(), Some("PHONE"));
            assert_eq!(primary.state(), SessionState::Ready);
            assert!(companion.is_none());
            assert!(issues.is_empty());
        }
        other => panic!("expected launched, got {:?}", other),
    }

    std::fs::OpenOptions::new()
        .append(true)
        .open(fixture.system_log())
        .and_then(|mut f| std::io::Write::write_all(&mut f, b"PHONE: manual inspection\n"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    stream.stop().await;
    let mut rest = Vec::new();
    while let Some(event) = next_event(&mut stream).await {
        rest.push(event);
    }

    assert_eq!(count(&rest, "app-started"), 0);
    assert_eq!(count(&rest, "app-quit"), 0);
    assert!(log_lines(&rest, &LogSource::SystemLog).contains(&"PHONE: manual inspection"));
    assert!(!simulator.calls().iter().any(|c| c.starts_with("install")));
}

#[tokio::test]
async fn test_device_without_system_log_still_launches() {
    let fixture = Fixture::new();
    let fresh = device("FRESH", "17.2").without_system_log().build();
    let catalog = FixedCatalog(detection(vec![fresh], vec![], &[]));
    let simulator = FakeSimulator::default();
    let supervisor = SessionSupervisor::new(catalog, simulator.clone(), fixture.config());

    let mut stream = supervisor.launch(Some("FRESH"), LaunchOptions::new());
    let events = collect_until(&mut stream, "launched").await;

    let handle = stream.handle().clone();
    assert_eq!(handle.state(), SessionState::Ready);
    assert!(!handle.status().log_sources.contains(&LogSource::SystemLog));
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::Debug { message, .. } if message.contains("no system log")
    )));

    stream.stop().await;
    while next_event(&mut stream).await.is_some() {}
    assert_eq!(handle.state(), SessionState::Stopped);
    assert!(simulator.calls().contains(&"boot FRESH".to_string()));
}

#[tokio::test]
async fn test_log_file_in_data_container_is_followed() {
    let fixture = Fixture::new();
    let app = fixture.bundle(false);
    let container = fixture.path().join("container");
    std::fs::create_dir_all(container.join("Documents")).unwrap();
    let log_file = container.join("Documents").join("app.log");

    let simulator = FakeSimulator {
        app_script: format!(
            "sleep 0.1; echo 'written to file' >> '{}'; sleep 0.3",
            log_file.display()
        ),
        container: Some(container.clone()),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator);

    let stream = supervisor.launch(
        None,
        LaunchOptions::new()
            .app_path(&app)
            .log_filename("app.log")
            .auto_exit(true),
    );
    let events = collect(stream).await;

    assert!(count(&events, "log-file") > 0, "{:?}", names(&events));
    assert_eq!(
        log_lines(&events, &LogSource::AppLogFile(log_file)),
        vec!["written to file"]
    );
}

#[tokio::test]
async fn test_watch_results_yields_first_result() {
    let fixture = Fixture::new();
    let app = fixture.bundle(false);
    let simulator = FakeSimulator {
        app_script: "echo RESULT_START; echo '[1, 2, 3]'; echo RESULT_STOP; exec sleep 5".to_string(),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator);

    let mut stream = supervisor.launch(None, LaunchOptions::new().app_path(&app));
    let result = timeout(STREAM_TIMEOUT, watch_results(&mut stream))
        .await
        .unwrap();
    assert_eq!(result, Some(Ok(json!([1, 2, 3]))));

    stream.stop().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Companion pairing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_watch_without_paired_companion_is_a_warning() {
    let fixture = Fixture::new();
    let app = fixture.bundle(true);
    let supervisor = fixture.supervisor(false, FakeSimulator::default());

    let mut stream = supervisor.launch(
        None,
        LaunchOptions::new().app_path(&app).launch_watch_app(true),
    );
    let events = collect_until(&mut stream, "launched").await;
    assert_eq!(count(&events, "error"), 0);

    match events.last() {
        Some(LifecycleEvent::Launched {
            companion, issues, ..
        }) => {
            assert!(companion.is_none());
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].id, issue_ids::NO_PAIRED_COMPANION);
            assert_eq!(issues[0].severity, simdemon_core::IssueSeverity::Warning);
        }
        other => panic!("expected launched, got {:?}", other),
    }

    stream.stop().await;
}

#[tokio::test]
async fn test_required_watch_without_companion_is_fatal() {
    let fixture = Fixture::new();
    let app = fixture.bundle(true);
    let supervisor = fixture.supervisor(false, FakeSimulator::default());

    let stream = supervisor.launch(
        None,
        LaunchOptions::new()
            .app_path(&app)
            .launch_watch_app(true)
            .watch_required(true),
    );
    let handle = stream.handle().clone();
    let events = collect(stream).await;

    assert_eq!(count(&events, "launched"), 0);
    assert!(matches!(
        events.last(),
        Some(LifecycleEvent::Error(Error::Pairing { .. }))
    ));
    assert_eq!(handle.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_paired_companion_joins_launch() {
    let fixture = Fixture::new();
    let app = fixture.bundle(true);
    let simulator = FakeSimulator {
        app_script: "exec sleep 30".to_string(),
        watch_script: "echo 'tick from the watch'; exec sleep 30".to_string(),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(true, simulator.clone());

    let mut stream = supervisor.launch(
        None,
        LaunchOptions::new().app_path(&app).launch_watch_app(true),
    );
    let events = collect_until(&mut stream, "launched").await;

    let companion = match events.last() {
        Some(LifecycleEvent::Launched {
            companion: Some(companion),
            issues,
            ..
        }) => {
            assert!(issues.is_empty(), "{:?}", issues);
            companion.clone()
        }
        other => panic!("expected launched with companion, got {:?}", other),
    };
    assert_eq!(companion.kind(), SessionKind::Companion);
    assert_eq!(companion.udid().as_deref(), Some("WATCH"));
    assert_eq!(companion.state(), SessionState::Running);
    assert_eq!(stream.handle().companion(), Some(companion.clone()));

    let calls = simulator.calls();
    assert!(calls.contains(&"install WATCH TestWatchApp.app".to_string()));
    assert!(calls.contains(&format!("launch WATCH {}", WATCH_BUNDLE_ID)));

    // Watch console output arrives on the primary stream
    let mut saw_watch_line = false;
    while let Some(event) = next_event(&mut stream).await {
        if let LifecycleEvent::Log {
            source: LogSource::Companion,
            line,
            session,
        } = &event
        {
            assert_eq!(session, &companion);
            if line == "tick from the watch" {
                saw_watch_line = true;
                break;
            }
        }
    }
    assert!(saw_watch_line);

    stream.stop().await;
    assert_eq!(stream.handle().state(), SessionState::Stopped);
    assert_eq!(companion.state(), SessionState::Stopped);
    assert!(simulator.calls().contains(&"shutdown WATCH".to_string()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Stop and failure
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_is_idempotent() {
    let fixture = Fixture::new();
    let supervisor = fixture.supervisor(false, FakeSimulator::default());

    let mut stream = supervisor.launch(None, LaunchOptions::new());
    collect_until(&mut stream, "launched").await;
    let handle = stream.handle().clone();

    handle.stop().await;
    assert_eq!(handle.state(), SessionState::Stopped);

    timeout(Duration::from_millis(200), handle.stop())
        .await
        .expect("second stop returns immediately");

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    handle.stop_with(move || {
        let _ = done_tx.send(());
    });
    timeout(Duration::from_secs(1), done_rx)
        .await
        .expect("callback invoked")
        .unwrap();

    assert!(handle.status().log_sources.is_empty());
    assert!(handle.status().device_pid.is_none());
}

#[tokio::test]
async fn test_stop_while_starting_aborts_boot_wait() {
    let fixture = Fixture::new();
    let simulator = FakeSimulator {
        never_boots: true,
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator.clone());

    let stream = supervisor.launch(
        None,
        LaunchOptions::new().boot_timeout(Duration::from_secs(60)),
    );
    let handle = stream.handle().clone();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.state(), SessionState::Starting);

    timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("stop does not wait for the boot timeout");
    assert_eq!(handle.state(), SessionState::Stopped);

    let events = collect(stream).await;
    assert_eq!(count(&events, "launched"), 0);
    assert_eq!(count(&events, "error"), 0);
    assert!(simulator.calls().contains(&"shutdown PHONE".to_string()));
}

#[tokio::test]
async fn test_boot_timeout_is_an_error_event() {
    let fixture = Fixture::new();
    let simulator = FakeSimulator {
        never_boots: true,
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator);

    let stream = supervisor.launch(
        None,
        LaunchOptions::new().boot_timeout(Duration::from_millis(200)),
    );
    let handle = stream.handle().clone();
    let events = collect(stream).await;

    assert!(
        matches!(
            events.last(),
            Some(LifecycleEvent::Error(Error::BootTimeout { udid, .. })) if udid == "PHONE"
        ),
        "{:?}",
        names(&events)
    );
    assert_eq!(count(&events, "launched"), 0);
    assert_eq!(handle.state(), SessionState::Failed);

    // Stopping a failed session is a no-op
    timeout(Duration::from_millis(200), handle.stop())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_target_is_an_error_event() {
    let fixture = Fixture::new();
    let supervisor = fixture.supervisor(false, FakeSimulator::default());

    let events = collect(supervisor.launch(Some("NOPE"), LaunchOptions::new())).await;
    assert!(matches!(
        events.last(),
        Some(LifecycleEvent::Error(Error::UnknownDevice { .. }))
    ));
}

#[tokio::test]
async fn test_no_matching_runtime_is_an_error_event() {
    let fixture = Fixture::new();
    let supervisor = fixture.supervisor(false, FakeSimulator::default());

    let events = collect(supervisor.launch(None, LaunchOptions::new().os_version("9.x"))).await;
    assert!(matches!(
        events.last(),
        Some(LifecycleEvent::Error(Error::NoMatchingRuntime { .. }))
    ));
}

#[tokio::test]
async fn test_dropping_stream_tears_session_down() {
    let fixture = Fixture::new();
    let simulator = FakeSimulator::default();
    let supervisor = fixture.supervisor(false, simulator.clone());

    let mut stream = supervisor.launch(None, LaunchOptions::new());
    collect_until(&mut stream, "launched").await;
    let handle = stream.handle().clone();
    drop(stream);

    let state = timeout(Duration::from_secs(5), handle.wait_terminal())
        .await
        .expect("session ends once its stream is dropped");
    assert_eq!(state, SessionState::Stopped);
    assert!(simulator.calls().contains(&"shutdown PHONE".to_string()));
}

#[tokio::test]
async fn test_hide_skips_window_activation() {
    let fixture = Fixture::new();
    let simulator = FakeSimulator::default();
    let mut config = fixture.config();
    config.activate_window = true;
    let supervisor = SessionSupervisor::new(fixture.catalog(false), simulator.clone(), config);

    let mut stream = supervisor.launch(None, LaunchOptions::new().hide(true));
    collect_until(&mut stream, "launched").await;
    stream.stop().await;

    assert!(simulator
        .calls()
        .contains(&"window PHONE activate=false".to_string()));
}

#[tokio::test]
async fn test_install_failure_after_boot_fails_session() {
    let fixture = Fixture::new();
    let app = fixture.bundle(false);
    let simulator = FakeSimulator {
        fail_install_on: Some("PHONE".to_string()),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator.clone());

    let stream = supervisor.launch(None, LaunchOptions::new().app_path(&app));
    let handle = stream.handle().clone();
    let events = collect(stream).await;

    assert_eq!(count(&events, "launched"), 0);
    assert!(
        matches!(events.last(), Some(LifecycleEvent::Error(Error::Simctl { .. }))),
        "{:?}",
        names(&events)
    );
    assert_eq!(handle.state(), SessionState::Failed);
    assert!(handle.status().log_sources.is_empty());
    assert!(simulator.calls().contains(&"shutdown PHONE".to_string()));

    timeout(Duration::from_millis(200), handle.stop())
        .await
        .expect("stopping a failed session returns immediately");
}

#[tokio::test]
async fn test_watch_install_failure_degrades_to_warning() {
    let fixture = Fixture::new();
    let app = fixture.bundle(true);
    let simulator = FakeSimulator {
        app_script: "exec sleep 30".to_string(),
        fail_install_on: Some("WATCH".to_string()),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(true, simulator.clone());

    let mut stream = supervisor.launch(
        None,
        LaunchOptions::new().app_path(&app).launch_watch_app(true),
    );
    let events = collect_until(&mut stream, "launched").await;

    match events.last() {
        Some(LifecycleEvent::Launched {
            companion, issues, ..
        }) => {
            assert!(companion.is_none());
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].id, issue_ids::WATCH_PAIRING_FAILED);
        }
        other => panic!("expected launched, got {:?}", other),
    }
    assert_eq!(stream.handle().state(), SessionState::Running);
    assert!(simulator.calls().contains(&"shutdown WATCH".to_string()));

    stream.stop().await;
}

#[tokio::test]
async fn test_simctl_errors_while_booting_are_retried() {
    let fixture = Fixture::new();
    let simulator = FakeSimulator {
        boot_check_errors: Arc::new(Mutex::new(vec![
            Error::simctl("CoreSimulatorService connection interrupted"),
            Error::simctl("CoreSimulatorService connection interrupted"),
        ])),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator.clone());

    let mut stream = supervisor.launch(Some("PHONE"), LaunchOptions::new());
    let events = collect_until(&mut stream, "launched").await;

    assert_eq!(count(&events, "error"), 0, "{:?}", names(&events));
    assert_eq!(stream.handle().state(), SessionState::Ready);
    assert!(simulator.boot_check_errors.lock().unwrap().is_empty());

    stream.stop().await;
    while next_event(&mut stream).await.is_some() {}
}

#[tokio::test]
async fn test_device_vanishing_while_booting_fails_without_waiting() {
    let fixture = Fixture::new();
    let simulator = FakeSimulator {
        boot_check_errors: Arc::new(Mutex::new(vec![Error::unknown_device("PHONE")])),
        ..Default::default()
    };
    let supervisor = fixture.supervisor(false, simulator.clone());

    let started = std::time::Instant::now();
    let stream = supervisor.launch(
        Some("PHONE"),
        LaunchOptions::new().boot_timeout(Duration::from_secs(60)),
    );
    let handle = stream.handle().clone();
    let events = collect(stream).await;

    assert!(
        matches!(
            events.last(),
            Some(LifecycleEvent::Error(Error::UnknownDevice { .. }))
        ),
        "{:?}",
        names(&events)
    );
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(handle.state(), SessionState::Failed);
    assert!(simulator.calls().contains(&"shutdown PHONE".to_string()));
}
