//! App Lifecycle Detector
//!
//! Watches the tailed log stream of one session for two independent signals:
//! structured result regions (see [`simdemon_core::protocol`]) and the line
//! announcing that the app has started. The app quitting is not detected from
//! logs; the supervisor reports it through [`AppLifecycleDetector::app_exited`]
//! when the app's console process exits.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use simdemon_core::prelude::*;
use simdemon_core::{LogSource, ResultMarkerParser, StructuredResult};

/// Whether the target app is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    NotStarted,
    Started,
    Quit,
}

/// Something the supervisor should act on
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorSignal {
    AppStarted { pid: Option<u32> },
    StructuredResult(StructuredResult),
    /// With auto-exit enabled, no further activity is expected
    AutoExitRequested,
}

#[derive(Debug)]
pub struct AppLifecycleDetector {
    start_marker: String,
    stop_marker: String,
    /// One parser per source so interleaved sources cannot corrupt a region
    parsers: HashMap<LogSource, ResultMarkerParser>,
    state: AppState,
    /// `<bundle-id>: <pid>` printed by `simctl launch`
    console_start: Option<Regex>,
    /// `<Executable>[<pid>]` in the system log
    syslog_start: Option<Regex>,
    auto_exit: Option<Duration>,
    last_activity: Option<Instant>,
    exit_requested: bool,
}

impl AppLifecycleDetector {
    pub fn new(start_marker: impl Into<String>, stop_marker: impl Into<String>) -> Self {
        Self {
            start_marker: start_marker.into(),
            stop_marker: stop_marker.into(),
            parsers: HashMap::new(),
            state: AppState::NotStarted,
            console_start: None,
            syslog_start: None,
            auto_exit: None,
            last_activity: None,
            exit_requested: false,
        }
    }

    /// Recognise the start of the app with this identity
    pub fn with_app(mut self, bundle_id: &str, executable: Option<&str>) -> Self {
        self.console_start =
            Regex::new(&format!(r"^{}: (\d+)\s*$", regex::escape(bundle_id))).ok();
        self.syslog_start = executable.and_then(|exe| {
            Regex::new(&format!(r"(?:^|[\s/]){}\[(\d+)\]", regex::escape(exe))).ok()
        });
        self
    }

    /// Request termination once a result region closes or the app is quiet for `idle`
    pub fn with_auto_exit(mut self, idle: Duration) -> Self {
        self.auto_exit = Some(idle);
        self
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    /// Feed one tailed line
    pub fn feed(&mut self, source: &LogSource, line: &str) -> Vec<DetectorSignal> {
        let mut signals = Vec::new();

        if self.state == AppState::NotStarted {
            if let Some(pid) = self.match_start(source, line) {
                info!("App started (pid {:?})", pid);
                self.state = AppState::Started;
                self.last_activity = Some(Instant::now());
                signals.push(DetectorSignal::AppStarted { pid });
            }
        }

        // The system log mirrors app output with a syslog prefix; results are
        // only read from the app's own channels.
        if *source == LogSource::SystemLog {
            return signals;
        }

        if self.state == AppState::Started {
            self.last_activity = Some(Instant::now());
        }

        let parser = self.parsers.entry(source.clone()).or_insert_with(|| {
            ResultMarkerParser::with_markers(self.start_marker.clone(), self.stop_marker.clone())
        });

        if let Some(result) = parser.feed_line(line) {
            if let Err(e) = &result {
                warn!("{}: {}", e, e.reason);
            }
            signals.push(DetectorSignal::StructuredResult(result));
            if self.auto_exit.is_some() && !self.exit_requested {
                debug!("Result region closed, requesting auto-exit");
                self.exit_requested = true;
                signals.push(DetectorSignal::AutoExitRequested);
            }
        }

        signals
    }

    fn match_start(&self, source: &LogSource, line: &str) -> Option<Option<u32>> {
        let pattern = match source {
            LogSource::SystemLog => self.syslog_start.as_ref(),
            _ => self.console_start.as_ref(),
        }?;
        let caps = pattern.captures(line.trim_end())?;
        Some(caps.get(1).and_then(|m| m.as_str().parse().ok()))
    }

    /// When the idle auto-exit fires, if it is armed
    pub fn idle_deadline(&self) -> Option<Instant> {
        if self.exit_requested || self.state != AppState::Started {
            return None;
        }
        Some(self.last_activity? + self.auto_exit?)
    }

    /// Fire the idle auto-exit if its deadline has passed
    pub fn check_idle(&mut self, now: Instant) -> Option<DetectorSignal> {
        let deadline = self.idle_deadline()?;
        if now < deadline {
            return None;
        }
        debug!("App idle, requesting auto-exit");
        self.exit_requested = true;
        Some(DetectorSignal::AutoExitRequested)
    }

    /// Record the app's exit. Open result regions are discarded.
    ///
    /// Returns whether the app had been seen starting.
    pub fn app_exited(&mut self) -> bool {
        let was_started = self.state == AppState::Started;
        self.state = AppState::Quit;
        for parser in self.parsers.values_mut() {
            parser.reset();
        }
        was_started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn detector() -> AppLifecycleDetector {
        AppLifecycleDetector::new("RESULT_START", "RESULT_STOP")
            .with_app("com.example.TestApp", Some("TestApp"))
    }

    #[test]
    fn test_console_start_line() {
        let mut d = detector();
        let signals = d.feed(&LogSource::AppConsole, "com.example.TestApp: 4242");
        assert_eq!(signals, vec![DetectorSignal::AppStarted { pid: Some(4242) }]);
        assert_eq!(d.state(), AppState::Started);

        // Only once
        assert!(d.feed(&LogSource::AppConsole, "com.example.TestApp: 4242").is_empty());
    }

    #[test]
    fn test_syslog_start_line() {
        let mut d = detector();
        let line = "Jan  1 12:00:00 host TestApp[777]: application launched";
        let signals = d.feed(&LogSource::SystemLog, line);
        assert_eq!(signals, vec![DetectorSignal::AppStarted { pid: Some(777) }]);
    }

    #[test]
    fn test_other_process_is_not_start() {
        let mut d = detector();
        assert!(d
            .feed(&LogSource::SystemLog, "Jan  1 host MyTestApp[1]: hi")
            .is_empty());
        assert!(d
            .feed(&LogSource::AppConsole, "com.example.TestAppX: 1")
            .is_empty());
        assert_eq!(d.state(), AppState::NotStarted);
    }

    #[test]
    fn test_no_app_never_starts() {
        let mut d = AppLifecycleDetector::new("RESULT_START", "RESULT_STOP");
        assert!(d.feed(&LogSource::AppConsole, "com.example.TestApp: 1").is_empty());
        assert!(!d.app_exited());
    }

    #[test]
    fn test_structured_result_from_console() {
        let mut d = detector();
        d.feed(&LogSource::AppConsole, "RESULT_START");
        d.feed(&LogSource::AppConsole, "[INFO] {\"foo\":\"bar\"}");
        let signals = d.feed(&LogSource::AppConsole, "RESULT_STOP");
        assert_eq!(
            signals,
            vec![DetectorSignal::StructuredResult(Ok(json!({"foo": "bar"})))]
        );
    }

    #[test]
    fn test_sources_do_not_interleave() {
        let file = LogSource::AppLogFile(PathBuf::from("/tmp/app.log"));
        let mut d = detector();
        d.feed(&LogSource::AppConsole, "RESULT_START");
        d.feed(&file, "noise from another source");
        d.feed(&LogSource::AppConsole, "[1, 2]");
        let signals = d.feed(&LogSource::AppConsole, "RESULT_STOP");
        assert_eq!(signals, vec![DetectorSignal::StructuredResult(Ok(json!([1, 2])))]);
    }

    #[test]
    fn test_system_log_results_ignored() {
        let mut d = detector();
        d.feed(&LogSource::SystemLog, "RESULT_START");
        assert!(d.feed(&LogSource::SystemLog, "RESULT_STOP").is_empty());
    }

    #[test]
    fn test_auto_exit_after_result() {
        let mut d = detector().with_auto_exit(Duration::from_secs(60));
        d.feed(&LogSource::AppConsole, "com.example.TestApp: 1");
        d.feed(&LogSource::AppConsole, "RESULT_START");
        let signals = d.feed(&LogSource::AppConsole, "RESULT_STOP");
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1], DetectorSignal::AutoExitRequested);
        assert!(d.idle_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_exit_after_idle() {
        let mut d = detector().with_auto_exit(Duration::from_secs(10));
        assert!(d.idle_deadline().is_none());

        d.feed(&LogSource::AppConsole, "com.example.TestApp: 1");
        let deadline = d.idle_deadline().unwrap();
        assert!(d.check_idle(Instant::now()).is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        d.feed(&LogSource::AppConsole, "still busy");
        assert!(d.idle_deadline().unwrap() > deadline);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(
            d.check_idle(Instant::now()),
            Some(DetectorSignal::AutoExitRequested)
        );
        assert!(d.check_idle(Instant::now()).is_none());
    }

    #[test]
    fn test_app_exited_discards_open_region() {
        let mut d = detector();
        d.feed(&LogSource::AppConsole, "com.example.TestApp: 1");
        d.feed(&LogSource::AppConsole, "RESULT_START");
        assert!(d.app_exited());
        assert_eq!(d.state(), AppState::Quit);
        assert!(d.feed(&LogSource::AppConsole, "RESULT_STOP").is_empty());
    }
}
