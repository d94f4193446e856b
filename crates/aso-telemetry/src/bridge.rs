//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Hardware button bridge events and their operator mapping."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aso_common::BridgeConfig;
use aso_logging::{log_operator_event, LogContext, OperatorOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

use crate::observatory::Observatory;
use crate::sample::Sample;
use crate::TelemetryError;

/// Gesture reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeEventKind {
    Press,
    LongPress,
}

/// Physical source of a bridge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeSource {
    #[default]
    BleButton,
}

/// One event received from the hardware bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvent {
    #[serde(rename = "type")]
    pub kind: BridgeEventKind,
    /// Milliseconds since the Unix epoch.
    #[serde(default = "now_millis")]
    pub timestamp: i64,
    #[serde(default)]
    pub source: BridgeSource,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl BridgeEvent {
    pub fn new(kind: BridgeEventKind) -> Self {
        Self {
            kind,
            timestamp: now_millis(),
            source: BridgeSource::BleButton,
        }
    }
}

/// What a bridge event did to the observatory.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeAction {
    /// A long press forced `HALTED`.
    EmergencyStop(Arc<Sample>),
    /// A short press; recorded but no state change.
    Acknowledged,
    /// The event kind is not mapped under the current policy.
    Ignored,
}

/// Mapping of bridge gestures to operator actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgePolicy {
    pub long_press_estop: bool,
}

impl Default for BridgePolicy {
    fn default() -> Self {
        Self {
            long_press_estop: true,
        }
    }
}

impl BridgePolicy {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            long_press_estop: config.long_press_estop,
        }
    }

    pub fn apply(
        &self,
        event: &BridgeEvent,
        observatory: &Observatory,
    ) -> Result<BridgeAction, TelemetryError> {
        match event.kind {
            BridgeEventKind::LongPress if self.long_press_estop => {
                let sample = observatory.trigger_estop()?;
                let ctx = LogContext::new().with_status("HALTED").with_origin("bridge");
                log_operator_event(Some(&ctx), "estop", OperatorOutcome::Applied);
                Ok(BridgeAction::EmergencyStop(sample))
            }
            BridgeEventKind::Press => {
                info!(timestamp = event.timestamp, "bridge button tapped");
                Ok(BridgeAction::Acknowledged)
            }
            BridgeEventKind::LongPress => Ok(BridgeAction::Ignored),
        }
    }
}

/// Failures while replaying a bridge event log.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    #[serde(default)]
    delay_ms: Option<u64>,
    event: BridgeEvent,
}

impl ReplayRecord {
    fn delay(&self) -> Option<Duration> {
        self.delay_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// Parse a newline-delimited JSON event log. Blank lines are skipped; line
/// numbers in errors are 1-based.
fn read_records(path: &Path) -> Result<Vec<ReplayRecord>, BridgeError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| BridgeError::Json {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Replay bridge events from a newline-delimited JSON file on the calling
/// thread.
///
/// Each line holds an `event` object and an optional `delay_ms` slept before
/// applying it. The whole file is parsed before the first event is applied.
/// Returns the actions in file order.
pub fn replay_bridge_events<P: AsRef<Path>>(
    path: P,
    policy: &BridgePolicy,
    observatory: &Observatory,
) -> Result<Vec<BridgeAction>, BridgeError> {
    let mut actions = Vec::new();
    for record in read_records(path.as_ref())? {
        if let Some(delay) = record.delay() {
            std::thread::sleep(delay);
        }
        actions.push(policy.apply(&record.event, observatory)?);
    }
    Ok(actions)
}

/// Cancellable replay of a bridge event log on the tokio runtime.
pub struct BridgeReplay;

impl BridgeReplay {
    /// Spawn the replay. Delays are awaited, not slept, and shutting the
    /// handle down interrupts a pending delay; events already applied stay
    /// applied.
    pub fn spawn(
        path: PathBuf,
        policy: BridgePolicy,
        observatory: Arc<Observatory>,
    ) -> BridgeReplayHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task: JoinHandle<Result<Vec<BridgeAction>, BridgeError>> = tokio::spawn(async move {
            let records = read_records(&path)?;
            info!(events = records.len(), file = %path.display(), "bridge replay started");
            let mut actions = Vec::with_capacity(records.len());
            for record in records {
                if let Some(delay) = record.delay() {
                    tokio::select! {
                        _ = &mut shutdown_rx => {
                            warn!(applied = actions.len(), file = %path.display(), "bridge replay cancelled");
                            return Ok::<_, BridgeError>(actions);
                        }
                        _ = time::sleep(delay) => {}
                    }
                }
                actions.push(policy.apply(&record.event, &observatory)?);
            }
            info!(events = actions.len(), file = %path.display(), "bridge replay finished");
            Ok::<_, BridgeError>(actions)
        });
        BridgeReplayHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running [`BridgeReplay`].
#[derive(Debug)]
pub struct BridgeReplayHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<Vec<BridgeAction>, BridgeError>>,
}

impl BridgeReplayHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the replay to reach the end of the file.
    pub async fn join(self) -> anyhow::Result<Vec<BridgeAction>> {
        Ok(self.task.await??)
    }

    /// Cancel any pending delay and return the actions applied so far.
    pub async fn shutdown(mut self) -> anyhow::Result<Vec<BridgeAction>> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        Ok(self.task.await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Status;

    #[test]
    fn wire_format_matches_device_payload() {
        let event: BridgeEvent = serde_json::from_str(
            r#"{"type":"LONG_PRESS","timestamp":1700000000000,"source":"BLE_BUTTON"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, BridgeEventKind::LongPress);
        assert_eq!(event.source, BridgeSource::BleButton);
        let json = serde_json::to_value(BridgeEvent::new(BridgeEventKind::Press)).unwrap();
        assert_eq!(json["type"], "PRESS");
    }

    #[test]
    fn long_press_halts_and_press_does_not() {
        let observatory = Observatory::builder().build();
        let policy = BridgePolicy::default();
        let tapped = policy
            .apply(&BridgeEvent::new(BridgeEventKind::Press), &observatory)
            .unwrap();
        assert_eq!(tapped, BridgeAction::Acknowledged);
        assert_eq!(observatory.status(), Status::Optimal);
        assert!(observatory.history().is_empty());

        let held = policy
            .apply(&BridgeEvent::new(BridgeEventKind::LongPress), &observatory)
            .unwrap();
        assert!(matches!(held, BridgeAction::EmergencyStop(ref s) if s.status() == Status::Halted));
        assert_eq!(observatory.status(), Status::Halted);
    }

    #[test]
    fn disabled_policy_ignores_long_press() {
        let observatory = Observatory::builder().build();
        let policy = BridgePolicy {
            long_press_estop: false,
        };
        let action = policy
            .apply(&BridgeEvent::new(BridgeEventKind::LongPress), &observatory)
            .unwrap();
        assert_eq!(action, BridgeAction::Ignored);
        assert_eq!(observatory.status(), Status::Optimal);
    }

    #[test]
    fn replay_applies_events_in_order() {
        let observatory = Observatory::builder().build();
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(
            temp.path(),
            r#"{"event":{"type":"PRESS","source":"BLE_BUTTON"}}

{"delay_ms":1,"event":{"type":"LONG_PRESS","timestamp":1700000000000,"source":"BLE_BUTTON"}}
"#,
        )
        .expect("write temp file");

        let actions =
            replay_bridge_events(temp.path(), &BridgePolicy::default(), &observatory).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], BridgeAction::Acknowledged);
        assert_eq!(observatory.status(), Status::Halted);
    }

    fn write_log(contents: &str) -> tempfile::NamedTempFile {
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(temp.path(), contents).expect("write temp file");
        temp
    }

    #[tokio::test]
    async fn spawned_replay_runs_to_the_end() {
        let observatory = Observatory::builder().build();
        let log = write_log(
            "{\"event\":{\"type\":\"PRESS\"}}\n{\"delay_ms\":5,\"event\":{\"type\":\"LONG_PRESS\"}}\n",
        );
        let handle = BridgeReplay::spawn(
            log.path().to_path_buf(),
            BridgePolicy::default(),
            Arc::clone(&observatory),
        );
        let actions = handle.join().await.unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[1], BridgeAction::EmergencyStop(_)));
        assert_eq!(observatory.status(), Status::Halted);
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_long_delay() {
        let observatory = Observatory::builder().build();
        let log = write_log(
            "{\"event\":{\"type\":\"PRESS\"}}\n{\"delay_ms\":3600000,\"event\":{\"type\":\"LONG_PRESS\"}}\n",
        );
        let handle = BridgeReplay::spawn(
            log.path().to_path_buf(),
            BridgePolicy::default(),
            Arc::clone(&observatory),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        let actions = tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown does not wait for the delay")
            .unwrap();
        assert_eq!(actions, [BridgeAction::Acknowledged]);
        assert_eq!(observatory.status(), Status::Optimal);
    }

    #[tokio::test]
    async fn spawned_replay_surfaces_parse_errors() {
        let observatory = Observatory::builder().build();
        let log = write_log("{\"event\":{\"type\":\"SWIPE\"}}\n");
        let handle = BridgeReplay::spawn(
            log.path().to_path_buf(),
            BridgePolicy::default(),
            Arc::clone(&observatory),
        );
        let err = handle.join().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::Json { line: 1, .. })
        ));
    }

    #[test]
    fn replay_reports_bad_line_number() {
        let observatory = Observatory::builder().build();
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(temp.path(), "{\"event\":{\"type\":\"PRESS\"}}\n{\"event\":{\"type\":\"SWIPE\"}}\n")
            .expect("write temp file");
        let err = replay_bridge_events(temp.path(), &BridgePolicy::default(), &observatory)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Json { line: 2, .. }));
    }
}
