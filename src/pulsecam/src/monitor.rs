use pulsecam_algos::PpgError;
use pulsecam_codec::{ColorSampleExtractor, Frame, Sample};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};

use crate::{
    AnalysisJob, AnalysisOutcome, MeasurementError, MeasurementSession, SessionConfig,
    SessionHandle, SessionSnapshot,
};

enum Command {
    Sample(Sample),
    Start(SessionConfig, oneshot::Sender<SessionHandle>),
    Cancel(SessionHandle),
    Reset(SessionHandle),
}

/// Async front of a [`MeasurementSession`].
///
/// A worker task owns the session and is woken by samples, commands, the
/// session clock and finished analyses. Analysis itself runs on the
/// blocking pool.
#[derive(Clone)]
pub struct SessionMonitor {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionMonitor {
    pub fn spawn() -> Self {
        let session = MeasurementSession::default();
        let (snapshot_tx, snapshot) = watch::channel(session.snapshot());
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(session, command_rx, snapshot_tx));
        Self { commands, snapshot }
    }

    /// Never blocks; samples queue up behind earlier commands.
    pub fn ingest_sample(&self, sample: Sample) {
        self.send(Command::Sample(sample));
    }

    /// Extracts the sample on the caller's thread, then queues it.
    pub fn ingest_frame(&self, frame: &Frame, t: u64) -> Result<(), PpgError> {
        let sample = ColorSampleExtractor::extract_roi(frame, Frame::DEFAULT_ROI_SIZE, t)?;
        self.ingest_sample(sample);
        Ok(())
    }

    /// Starts a session under `config`, superseding any running one. The
    /// session clock follows the new config.
    pub async fn start_session(&self, config: SessionConfig) -> anyhow::Result<SessionHandle> {
        let (reply, handle) = oneshot::channel();
        self.commands
            .send(Command::Start(config, reply))
            .map_err(|_| anyhow::anyhow!("session worker has stopped"))?;
        Ok(handle.await?)
    }

    pub fn cancel_session(&self, handle: &SessionHandle) {
        self.send(Command::Cancel(handle.clone()));
    }

    pub fn reset_session(&self, handle: &SessionHandle) {
        self.send(Command::Reset(handle.clone()));
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("session worker has stopped");
        }
    }
}

async fn run_worker(
    mut session: MeasurementSession,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
) {
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let mut ticker = session_clock(session.config());

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };

                match command {
                    Command::Sample(sample) => session.ingest_sample(sample),
                    Command::Start(config, reply) => {
                        let handle = session.start(config);
                        ticker = session_clock(session.config());
                        if reply.send(handle).is_err() {
                            debug!("start requester went away");
                        }
                    }
                    Command::Cancel(handle) => {
                        session.cancel(&handle);
                    }
                    Command::Reset(handle) => {
                        session.reset(&handle);
                    }
                }
            },
            _ = ticker.tick() => {
                if let Some(job) = session.tick() {
                    spawn_analysis(job, outcome_tx.clone());
                }
            },
            Some(outcome) = outcomes.recv() => {
                session.finish(outcome);
            }
        }

        let next = session.snapshot();
        snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    debug!("session worker stopped");
}

/// First tick lands one period after the clock starts.
fn session_clock(config: &SessionConfig) -> Interval {
    let period = config.tick_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn spawn_analysis(job: AnalysisJob, outcomes: mpsc::UnboundedSender<AnalysisOutcome>) {
    let handle = job.handle().clone();
    tokio::spawn(async move {
        let outcome = match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(outcome) => outcome,
            Err(error) => {
                error!("analysis task failed: {error}");
                AnalysisOutcome::failed(handle, MeasurementError::AnalysisFailed(error.to_string()))
            }
        };

        if outcomes.send(outcome).is_err() {
            debug!("session worker gone, dropping analysis");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticPpg;
    use pulsecam_types::MeasurementState;
    use std::time::Duration;
    use tokio::time::timeout;

    fn quick_config() -> SessionConfig {
        SessionConfig {
            duration_secs: 1.0,
            total_ticks: 20,
            preparing_ticks: 2,
            ..SessionConfig::default()
        }
    }

    async fn wait_for_state(
        updates: &mut watch::Receiver<SessionSnapshot>,
        check: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        timeout(Duration::from_secs(10), updates.wait_for(check))
            .await
            .expect("timed out waiting for session")
            .expect("worker stopped")
            .clone()
    }

    #[tokio::test]
    async fn measures_synthetic_pulse() {
        let monitor = SessionMonitor::spawn();
        let mut updates = monitor.subscribe();
        let handle = monitor.start_session(quick_config()).await.unwrap();
        assert_eq!(handle.generation, 1);

        let samples = SyntheticPpg::default().with_seed(21).generate(330);
        for sample in &samples[..10] {
            monitor.ingest_sample(*sample);
        }
        wait_for_state(&mut updates, |s| s.state == MeasurementState::Measuring).await;
        for sample in &samples[10..] {
            monitor.ingest_sample(*sample);
        }

        let done = wait_for_state(&mut updates, |s| s.state.is_terminal()).await;
        assert_eq!(done.state, MeasurementState::Complete, "{done:?}");
        assert_eq!(done.progress, 100);
        assert_eq!(done.waveform.len(), 100);
        let vitals = done.result.unwrap();
        assert!((40.0..=180.0).contains(&vitals.heart_rate.bpm));
        assert!((90.0..=100.0).contains(&vitals.spo2.percentage));
        assert_eq!(monitor.snapshot().state, MeasurementState::Complete);
    }

    #[tokio::test]
    async fn cancel_returns_to_idle() {
        let monitor = SessionMonitor::spawn();
        let mut updates = monitor.subscribe();
        let handle = monitor.start_session(SessionConfig::default()).await.unwrap();
        wait_for_state(&mut updates, |s| s.state == MeasurementState::Preparing).await;

        monitor.cancel_session(&handle);
        let idle = wait_for_state(&mut updates, |s| s.state == MeasurementState::Idle).await;
        assert_eq!(idle.progress, 0);
        assert_eq!(idle.samples, 0);
    }

    #[tokio::test]
    async fn empty_session_errors_then_resets() {
        let monitor = SessionMonitor::spawn();
        let mut updates = monitor.subscribe();
        let handle = monitor.start_session(quick_config()).await.unwrap();

        let failed = wait_for_state(&mut updates, |s| s.state.is_terminal()).await;
        assert_eq!(failed.state, MeasurementState::Error);
        assert!(failed.error.is_some());

        monitor.reset_session(&handle);
        let idle = wait_for_state(&mut updates, |s| s.state == MeasurementState::Idle).await;
        assert!(idle.error.is_none());
    }

    #[tokio::test]
    async fn restart_supersedes_running_session() {
        let monitor = SessionMonitor::spawn();
        let first = monitor.start_session(SessionConfig::default()).await.unwrap();
        let second = monitor.start_session(SessionConfig::default()).await.unwrap();
        assert_eq!(second.generation, first.generation + 1);
        assert_ne!(first.id, second.id);

        // stale cancel is ignored, the live one lands
        let mut updates = monitor.subscribe();
        monitor.cancel_session(&first);
        let black = Frame::new(8, 8, vec![Default::default(); 64]).unwrap();
        monitor.ingest_frame(&black, 0).unwrap();
        let dark = wait_for_state(&mut updates, |s| {
            s.signal_quality == pulsecam_types::SignalQuality::TooDark
        })
        .await;
        assert_eq!(dark.state, MeasurementState::Preparing);
        assert_eq!(dark.session, Some(second.id));
    }

    #[tokio::test]
    async fn clock_follows_each_session_config() {
        let monitor = SessionMonitor::spawn();
        let mut updates = monitor.subscribe();

        // a default session would run for 30 seconds
        monitor.start_session(SessionConfig::default()).await.unwrap();
        let brief = SessionConfig {
            duration_secs: 0.4,
            total_ticks: 4,
            preparing_ticks: 1,
            ..SessionConfig::default()
        };
        let handle = monitor.start_session(brief).await.unwrap();
        assert_eq!(handle.generation, 2);

        let failed = wait_for_state(&mut updates, |s| s.state.is_terminal()).await;
        assert_eq!(failed.state, MeasurementState::Error);
        assert_eq!(failed.session, Some(handle.id));
    }
}
