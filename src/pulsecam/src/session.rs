use chrono::Local;
use pulsecam_algos::{
    ConfidenceCalculator, FingerPresenceDetector, HeartRateEstimator, OxygenSaturationEstimator,
    PpgConfig, PpgError, QualityAssessor, SignalConditioner, Spo2Source,
};
use pulsecam_codec::{ColorSampleExtractor, Frame, Sample};
use pulsecam_types::{HeartRateEstimate, MeasurementState, SignalQuality, Spo2Estimate, VitalSigns};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ppg: PpgConfig,
    /// Wall-clock length of preparation plus measurement.
    pub duration_secs: f64,
    pub total_ticks: u32,
    pub preparing_ticks: u32,
    pub min_samples: usize,
    /// Whole-buffer quality needed before estimation is attempted.
    pub quality_threshold: f64,
    pub min_valid_bpm: f64,
    pub max_valid_bpm: f64,
    /// Most recent buffered samples shown as the live waveform.
    pub waveform_len: usize,
    /// Red drop right after a local maximum that marks a beat.
    pub beat_min_change: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ppg: PpgConfig::default(),
            duration_secs: 30.0,
            total_ticks: 100,
            preparing_ticks: 20,
            min_samples: 30,
            quality_threshold: 0.5,
            min_valid_bpm: 40.0,
            max_valid_bpm: 180.0,
            waveform_len: 100,
            beat_min_change: 5.0,
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        let secs = self.duration_secs / self.total_ticks.max(1) as f64;
        Duration::from_secs_f64(secs.max(0.001))
    }

    /// Pipeline config with the session's heart-rate band applied.
    pub fn ppg_config(&self) -> PpgConfig {
        let mut ppg = self.ppg.clone();
        ppg.heart_rate.min_valid_bpm = self.min_valid_bpm;
        ppg.heart_rate.max_valid_bpm = self.max_valid_bpm;
        ppg
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeasurementError {
    #[error(transparent)]
    Ppg(#[from] PpgError),
    #[error("analysis task failed: {0}")]
    AnalysisFailed(String),
}

/// Identifies one started session. Anything carrying a stale handle is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle {
    pub id: Uuid,
    pub generation: u64,
}

impl SessionHandle {
    fn detached() -> Self {
        Self {
            id: Uuid::new_v4(),
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session: Option<Uuid>,
    pub state: MeasurementState,
    pub progress: u8,
    pub finger_detected: bool,
    pub signal_quality: SignalQuality,
    pub live_bpm: Option<f64>,
    pub samples: usize,
    /// Conditioned tail of the red buffer while measuring.
    pub waveform: Vec<f64>,
    /// Frame index of the latest detected beat.
    pub last_beat: Option<u64>,
    pub result: Option<VitalSigns>,
    pub error: Option<String>,
}

/// Buffers handed off for the heavy analysis, detached from the session.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    handle: SessionHandle,
    config: SessionConfig,
    samples: Vec<Sample>,
    finger_present: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub handle: SessionHandle,
    pub result: Result<VitalSigns, MeasurementError>,
}

impl AnalysisOutcome {
    pub fn failed(handle: SessionHandle, error: MeasurementError) -> Self {
        Self {
            handle,
            result: Err(error),
        }
    }
}

impl AnalysisJob {
    /// Batch analysis of a recorded capture, keeping only the samples taken
    /// while a finger covered the lens.
    pub fn replay(config: SessionConfig, samples: Vec<Sample>) -> Self {
        let mut finger = FingerPresenceDetector::new(&config.ppg_config());
        let samples: Vec<Sample> = samples.into_iter().filter(|s| finger.update(s)).collect();
        Self {
            handle: SessionHandle::detached(),
            finger_present: finger.is_present(),
            samples,
            config,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn run(self) -> AnalysisOutcome {
        let result = self.analyse();
        AnalysisOutcome {
            handle: self.handle,
            result,
        }
    }

    fn analyse(&self) -> Result<VitalSigns, MeasurementError> {
        let ppg = self.config.ppg_config();
        let red: Vec<f64> = self.samples.iter().map(|s| s.red).collect();
        let green: Vec<f64> = self.samples.iter().map(|s| s.green).collect();
        let quality = QualityAssessor::new(ppg.quality.clone()).score(&red).value();

        if red.len() < self.config.min_samples {
            return Err(PpgError::InsufficientSignal {
                samples: red.len(),
                quality,
            }
            .into());
        }
        if !self.finger_present {
            return Err(PpgError::FingerNotDetected.into());
        }
        if quality < self.config.quality_threshold {
            return Err(PpgError::InsufficientSignal {
                samples: red.len(),
                quality,
            }
            .into());
        }

        let heart_rate = HeartRateEstimator::new(&ppg).estimate(&red)?;
        let spo2 = OxygenSaturationEstimator::new(&ppg).estimate(&red, &green);
        let confidence =
            ConfidenceCalculator::new(&ppg).calculate(&red, heart_rate.quality, &heart_rate.peaks);
        info!(
            "measured {:.0} BPM, SpO2 {:.1}% ({confidence} confidence) from {} samples",
            heart_rate.bpm,
            spo2.percentage,
            red.len()
        );

        let time = Local::now().naive_local();
        Ok(VitalSigns {
            heart_rate: HeartRateEstimate {
                bpm: heart_rate.bpm,
                confidence,
                time,
            },
            spo2: Spo2Estimate {
                percentage: spo2.percentage,
                confidence,
                time,
                placeholder: spo2.source == Spo2Source::Placeholder,
            },
        })
    }
}

/// State machine for camera measurements. Synchronous; time advances
/// through [`MeasurementSession::tick`]. Each started session brings its own
/// [`SessionConfig`].
#[derive(Debug)]
pub struct MeasurementSession {
    config: SessionConfig,
    handle: Option<SessionHandle>,
    generation: u64,
    state: MeasurementState,
    elapsed_ticks: u32,
    progress: u8,
    samples: Vec<Sample>,
    recent_red: Vec<f64>,
    recent_diffs: Vec<f64>,
    finger: FingerPresenceDetector,
    assessor: QualityAssessor,
    conditioner: SignalConditioner,
    signal_quality: SignalQuality,
    waveform: Vec<f64>,
    last_beat: Option<u64>,
    result: Option<VitalSigns>,
    failure: Option<MeasurementError>,
}

/// Idle session running the default config until the first
/// [`start`](MeasurementSession::start).
impl Default for MeasurementSession {
    fn default() -> Self {
        let config = SessionConfig::default();
        let ppg = config.ppg_config();
        Self {
            finger: FingerPresenceDetector::new(&ppg),
            assessor: QualityAssessor::new(ppg.quality.clone()),
            conditioner: SignalConditioner::new(ppg.conditioner),
            config,
            handle: None,
            generation: 0,
            state: MeasurementState::Idle,
            elapsed_ticks: 0,
            progress: 0,
            samples: Vec::new(),
            recent_red: Vec::new(),
            recent_diffs: Vec::new(),
            signal_quality: SignalQuality::Unknown,
            waveform: Vec::new(),
            last_beat: None,
            result: None,
            failure: None,
        }
    }
}

impl MeasurementSession {
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> MeasurementState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn finger_detected(&self) -> bool {
        self.finger.is_present()
    }

    pub fn signal_quality(&self) -> SignalQuality {
        self.signal_quality
    }

    pub fn live_bpm(&self) -> Option<f64> {
        self.finger.live_bpm()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn waveform(&self) -> &[f64] {
        &self.waveform
    }

    pub fn last_beat(&self) -> Option<u64> {
        self.last_beat
    }

    pub fn result(&self) -> Option<&VitalSigns> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&MeasurementError> {
        self.failure.as_ref()
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// Begins a new session under `config` from any state, abandoning
    /// whatever was running.
    pub fn start(&mut self, config: SessionConfig) -> SessionHandle {
        let ppg = config.ppg_config();
        self.finger = FingerPresenceDetector::new(&ppg);
        self.assessor = QualityAssessor::new(ppg.quality.clone());
        self.conditioner = SignalConditioner::new(ppg.conditioner);
        self.config = config;

        self.clear();
        self.generation += 1;
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            generation: self.generation,
        };
        info!("session {} started", handle.id);
        self.handle = Some(handle.clone());
        self.state = MeasurementState::Preparing;
        handle
    }

    pub fn cancel(&mut self, handle: &SessionHandle) -> bool {
        if !self.is_current(handle) {
            debug!("ignoring cancel for stale session {}", handle.id);
            return false;
        }
        if !matches!(
            self.state,
            MeasurementState::Preparing | MeasurementState::Measuring | MeasurementState::Processing
        ) {
            return false;
        }

        info!("session {} cancelled", handle.id);
        self.clear();
        self.state = MeasurementState::Idle;
        true
    }

    pub fn reset(&mut self, handle: &SessionHandle) -> bool {
        if !self.is_current(handle) {
            debug!("ignoring reset for stale session {}", handle.id);
            return false;
        }

        self.clear();
        self.state = MeasurementState::Idle;
        true
    }

    /// Reduces the centre of a camera frame to a sample and ingests it.
    pub fn ingest_frame(&mut self, frame: &Frame, t: u64) -> Result<(), PpgError> {
        let sample = ColorSampleExtractor::extract_roi(frame, Frame::DEFAULT_ROI_SIZE, t)?;
        self.ingest_sample(sample);
        Ok(())
    }

    pub fn ingest_sample(&mut self, sample: Sample) {
        if !self.state.is_acquiring() {
            return;
        }

        let window = self.assessor.config().snr_window;
        if let Some(previous) = self.recent_red.last() {
            self.recent_diffs.push((sample.red - previous).abs());
            if self.recent_diffs.len() > self.assessor.config().motion_window {
                self.recent_diffs.remove(0);
            }
        }
        self.recent_red.push(sample.red);
        if self.recent_red.len() > window {
            self.recent_red.remove(0);
        }
        self.signal_quality = self
            .assessor
            .classify(&sample, &self.recent_red, &self.recent_diffs);

        let present = self.finger.update(&sample);
        if self.state == MeasurementState::Measuring && present {
            self.samples.push(sample);
            self.update_waveform();
        }
    }

    /// Refreshes the live trace and flags a beat when the previous sample
    /// was a local maximum followed by a sharp drop.
    fn update_waveform(&mut self) {
        let n = self.samples.len();
        if n <= 10 {
            return;
        }

        let tail = &self.samples[n.saturating_sub(self.config.waveform_len)..];
        let red: Vec<f64> = tail.iter().map(|s| s.red).collect();
        self.waveform = self.conditioner.condition(&red);

        if let [.., before, peak, after] = &self.samples[..] {
            let fall = peak.red - after.red;
            if fall > self.config.beat_min_change && peak.red > before.red {
                self.last_beat = Some(peak.t);
            }
        }
    }

    /// Advances the clock by one tick. Returns the analysis job once the
    /// measuring window has elapsed.
    pub fn tick(&mut self) -> Option<AnalysisJob> {
        match self.state {
            MeasurementState::Preparing => {
                self.elapsed_ticks += 1;
                if self.finger.is_present() || self.elapsed_ticks >= self.config.preparing_ticks {
                    debug!(
                        "measuring after {} ticks, finger present: {}",
                        self.elapsed_ticks,
                        self.finger.is_present()
                    );
                    self.elapsed_ticks = self.elapsed_ticks.max(self.config.preparing_ticks);
                    self.state = MeasurementState::Measuring;
                }
                self.update_progress();
                None
            }
            MeasurementState::Measuring => {
                self.elapsed_ticks += 1;
                self.update_progress();
                if self.elapsed_ticks < self.config.total_ticks {
                    return None;
                }

                self.state = MeasurementState::Processing;
                let handle = self.handle.clone()?;
                debug!("processing {} samples for session {}", self.samples.len(), handle.id);
                Some(AnalysisJob {
                    handle,
                    config: self.config.clone(),
                    samples: std::mem::take(&mut self.samples),
                    finger_present: self.finger.is_present(),
                })
            }
            _ => None,
        }
    }

    /// Applies an analysis outcome. Outcomes for anything but the live,
    /// still-processing session are dropped.
    pub fn finish(&mut self, outcome: AnalysisOutcome) -> bool {
        if !self.is_current(&outcome.handle) || self.state != MeasurementState::Processing {
            debug!("discarding stale analysis for session {}", outcome.handle.id);
            return false;
        }

        match outcome.result {
            Ok(vitals) => {
                self.result = Some(vitals);
                self.progress = 100;
                self.state = MeasurementState::Complete;
            }
            Err(error) => {
                warn!("measurement failed: {error}");
                self.failure = Some(error);
                self.state = MeasurementState::Error;
            }
        }
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.handle.as_ref().map(|h| h.id),
            state: self.state,
            progress: self.progress,
            finger_detected: self.finger.is_present(),
            signal_quality: self.signal_quality,
            live_bpm: self.finger.live_bpm(),
            samples: self.samples.len(),
            waveform: self.waveform.clone(),
            last_beat: self.last_beat,
            result: self.result,
            error: self.failure.as_ref().map(ToString::to_string),
        }
    }

    fn is_current(&self, handle: &SessionHandle) -> bool {
        self.handle.as_ref() == Some(handle)
    }

    fn update_progress(&mut self) {
        let total = self.config.total_ticks.max(1) as u64;
        let elapsed = self.elapsed_ticks.min(self.config.total_ticks) as u64;
        self.progress = (elapsed * 100 / total) as u8;
    }

    fn clear(&mut self) {
        self.elapsed_ticks = 0;
        self.progress = 0;
        self.samples.clear();
        self.recent_red.clear();
        self.recent_diffs.clear();
        self.finger.reset();
        self.signal_quality = SignalQuality::Unknown;
        self.waveform.clear();
        self.last_beat = None;
        self.result = None;
        self.failure = None;
    }
}
