#[macro_use]
extern crate log;

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};
use pulsecam::{
    AnalysisJob, SessionConfig, SessionMonitor,
    algo::PpgError,
    synthetic::{SyntheticPpg, render_frame},
    types::{ConfidenceLevel, MeasurementState, Sample, VitalSigns, VitalStatus},
};
use serde::Serialize;
use tokio::time::interval;

const FRAME_WIDTH: usize = 64;
const FRAME_HEIGHT: usize = 48;

#[derive(Parser)]
pub struct PulsecamCli {
    /// JSON file overriding the default session configuration
    #[arg(env = "PULSECAM_CONFIG", long)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub subcommand: PulsecamCommand,
}

#[derive(Subcommand)]
pub enum PulsecamCommand {
    ///
    /// Generate a synthetic fingertip capture as a JSON array of samples
    ///
    Generate {
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 30.0)]
        seconds: f64,
        #[arg(long, default_value_t = 0.5)]
        noise: f64,
        #[arg(long)]
        seed: Option<u64>,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    ///
    /// Estimate heart rate and SpO2 from a recorded JSON capture
    ///
    Analyze { input: PathBuf },
    ///
    /// Run a live session fed with synthetic frames, Ctrl-C cancels
    ///
    Simulate {
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 0.5)]
        noise: f64,
        #[arg(long)]
        seed: Option<u64>,
        /// Run faster than real time by this factor
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
    ///
    /// Print shell completions
    ///
    Completions { shell: Shell },
}

#[derive(Serialize)]
struct Report {
    heart_rate: f64,
    heart_rate_status: VitalStatus,
    spo2: f64,
    spo2_status: VitalStatus,
    spo2_placeholder: bool,
    confidence: ConfidenceLevel,
    time: NaiveDateTime,
}

impl From<VitalSigns> for Report {
    fn from(vitals: VitalSigns) -> Self {
        Self {
            heart_rate: vitals.heart_rate.bpm.round(),
            heart_rate_status: vitals.heart_rate.status(),
            spo2: (vitals.spo2.percentage * 10.0).round() / 10.0,
            spo2_status: vitals.spo2.status(),
            spo2_placeholder: vitals.spo2.placeholder,
            confidence: vitals.confidence(),
            time: vitals.time(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenv() {
        println!("{}", error);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = PulsecamCli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.subcommand {
        PulsecamCommand::Generate {
            bpm,
            seconds,
            noise,
            seed,
            output,
        } => {
            let synthetic = SyntheticPpg {
                sampling_rate: config.ppg.sampling_rate,
                seed,
                ..SyntheticPpg::default()
            }
            .with_bpm(bpm)
            .with_noise(noise);
            let count = (seconds * synthetic.sampling_rate).max(0.0) as usize;
            let samples = synthetic.generate(count);

            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    let mut writer = BufWriter::new(file);
                    serde_json::to_writer(&mut writer, &samples)?;
                    writer.flush()?;
                    info!("wrote {} samples to {}", samples.len(), path.display());
                }
                None => println!("{}", serde_json::to_string(&samples)?),
            }

            Ok(())
        }
        PulsecamCommand::Analyze { input } => {
            let file =
                File::open(&input).with_context(|| format!("opening {}", input.display()))?;
            let samples: Vec<Sample> = serde_json::from_reader(BufReader::new(file))?;
            info!("analysing {} samples", samples.len());

            let outcome = AnalysisJob::replay(config, samples).run();
            let vitals = outcome.result?;
            println!("{}", serde_json::to_string_pretty(&Report::from(vitals))?);
            Ok(())
        }
        PulsecamCommand::Simulate {
            bpm,
            noise,
            seed,
            speed,
        } => {
            let synthetic = SyntheticPpg {
                sampling_rate: config.ppg.sampling_rate,
                seed,
                ..SyntheticPpg::default()
            }
            .with_bpm(bpm)
            .with_noise(noise);
            simulate(config, synthetic, speed).await
        }
        PulsecamCommand::Completions { shell } => {
            let mut command = PulsecamCli::command();
            clap_complete::generate(shell, &mut command, "pulsecam", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    debug!("loaded config from {}", path.display());
    Ok(config)
}

fn bar_style() -> anyhow::Result<ProgressStyle> {
    Ok(
        ProgressStyle::with_template("{prefix:>10} [{wide_bar:.red/dim}] {pos:>3}% {msg}")?
            .progress_chars("=>-"),
    )
}

async fn simulate(
    config: SessionConfig,
    synthetic: SyntheticPpg,
    speed: f64,
) -> anyhow::Result<()> {
    let speed = if speed > 0.0 { speed } else { 1.0 };
    let frame_interval = Duration::from_secs_f64(1.0 / (synthetic.sampling_rate * speed));
    let config = SessionConfig {
        duration_secs: config.duration_secs / speed,
        ..config
    };

    let monitor = SessionMonitor::spawn();
    let mut updates = monitor.subscribe();
    let handle = monitor.start_session(config).await?;

    let cancel = (monitor.clone(), handle.clone());
    ctrlc::set_handler(move || cancel.0.cancel_session(&cancel.1))?;

    let producer = monitor.clone();
    let feeder = tokio::spawn(async move {
        let mut frames = interval(frame_interval);
        let feed = |sample: Sample| -> Result<(), PpgError> {
            let frame = render_frame(&sample, FRAME_WIDTH, FRAME_HEIGHT)?;
            producer.ingest_frame(&frame, sample.t)
        };
        for sample in synthetic.stream() {
            frames.tick().await;
            if let Err(error) = feed(sample) {
                warn!("dropping frame {}: {error}", sample.t);
            }
        }
    });

    let bar = ProgressBar::new(100);
    bar.set_style(bar_style()?);
    bar.set_prefix("pulsecam");

    let mut started = false;
    let mut last_beat = None;
    let finished = loop {
        updates.changed().await?;
        let snapshot = updates.borrow_and_update().clone();
        let beat = snapshot.last_beat.is_some() && snapshot.last_beat != last_beat;
        last_beat = snapshot.last_beat;
        bar.set_position(snapshot.progress as u64);
        bar.set_message(format!(
            "{}{} | finger: {} | signal: {} | live: {}",
            if beat { "* " } else { "" },
            snapshot.state,
            if snapshot.finger_detected { "yes" } else { "no" },
            snapshot.signal_quality,
            snapshot
                .live_bpm
                .map(|bpm| format!("{bpm:.0} BPM"))
                .unwrap_or_else(|| "--".to_owned()),
        ));

        match snapshot.state {
            MeasurementState::Idle if started => break None,
            MeasurementState::Complete | MeasurementState::Error => break Some(snapshot),
            MeasurementState::Idle => {}
            _ => started = true,
        }
    };
    feeder.abort();

    let Some(snapshot) = finished else {
        bar.abandon_with_message("cancelled");
        return Ok(());
    };

    match (snapshot.result, snapshot.error) {
        (Some(vitals), _) => {
            bar.finish_with_message("done");
            println!("{}", serde_json::to_string_pretty(&Report::from(vitals))?);
            Ok(())
        }
        (None, error) => {
            bar.abandon_with_message("failed");
            Err(anyhow::anyhow!(
                error.unwrap_or_else(|| "measurement failed".to_owned())
            ))
        }
    }
}
