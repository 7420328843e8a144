use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use posecap_core::{
    EnrollmentController, EnrollmentRequest, Feedback, FrameSource, Silent, Status, StepRegistry,
    TerminalBell,
};
use posecap_hw::{Camera, CameraFeed};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod config;
mod replay;

use config::Settings;
use replay::Recording;

#[derive(Parser)]
#[command(name = "posecap", about = "Guided head-pose enrollment tools")]
struct Cli {
    /// TOML file with enrollment thresholds (also POSECAP_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enrollment controller against a recorded session
    Replay {
        /// JSON-lines recording, one frame per line
        recording: PathBuf,
        /// Write captured stills and manifest.json here when the run completes
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Name to enroll the captures under (required with --out)
        #[arg(short, long)]
        name: Option<String>,
        /// Override the polling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Ring the terminal bell on each capture
        #[arg(long)]
        bell: bool,
    },
    /// List the configured pose steps
    Steps,
    /// Print the effective configuration as TOML
    Config,
    /// Run camera diagnostics
    Test {
        /// Save the captured frame as PNG
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            recording,
            out,
            name,
            interval_ms,
            bell,
        } => {
            if out.is_some() && name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                bail!("--name is required when writing captures with --out");
            }
            let mut settings = settings;
            if let Some(ms) = interval_ms {
                settings.enroll.poll_interval_ms = ms;
            }
            let feedback: Box<dyn Feedback> = if bell {
                Box::new(TerminalBell)
            } else {
                Box::new(Silent)
            };
            run_replay(&settings, &recording, out.as_deref(), name.as_deref(), feedback).await?;
        }
        Commands::Steps => {
            let registry = StepRegistry::from_config(&settings.enroll)?;
            for (i, step) in registry.iter().enumerate() {
                println!("{i}. {} {:<6} {:<14} {}", step.icon, step.key, step.label, step.rule);
            }
            let unused: Vec<_> = posecap_core::steps::BUILTIN_KEYS
                .iter()
                .filter(|k| registry.iter().all(|s| s.key != **k))
                .collect();
            if !unused.is_empty() {
                println!("available: {unused:?}");
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&settings.enroll)?);
        }
        Commands::Test { save } => run_camera_test(&settings, save.as_deref())?,
    }

    Ok(())
}

async fn run_replay(
    settings: &Settings,
    path: &Path,
    out: Option<&Path>,
    name: Option<&str>,
    feedback: Box<dyn Feedback>,
) -> Result<()> {
    let recording = Recording::load(path)?;
    tracing::info!(path = %path.display(), frames = recording.len(), "replaying recording");
    let (frames, perception, progress) = recording.into_parts();

    let controller = EnrollmentController::new(&settings.enroll, frames, perception, feedback)?;
    let handle = controller.handle();
    let mut status = handle.subscribe();
    handle.start()?;
    let looper = controller.spawn();

    println!("{}", handle.status());
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                println!("{current}");
                if matches!(current, Status::Complete | Status::ModelUnavailable(_)) {
                    break;
                }
            }
            _ = ticker.tick() => {
                if progress.is_exhausted() {
                    break;
                }
            }
        }
    }
    looper.shutdown().await;

    let snapshot = handle.snapshot();
    println!(
        "played {} frames, captured {}/{} steps",
        progress.played(),
        snapshot.captures.len(),
        snapshot.step_count
    );

    if !snapshot.is_complete() {
        let missing: Vec<_> = handle
            .registry()
            .iter()
            .skip(snapshot.current_step_index)
            .map(|s| s.key)
            .collect();
        bail!("enrollment incomplete; missing steps: {}", missing.join(", "));
    }

    if let (Some(out), Some(name)) = (out, name) {
        let request = EnrollmentRequest::new(name, &snapshot)?;
        write_request(&request, out)?;
        println!("wrote {} captures to {}", request.captures.len(), out.display());
    }
    Ok(())
}

fn write_request(request: &EnrollmentRequest, out: &Path) -> Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    for (i, capture) in request.captures.iter().enumerate() {
        let file = request.file_name(i).context("capture index out of range")?;
        std::fs::write(out.join(&file), &capture.image.data)
            .with_context(|| format!("writing {file}"))?;
    }
    let manifest = serde_json::to_string_pretty(&request.manifest())?;
    std::fs::write(out.join("manifest.json"), manifest).context("writing manifest.json")?;
    Ok(())
}

fn run_camera_test(settings: &Settings, save: Option<&Path>) -> Result<()> {
    println!("Running camera diagnostics...");
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("no V4L2 capture devices found");
    }
    for dev in &devices {
        println!("  {}: {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }

    let camera = Camera::open(
        &settings.camera_device,
        settings.frame_width,
        settings.frame_height,
    )?;
    println!(
        "opened {} at {}x{} ({:?})",
        camera.device_path, camera.width, camera.height, camera.fourcc
    );

    let frame = camera.capture_frame(settings.warmup_frames)?;
    println!(
        "frame {}: brightness {:.1}, dark: {}",
        frame.sequence,
        frame.avg_brightness(),
        frame.is_dark
    );

    if let Some(path) = save {
        let still = frame.encode_png()?;
        std::fs::write(path, &still.data).with_context(|| format!("writing {}", path.display()))?;
        println!("saved {}", path.display());
    }

    let mut feed = CameraFeed::start(camera, settings.warmup_frames)?;
    let started = std::time::Instant::now();
    let mut received = 0usize;
    while started.elapsed() < Duration::from_secs(2) && feed.is_running() {
        if feed.current_frame().is_some() {
            received += 1;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    println!(
        "streamed {received} usable frames in {:.1}s",
        started.elapsed().as_secs_f32()
    );
    feed.stop()?;
    Ok(())
}
