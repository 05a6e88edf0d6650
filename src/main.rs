//! photobooth - headless kiosk driver
//!
//! Subcommands:
//! - `photobooth photo` - single photo session
//! - `photobooth burst [--count N]` - burst session composed into one print
//! - `photobooth video [--duration S] [--no-audio]` - video session
//! - `photobooth events list|create NAME` - manage remote event folders
//! - `photobooth devices` - list cameras and microphones

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use photobooth_lib::capture::{list_cameras, list_microphones};
use photobooth_lib::session::{SessionPhase, SessionResult};
use photobooth_lib::settings::{default_settings_path, load_settings};
use photobooth_lib::upload::{DriveClient, Publisher};
use photobooth_lib::{BoothServices, BoothSettings, SessionController, SessionEvent, SessionRequest};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "photobooth")]
#[command(about = "Unattended photo and video booth")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Event folder to publish into, overriding the settings
    #[arg(short, long, global = true)]
    event: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a single photo
    Photo {
        /// Reuse the pooled folder of the previous session
        #[arg(long)]
        reuse_last: bool,
    },

    /// Take a burst of photos composed into one print
    Burst {
        /// Number of shots (defaults to the template slots or settings)
        #[arg(short, long)]
        count: Option<u32>,

        #[arg(long)]
        reuse_last: bool,
    },

    /// Record a video clip
    Video {
        /// Recording length in seconds
        #[arg(short, long)]
        duration: Option<u32>,

        /// Record without the microphone
        #[arg(long)]
        no_audio: bool,

        #[arg(long)]
        reuse_last: bool,
    },

    /// Manage remote event folders
    Events {
        #[command(subcommand)]
        action: EventAction,
    },

    /// List cameras and microphones
    Devices,
}

#[derive(Subcommand)]
enum EventAction {
    /// List event folders under the events root
    List,

    /// Create an event folder
    Create {
        /// Folder name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    photobooth_lib::init_tracing();

    let cli = Cli::parse();
    let path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    match cli.command {
        Commands::Photo { reuse_last } => {
            let request = SessionRequest::photo().with_reuse_last(reuse_last);
            run_session(settings, cli.event, request).await
        }
        Commands::Burst { count, reuse_last } => {
            let request = SessionRequest::burst(count).with_reuse_last(reuse_last);
            run_session(settings, cli.event, request).await
        }
        Commands::Video {
            duration,
            no_audio,
            reuse_last,
        } => {
            let mut request = SessionRequest::video(duration).with_reuse_last(reuse_last);
            if no_audio {
                request = request.with_audio(false);
            }
            run_session(settings, cli.event, request).await
        }
        Commands::Events { action } => events(settings, action).await,
        Commands::Devices => {
            devices();
            Ok(())
        }
    }
}

async fn run_session(
    settings: BoothSettings,
    event: Option<String>,
    request: SessionRequest,
) -> Result<()> {
    let services = BoothServices::from_settings(&settings)?;
    let controller = SessionController::new(settings, services)?;
    if let Some(event) = event {
        controller.set_event_folder(&event)?;
    }

    let mut events = controller.subscribe();
    let id = controller.start_session(request)?;
    println!("Session {}", id);

    let mut outcome: Option<Result<SessionResult>> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = controller.cancel_session().await {
                    eprintln!("Cannot cancel now: {}", e);
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::PhaseChanged { phase: SessionPhase::Idle }) => break,
                Ok(SessionEvent::PhaseChanged { phase: SessionPhase::Countdown(n) }) => {
                    println!("{}...", n)
                }
                Ok(SessionEvent::PhaseChanged { phase }) => tracing::debug!("Phase {:?}", phase),
                Ok(SessionEvent::Countdown { remaining }) => println!("Recording: {}s left", remaining),
                Ok(SessionEvent::ShotCaptured { index, total }) => println!("Shot {}/{}", index, total),
                Ok(SessionEvent::ShotSkipped { index, total, reason }) => {
                    println!("Shot {}/{} missed: {}", index, total, reason)
                }
                Ok(SessionEvent::Completed { result }) => outcome = Some(Ok(result)),
                Ok(SessionEvent::Failed { error, artifact }) => {
                    if let Some(artifact) = artifact {
                        println!("Artifact kept at {}", artifact.display());
                    }
                    outcome = Some(Err(anyhow::anyhow!("{}: {}", error.code, error.message)));
                }
                Ok(SessionEvent::Cancelled) => println!("Cancelled"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} session events", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    match outcome {
        Some(Ok(result)) => {
            println!("Saved {}", result.artifact.display());
            if let Some(link) = result.link {
                println!("Share link: {}", link);
            }
            if let Some(qr) = result.qr_path {
                println!("QR code: {}", qr.display());
            }
            Ok(())
        }
        Some(Err(e)) => Err(e),
        None => Ok(()),
    }
}

async fn events(settings: BoothSettings, action: EventAction) -> Result<()> {
    let Some(upload) = settings.upload.as_ref() else {
        bail!("No upload section in settings");
    };
    let client = DriveClient::from_settings(upload)?;
    let publisher = Publisher::new(Arc::new(client), upload);

    match action {
        EventAction::List => {
            for entry in publisher.list_events().await? {
                println!("{}\t{}", entry.id, entry.name);
            }
        }
        EventAction::Create { name } => {
            let id = publisher.create_event(&name).await?;
            println!("Created event {} ({})", name, id);
        }
    }
    Ok(())
}

fn devices() {
    println!("Cameras:");
    for camera in list_cameras() {
        println!("  [{}] {}", camera.id, camera.name);
    }
    println!("Microphones:");
    for mic in list_microphones() {
        let marker = if mic.is_default { " (default)" } else { "" };
        println!("  {}{}", mic.name, marker);
    }
}
