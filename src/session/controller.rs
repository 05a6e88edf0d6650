//! Session controller
//!
//! Each session runs on one control task that owns its `CaptureSession`.
//! Captures, composition, encoding and transcoding run on blocking workers
//! and hand their results back by value. Phase and result are published
//! for the UI layer; only the control task writes them.

use super::cancel::CancelFlag;
use super::countdown::{Countdown, Tick};
use super::state::{
    CaptureSession, SessionEvent, SessionKind, SessionPhase, SessionRequest, SessionResult,
    SessionTarget,
};
use super::ticker::{second_ticker, TickerFactory};
use crate::capture::{CameraDevice, CameraProvider, MicrophoneFactory, WebcamProvider};
use crate::compose::{write_artifact, CollageLayout, Composer, Overlay};
use crate::pipeline::{CanvasSpec, Frame, FramePipeline, FrameTransform, PipelineConfig};
use crate::recorder::sink::SINK_OPEN_BACKOFF;
use crate::recorder::{
    AudioChannelFactory, FfmpegSinkFactory, Finalizer, RecordingConfig, RecordingCoordinator,
    SinkFactory, VideoChannel,
};
use crate::settings::BoothSettings;
use crate::transcode::{FfmpegTranscoder, Transcoder};
use crate::upload::{DriveClient, Publisher, RemoteStorage, RetryPolicy, UploadDestination};
use crate::utils::fs::{ArtifactPaths, CLEANUP_BACKOFF};
use crate::utils::{BoothError, BoothResult, ErrorResponse};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// External collaborators of a session
pub struct BoothServices {
    pub camera: Arc<dyn CameraProvider>,
    pub sinks: Arc<dyn SinkFactory>,
    pub audio: Arc<dyn AudioChannelFactory>,
    pub transcoder: Arc<dyn Transcoder>,
    /// `None` runs the booth offline
    pub storage: Option<Arc<dyn RemoteStorage>>,
    pub ticker: TickerFactory,
}

impl BoothServices {
    /// Webcam, ffmpeg, default microphone and Google Drive (if configured)
    pub fn from_settings(settings: &BoothSettings) -> BoothResult<Self> {
        let camera = &settings.camera;
        let storage: Option<Arc<dyn RemoteStorage>> = match &settings.upload {
            Some(upload) => {
                let client = DriveClient::from_settings(upload)
                    .map_err(|e| BoothError::Config(e.to_string()))?;
                Some(Arc::new(client))
            }
            None => None,
        };

        Ok(Self {
            camera: Arc::new(WebcamProvider::new(
                camera.index,
                camera.frame_rate,
                camera.width,
                camera.height,
            )),
            sinks: Arc::new(FfmpegSinkFactory::default()),
            audio: Arc::new(MicrophoneFactory),
            transcoder: Arc::new(FfmpegTranscoder::default()),
            storage,
            ticker: second_ticker(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub cleanup_backoff: Duration,
    pub sink_backoff: Duration,
    pub retry: RetryPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            cleanup_backoff: CLEANUP_BACKOFF,
            sink_backoff: SINK_OPEN_BACKOFF,
            retry: RetryPolicy::default(),
        }
    }
}

/// Resolved parameters of one session
#[derive(Debug, Clone, Copy)]
struct SessionPlan {
    kind: SessionKind,
    shots: u32,
    countdown: u32,
    duration_seconds: u32,
    record_audio: bool,
    reuse_last: bool,
}

/// Terminal failure plus any local artifact that survived it
#[derive(Debug)]
struct SessionFailure {
    error: BoothError,
    artifact: Option<PathBuf>,
}

impl SessionFailure {
    fn keeping(error: BoothError, artifact: &Path) -> Self {
        Self {
            error,
            artifact: Some(artifact.to_path_buf()),
        }
    }
}

impl From<BoothError> for SessionFailure {
    fn from(error: BoothError) -> Self {
        let artifact = match &error {
            BoothError::TranscodeFailed { preserved, .. } => preserved.clone(),
            _ => None,
        };
        Self { error, artifact }
    }
}

type SessionOutcome = Result<SessionResult, SessionFailure>;

struct Inner {
    settings: BoothSettings,
    services: BoothServices,
    options: ControllerOptions,
    device: Arc<CameraDevice>,
    pipeline: FramePipeline,
    capture_transform: FrameTransform,
    composer: Composer,
    video_overlay: Option<Arc<Overlay>>,
    publisher: Option<Publisher>,
    destination: RwLock<Option<UploadDestination>>,
    phase: RwLock<SessionPhase>,
    result: RwLock<Option<SessionResult>>,
    cancel: CancelFlag,
    events: broadcast::Sender<SessionEvent>,
}

/// Entry point for the UI layer. Cheap to clone.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

async fn blocking<T, F>(f: F) -> BoothResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> BoothResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BoothError::InvalidState(format!("Worker failed: {}", e)))?
}

impl SessionController {
    pub fn new(settings: BoothSettings, services: BoothServices) -> BoothResult<Self> {
        Self::with_options(settings, services, ControllerOptions::default())
    }

    pub fn with_options(
        settings: BoothSettings,
        services: BoothServices,
        options: ControllerOptions,
    ) -> BoothResult<Self> {
        let camera = &settings.camera;
        let canvas = &settings.canvas;
        let capture_transform = FrameTransform {
            rotation: camera.rotation,
            mirror: camera.mirror,
            canvas: CanvasSpec::new(canvas.width, canvas.height, canvas.border_color),
        };
        let preview_transform = FrameTransform {
            canvas: CanvasSpec::new(
                canvas.preview_width,
                canvas.preview_height,
                canvas.border_color,
            ),
            ..capture_transform
        };

        let composer = Composer::from_settings(&settings)?;
        let mut pipeline_config = PipelineConfig::new(capture_transform, preview_transform);
        if settings.photo.preview_overlay {
            pipeline_config.preview_overlay = composer.overlay();
        }

        let video_overlay = match &settings.video.overlay_path {
            Some(path) => Some(Arc::new(Overlay::load(path)?)),
            None => None,
        };

        let publisher = match (&services.storage, &settings.upload) {
            (Some(storage), Some(upload)) => {
                Some(Publisher::new(storage.clone(), upload).with_retry(options.retry))
            }
            _ => None,
        };
        let destination = settings
            .upload
            .as_ref()
            .and_then(UploadDestination::from_settings);

        let device = Arc::new(CameraDevice::new(services.camera.clone()));
        let pipeline = FramePipeline::new(device.clone(), pipeline_config);
        let (events, _) = broadcast::channel(64);

        tracing::info!(
            "Session controller ready: canvas {}x{}, output {:?}, {}",
            canvas.width,
            canvas.height,
            settings.output_dir,
            if publisher.is_some() { "online" } else { "offline" }
        );

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                services,
                options,
                device,
                pipeline,
                capture_transform,
                composer,
                video_overlay,
                publisher,
                destination: RwLock::new(destination),
                phase: RwLock::new(SessionPhase::Idle),
                result: RwLock::new(None),
                cancel: CancelFlag::new(),
                events,
            }),
        })
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.read()
    }

    /// Result of the last completed session
    pub fn result(&self) -> Option<SessionResult> {
        self.inner.result.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn camera_in_use(&self) -> bool {
        !self.inner.device.is_free()
    }

    pub fn publisher(&self) -> Option<&Publisher> {
        self.inner.publisher.as_ref()
    }

    /// Select the event folder artifacts are published into
    pub fn set_event_folder(&self, folder_id: &str) -> BoothResult<()> {
        let upload = self
            .inner
            .settings
            .upload
            .as_ref()
            .ok_or_else(|| BoothError::Config("Uploads are not configured".to_string()))?;
        *self.inner.destination.write() = Some(UploadDestination {
            event_folder_id: folder_id.to_string(),
            pooled_root_id: upload.pooled_root_id.clone(),
        });
        tracing::info!("Publishing into event folder {}", folder_id);
        Ok(())
    }

    /// Latest live frame; never blocks
    pub fn preview_frame(&self) -> Option<Frame> {
        self.inner.pipeline.latest_preview()
    }

    pub async fn start_preview(&self) -> BoothResult<()> {
        self.ensure_preview().await
    }

    /// Release the camera. Only allowed between sessions.
    pub async fn stop_preview(&self) -> BoothResult<()> {
        let phase = self.phase();
        if phase != SessionPhase::Idle {
            return Err(BoothError::InvalidState(format!(
                "Cannot stop preview while {:?}",
                phase
            )));
        }
        self.release_preview().await;
        Ok(())
    }

    /// Begin a session. Rejected unless the booth is idle.
    pub fn start_session(&self, request: SessionRequest) -> BoothResult<Uuid> {
        let plan = self.plan(&request)?;
        let target = match plan.kind {
            SessionKind::Video => {
                SessionTarget::Duration(Duration::from_secs(plan.duration_seconds as u64))
            }
            _ => SessionTarget::Shots(plan.shots),
        };
        let session = CaptureSession::new(plan.kind, target);
        let id = session.id;

        {
            let mut phase = self.inner.phase.write();
            if *phase != SessionPhase::Idle {
                return Err(BoothError::InvalidState(format!(
                    "A session is already running ({:?})",
                    *phase
                )));
            }
            self.inner.cancel.reset();
            *phase = SessionPhase::Countdown(plan.countdown);
        }
        *self.inner.result.write() = None;

        tracing::info!("Starting {:?} session {} ({:?})", plan.kind, id, target);
        let controller = self.clone();
        tokio::spawn(async move { controller.run(session, plan).await });
        Ok(id)
    }

    /// Cancel during countdown or capture. In Idle this only releases the
    /// camera.
    pub async fn cancel_session(&self) -> BoothResult<()> {
        let phase = self.phase();
        if !phase.is_cancellable() {
            return Err(BoothError::InvalidState(format!(
                "Cannot cancel while {:?}",
                phase
            )));
        }
        if phase == SessionPhase::Idle {
            self.release_preview().await;
            return Ok(());
        }
        tracing::info!("Cancelling session during {:?}", phase);
        self.inner.cancel.cancel();
        Ok(())
    }

    fn plan(&self, request: &SessionRequest) -> BoothResult<SessionPlan> {
        let settings = &self.inner.settings;
        let shots = match request.kind {
            SessionKind::Photo => 1,
            SessionKind::Burst => request
                .shot_count
                .or_else(|| self.inner.composer.template_slots().map(|n| n as u32))
                .unwrap_or(settings.photo.burst_count),
            SessionKind::Video => 0,
        };
        if request.kind == SessionKind::Burst && shots == 0 {
            return Err(BoothError::Config("A burst needs at least one shot".to_string()));
        }
        if request.kind != SessionKind::Video {
            match self.inner.composer.template_slots() {
                Some(slots) if slots != shots as usize => {
                    return Err(BoothError::Config(format!(
                        "Template has {} slots but {} photos were requested",
                        slots, shots
                    )));
                }
                None if CollageLayout::for_count(shots as usize).is_none() => {
                    return Err(BoothError::Config(format!(
                        "No collage layout for {} photos",
                        shots
                    )));
                }
                _ => {}
            }
        }

        let countdown = match request.kind {
            SessionKind::Video => settings.video.countdown_seconds,
            _ => settings.photo.countdown_seconds,
        };

        Ok(SessionPlan {
            kind: request.kind,
            shots,
            countdown,
            duration_seconds: request
                .duration_seconds
                .unwrap_or(settings.video.duration_seconds)
                .max(1),
            record_audio: request.record_audio.unwrap_or(settings.video.record_audio),
            reuse_last: request.reuse_last,
        })
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.events.send(event);
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.inner.phase.write() = phase;
        tracing::debug!("Session phase: {:?}", phase);
        self.emit(SessionEvent::PhaseChanged { phase });
    }

    async fn ensure_preview(&self) -> BoothResult<()> {
        if self.inner.pipeline.is_running() {
            return Ok(());
        }
        let inner = self.inner.clone();
        blocking(move || inner.pipeline.start()).await
    }

    async fn release_preview(&self) {
        let inner = self.inner.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || inner.pipeline.stop()).await {
            tracing::error!("Failed to stop frame pipeline: {}", e);
        }
    }

    async fn run(self, mut session: CaptureSession, plan: SessionPlan) {
        let outcome = match plan.kind {
            SessionKind::Photo | SessionKind::Burst => self.run_photo(&mut session, &plan).await,
            SessionKind::Video => self.run_video(&mut session, &plan).await,
        };
        self.finish(session, outcome).await;
    }

    /// Count `seconds` down on the session ticker, showing each value still
    /// to go. Returns once the countdown fires.
    async fn count_down(&self, seconds: u32, show: impl Fn(u32)) -> BoothResult<()> {
        let mut countdown = Countdown::new(seconds);
        let mut ticker = (self.inner.services.ticker)();
        show(countdown.remaining());
        loop {
            tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => return Err(BoothError::Cancelled),
                _ = ticker.tick() => {}
            }
            match countdown.tick() {
                Tick::Remaining(n) => show(n),
                Tick::Fire | Tick::Elapsed => return Ok(()),
            }
        }
    }

    async fn shot_countdown(&self, seconds: u32) -> BoothResult<()> {
        let result = self
            .count_down(seconds, |n| {
                self.set_phase(SessionPhase::Countdown(n));
                self.inner.pipeline.set_countdown(Some(n));
            })
            .await;
        self.inner.pipeline.set_countdown(None);
        result
    }

    fn check_cancelled(&self) -> BoothResult<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(BoothError::Cancelled);
        }
        Ok(())
    }

    async fn prepare_output(&self, session: &CaptureSession) -> BoothResult<ArtifactPaths> {
        let dir = &self.inner.settings.output_dir;
        tokio::fs::create_dir_all(dir).await?;
        Ok(ArtifactPaths::new(dir, session.started_at))
    }

    async fn run_photo(&self, session: &mut CaptureSession, plan: &SessionPlan) -> SessionOutcome {
        self.ensure_preview().await?;

        let total = plan.shots;
        for index in 1..=total {
            self.shot_countdown(plan.countdown).await?;
            self.set_phase(SessionPhase::Capturing);

            let inner = self.inner.clone();
            let shot = blocking(move || inner.pipeline.capture_frame()).await;
            self.check_cancelled()?;

            match shot {
                Ok(frame) => {
                    session.push_frame(frame);
                    tracing::info!("Captured shot {}/{}", index, total);
                    self.emit(SessionEvent::ShotCaptured { index, total });
                }
                Err(e) => {
                    session.skip_shot();
                    tracing::warn!("Shot {}/{} skipped: {}", index, total, e);
                    self.emit(SessionEvent::ShotSkipped {
                        index,
                        total,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if session.captured() < total {
            return Err(BoothError::CompositionFailed(format!(
                "Only {} of {} photos were captured",
                session.captured(),
                total
            ))
            .into());
        }

        self.set_phase(SessionPhase::Composing);
        let paths = self.prepare_output(session).await?;
        let format = self.inner.settings.photo.format;
        let artifact = paths.photo(format.extension());

        let frames = session.take_frames();
        let composer = self.inner.composer.clone();
        let output = artifact.clone();
        blocking(move || {
            let image = composer.compose(&frames)?;
            write_artifact(&image, &output, format)
        })
        .await?;
        tracing::info!("Wrote {:?}", artifact);

        self.publish(session, &paths, artifact, plan.reuse_last).await
    }

    async fn run_video(&self, session: &mut CaptureSession, plan: &SessionPlan) -> SessionOutcome {
        self.ensure_preview().await?;
        self.shot_countdown(plan.countdown).await?;
        self.set_phase(SessionPhase::Capturing);

        // The recorder takes over the camera
        self.release_preview().await;

        let settings = &self.inner.settings;
        let paths = self.prepare_output(session).await?;
        let config = RecordingConfig {
            video_path: paths.video(),
            audio_path: paths.audio(),
            duration: Duration::from_secs(plan.duration_seconds as u64),
            frame_rate: settings.video.frame_rate,
            record_audio: plan.record_audio,
            microphone: settings.video.microphone.clone(),
            audio_pre_roll: Duration::from_secs(settings.video.audio_pre_roll_seconds as u64),
        };

        let mut coordinator =
            RecordingCoordinator::new().with_cleanup_backoff(self.inner.options.cleanup_backoff);
        coordinator.add_channel(Box::new(
            VideoChannel::new(
                self.inner.device.clone(),
                self.inner.services.sinks.clone(),
                self.inner.capture_transform,
                config.video_path.clone(),
                config.frame_rate,
                config.duration,
            )
            .with_sink_backoff(self.inner.options.sink_backoff),
        ));
        if config.record_audio {
            coordinator.add_channel(self.inner.services.audio.create(
                &config.audio_path,
                config.duration + config.audio_pre_roll,
                config.microphone.as_deref(),
            ));
        }

        coordinator.start().await.map_err(BoothError::from)?;

        let timer = self
            .count_down(plan.duration_seconds, |n| {
                self.emit(SessionEvent::Countdown { remaining: n })
            })
            .await;
        if let Err(e) = timer {
            coordinator.cancel().await;
            return Err(e.into());
        }
        let recording = coordinator.stop().await.map_err(BoothError::from)?;

        self.set_phase(SessionPhase::Composing);
        let finalizer = Finalizer::new(self.inner.services.transcoder.clone())
            .with_cleanup_backoff(self.inner.options.cleanup_backoff);
        let overlay = self.inner.video_overlay.clone();
        let canvas = (
            self.inner.capture_transform.canvas.width,
            self.inner.capture_transform.canvas.height,
        );
        let finalize_paths = paths.clone();
        let video = blocking(move || {
            finalizer.finalize(&recording, overlay.as_deref(), canvas, &finalize_paths)
        })
        .await?;

        self.publish(session, &paths, video, plan.reuse_last).await
    }

    async fn publish(
        &self,
        session: &CaptureSession,
        paths: &ArtifactPaths,
        artifact: PathBuf,
        reuse_last: bool,
    ) -> SessionOutcome {
        let mut result = SessionResult {
            session_id: session.id,
            kind: session.kind,
            artifact: artifact.clone(),
            link: None,
            qr_path: None,
        };

        let Some(publisher) = &self.inner.publisher else {
            tracing::info!("Offline, keeping {:?} locally", artifact);
            return Ok(result);
        };

        self.set_phase(SessionPhase::Publishing);
        let destination = self.inner.destination.read().clone().ok_or_else(|| {
            SessionFailure::keeping(
                BoothError::PublishFailed("No event folder selected".to_string()),
                &artifact,
            )
        })?;

        let publication = publisher
            .publish(&artifact, &destination, reuse_last)
            .await
            .map_err(|e| SessionFailure::keeping(e, &artifact))?;

        let qr_path = paths.qr();
        let qr = publication.qr;
        let qr_output = qr_path.clone();
        blocking(move || qr.save(&qr_output).map_err(BoothError::from))
            .await
            .map_err(|e| SessionFailure::keeping(e, &artifact))?;

        result.link = Some(publication.link);
        result.qr_path = Some(qr_path);
        Ok(result)
    }

    async fn finish(&self, session: CaptureSession, outcome: SessionOutcome) {
        match outcome {
            Ok(result) => {
                tracing::info!("Session {} complete: {:?}", session.id, result.artifact);
                *self.inner.result.write() = Some(result.clone());
                self.set_phase(SessionPhase::Result);
                self.emit(SessionEvent::Completed { result });
            }
            Err(failure) if failure.error.is_cancelled() => {
                tracing::info!(
                    "Session {} cancelled with {} shot(s) discarded",
                    session.id,
                    session.captured()
                );
                self.set_phase(SessionPhase::Cancelled);
                self.emit(SessionEvent::Cancelled);
            }
            Err(failure) => {
                tracing::error!("Session {} failed: {}", session.id, failure.error);
                self.set_phase(SessionPhase::Error);
                self.emit(SessionEvent::Failed {
                    error: ErrorResponse::from(&failure.error),
                    artifact: failure.artifact,
                });
            }
        }

        drop(session);
        self.release_preview().await;
        self.inner.cancel.reset();
        self.set_phase(SessionPhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::SlotRect;
    use crate::pipeline::Rotation;
    use crate::session::ticker::ManualClock;
    use crate::settings::UploadSettings;
    use crate::testing::{
        FakeAudioFactory, MemorySinks, ScriptedStorage, StubTranscoder, SyntheticCamera,
    };
    use image::{Rgba, RgbaImage};

    struct Harness {
        controller: SessionController,
        camera: SyntheticCamera,
        clock: ManualClock,
        transcoder: Arc<StubTranscoder>,
        storage: Arc<ScriptedStorage>,
        audio: Arc<FakeAudioFactory>,
        dir: tempfile::TempDir,
    }

    fn harness(online: bool, configure: impl FnOnce(&mut BoothSettings, &Path)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = BoothSettings::default();
        settings.output_dir = dir.path().join("photos");
        settings.camera.rotation = Rotation::None;
        settings.canvas.width = 120;
        settings.canvas.height = 180;
        settings.canvas.preview_width = 60;
        settings.canvas.preview_height = 90;
        settings.video.frame_rate = 30;
        if online {
            settings.upload = Some(UploadSettings {
                events_root_id: "events".into(),
                pooled_root_id: "pooled".into(),
                event_folder_id: Some("event-1".into()),
                share_link_base: "https://share.example/".into(),
                qr_size: 64,
                ..Default::default()
            });
        }
        configure(&mut settings, dir.path());

        let camera = SyntheticCamera::new(64, 48);
        let clock = ManualClock::new();
        let transcoder = Arc::new(StubTranscoder::new());
        let storage = Arc::new(ScriptedStorage::new());
        let audio = Arc::new(FakeAudioFactory::new());
        let services = BoothServices {
            camera: camera.provider(),
            sinks: MemorySinks::new().factory(),
            audio: audio.clone(),
            transcoder: transcoder.clone(),
            storage: if online {
                Some(storage.clone() as Arc<dyn RemoteStorage>)
            } else {
                None
            },
            ticker: clock.factory(),
        };
        let options = ControllerOptions {
            cleanup_backoff: Duration::ZERO,
            sink_backoff: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
            },
        };
        let controller = SessionController::with_options(settings, services, options).unwrap();

        Harness {
            controller,
            camera,
            clock,
            transcoder,
            storage,
            audio,
            dir,
        }
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<SessionEvent>,
        matches: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(20), async {
            loop {
                let event = rx.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    /// Every event up to and including the return to Idle
    async fn until_idle(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        tokio::time::timeout(Duration::from_secs(20), async {
            let mut events = Vec::new();
            loop {
                let event = rx.recv().await.unwrap();
                let idle = event
                    == SessionEvent::PhaseChanged {
                        phase: SessionPhase::Idle,
                    };
                events.push(event);
                if idle {
                    return events;
                }
            }
        })
        .await
        .unwrap()
    }

    fn completed(events: &[SessionEvent]) -> SessionResult {
        events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Completed { result } => Some(result.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no completion in {:?}", events))
    }

    fn failed(events: &[SessionEvent]) -> (ErrorResponse, Option<PathBuf>) {
        events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Failed { error, artifact } => Some((error.clone(), artifact.clone())),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no failure in {:?}", events))
    }

    fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .map(|n| n.to_string_lossy().starts_with(prefix))
                            .unwrap_or(false)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_offline_photo_session() {
        let h = harness(false, |_, _| {});
        let mut rx = h.controller.subscribe();

        h.controller.start_session(SessionRequest::photo()).unwrap();
        h.clock.advance(3);
        let events = until_idle(&mut rx).await;

        let countdowns: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::PhaseChanged {
                    phase: SessionPhase::Countdown(n),
                } => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(countdowns, vec![3, 2, 1]);

        let result = completed(&events);
        assert!(result.artifact.exists());
        assert_eq!(result.artifact.extension().unwrap(), "jpg");
        assert!(result.link.is_none());
        assert_eq!(image::image_dimensions(&result.artifact).unwrap(), (120, 180));

        assert_eq!(h.controller.phase(), SessionPhase::Idle);
        assert_eq!(h.controller.result(), Some(result));
        assert!(!h.camera.is_open());
        assert!(!h.controller.camera_in_use());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_start_is_rejected() {
        let h = harness(false, |_, _| {});
        let mut rx = h.controller.subscribe();

        h.controller.start_session(SessionRequest::photo()).unwrap();
        let err = h
            .controller
            .start_session(SessionRequest::burst(Some(4)))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        h.controller.cancel_session().await.unwrap();
        let events = until_idle(&mut rx).await;
        assert!(events.contains(&SessionEvent::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_burst_publishes_link_and_qr() {
        let h = harness(true, |_, _| {});
        let mut rx = h.controller.subscribe();

        h.controller
            .start_session(SessionRequest::burst(Some(4)))
            .unwrap();
        h.clock.advance(12);
        let events = until_idle(&mut rx).await;

        let shots: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ShotCaptured { index, total: 4 } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(shots, vec![1, 2, 3, 4]);

        let result = completed(&events);
        let link = result.link.clone().unwrap();
        assert!(link.starts_with("https://share.example/folder-"));
        assert!(result.qr_path.as_ref().unwrap().exists());
        assert_eq!(image::image_dimensions(&result.artifact).unwrap(), (120, 180));
        assert_eq!(h.storage.count("upload:event-1:"), 1);
        assert_eq!(h.storage.count("upload:folder-"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_mid_burst_skips_composition() {
        let h = harness(false, |_, _| {});
        let mut rx = h.controller.subscribe();

        h.controller
            .start_session(SessionRequest::burst(Some(4)))
            .unwrap();
        h.clock.advance(6);
        next_matching(&mut rx, |e| {
            matches!(e, SessionEvent::ShotCaptured { index: 2, .. })
        })
        .await;

        h.controller.cancel_session().await.unwrap();
        let events = until_idle(&mut rx).await;

        assert!(events.contains(&SessionEvent::Cancelled));
        assert!(!events.contains(&SessionEvent::PhaseChanged {
            phase: SessionPhase::Composing
        }));
        assert!(files_with_prefix(&h.dir.path().join("photos"), "photo_").is_empty());
        assert!(!h.camera.is_open());
        assert_eq!(h.controller.phase(), SessionPhase::Idle);
        assert!(h.controller.result().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missed_shot_fails_instead_of_partial_artifact() {
        let h = harness(false, |_, _| {});
        h.camera.fail_next_reads(u32::MAX);
        let mut rx = h.controller.subscribe();

        h.controller.start_session(SessionRequest::photo()).unwrap();
        h.clock.advance(3);
        let events = until_idle(&mut rx).await;

        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ShotSkipped { index: 1, .. })));
        let (error, artifact) = failed(&events);
        assert_eq!(error.code, "COMPOSITION_FAILED");
        assert!(artifact.is_none());
        assert!(files_with_prefix(&h.dir.path().join("photos"), "photo_").is_empty());
        assert!(!h.camera.is_open());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_failure_keeps_local_artifact() {
        let h = harness(true, |_, _| {});
        h.storage.fail_times("upload", 3);
        let mut rx = h.controller.subscribe();

        h.controller.start_session(SessionRequest::photo()).unwrap();
        h.clock.advance(3);
        let events = until_idle(&mut rx).await;

        let (error, artifact) = failed(&events);
        assert_eq!(error.code, "PUBLISH_FAILED");
        let artifact = artifact.unwrap();
        assert!(artifact.exists());
        assert!(std::fs::metadata(&artifact).unwrap().len() > 0);
        assert!(h.controller.result().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_template_slots_set_burst_length() {
        let h = harness(false, |settings, dir| {
            let template = dir.join("template.png");
            RgbaImage::from_pixel(120, 180, Rgba([255, 255, 255, 0]))
                .save(&template)
                .unwrap();
            settings.photo.template_path = Some(template);
            settings.photo.slots =
                vec![SlotRect::new(10, 10, 100, 70), SlotRect::new(10, 100, 100, 70)];
        });
        let mut rx = h.controller.subscribe();

        h.controller.start_session(SessionRequest::burst(None)).unwrap();
        h.clock.advance(6);
        let events = until_idle(&mut rx).await;

        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ShotCaptured { index: 2, total: 2 })));
        let result = completed(&events);
        assert_eq!(image::image_dimensions(&result.artifact).unwrap(), (120, 180));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_burst_without_layout_is_rejected_before_capture() {
        let h = harness(false, |_, _| {});
        let mut rx = h.controller.subscribe();

        for count in [3, 5] {
            let err = h
                .controller
                .start_session(SessionRequest::burst(Some(count)))
                .unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
        }

        assert_eq!(h.controller.phase(), SessionPhase::Idle);
        assert_eq!(h.camera.opened(), 0);
        assert!(rx.try_recv().is_err());

        // A supported count still runs
        h.controller
            .start_session(SessionRequest::burst(Some(6)))
            .unwrap();
        h.controller.cancel_session().await.unwrap();
        let events = until_idle(&mut rx).await;
        assert!(events.contains(&SessionEvent::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_count_must_match_template_slots() {
        let h = harness(false, |settings, dir| {
            let template = dir.join("template.png");
            RgbaImage::from_pixel(120, 180, Rgba([255, 255, 255, 0]))
                .save(&template)
                .unwrap();
            settings.photo.template_path = Some(template);
            settings.photo.slots =
                vec![SlotRect::new(10, 10, 100, 70), SlotRect::new(10, 100, 100, 70)];
        });

        let err = h
            .controller
            .start_session(SessionRequest::burst(Some(4)))
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert_eq!(h.controller.phase(), SessionPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_video_session_muxes_audio() {
        let h = harness(false, |_, _| {});
        let mut rx = h.controller.subscribe();

        h.controller
            .start_session(SessionRequest::video(Some(1)).with_audio(true))
            .unwrap();
        h.clock.advance(3);
        next_matching(&mut rx, |e| *e == SessionEvent::Countdown { remaining: 1 }).await;
        h.clock.advance(1);
        let events = until_idle(&mut rx).await;

        let result = completed(&events);
        assert_eq!(result.kind, SessionKind::Video);
        assert!(result.artifact.exists());
        assert_eq!(h.transcoder.jobs(), vec!["mux"]);
        // Microphone window covers the clip plus the 3s pre-roll
        assert_eq!(h.audio.requested(), vec![(Duration::from_secs(4), None)]);
        let photos = h.dir.path().join("photos");
        assert!(files_with_prefix(&photos, "audio_").is_empty());
        assert!(files_with_prefix(&photos, "final_").is_empty());
        assert!(!h.camera.is_open());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_recording_discards_files() {
        let h = harness(false, |_, _| {});
        let mut rx = h.controller.subscribe();

        h.controller
            .start_session(SessionRequest::video(Some(30)).with_audio(true))
            .unwrap();
        h.clock.advance(3);
        next_matching(&mut rx, |e| *e == SessionEvent::Countdown { remaining: 30 }).await;
        assert_eq!(h.controller.phase(), SessionPhase::Capturing);

        h.controller.cancel_session().await.unwrap();
        let events = until_idle(&mut rx).await;

        assert!(events.contains(&SessionEvent::Cancelled));
        let photos = h.dir.path().join("photos");
        assert!(files_with_prefix(&photos, "video_").is_empty());
        assert!(files_with_prefix(&photos, "audio_").is_empty());
        assert!(h.transcoder.jobs().is_empty());
        assert!(!h.camera.is_open());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_when_idle_releases_preview() {
        let h = harness(false, |_, _| {});
        h.controller.start_preview().await.unwrap();
        assert!(h.camera.is_open());

        h.controller.cancel_session().await.unwrap();
        assert!(!h.camera.is_open());
        assert_eq!(h.controller.phase(), SessionPhase::Idle);
    }
}
