//! Capture orchestration.
//!
//! The [`AppSession`] owns all mutable state of the service: the model, the current
//! prediction, the webcam display surface and the webcam sampling loop. Two flows feed it
//! with frames:
//! - the webcam flow, a cancellable task sampling one frame per interval, and
//! - the upload flow, classifying a single decoded image.
//!
//! At most one sampling task exists at a time, start and stop are serialized by a mutex.
use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use common::protocol::{ModelStatus, Prediction, StatusMsg};
use image::RgbImage;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    config::Config,
    error::{CameraAccessError, ModelLoadError, UploadError},
    inferer::InferenceEngine,
    loader::ModelHandle,
    meter::{LoopGuard, Meter},
    overlay::draw_confidence_bar,
    sensors::{CameraDevice, CameraProvider},
    utils::encode_jpeg,
};

/// Lifecycle of the model. `Ready` and `Failed` are terminal.
#[derive(Clone, Debug)]
pub enum ModelState {
    Loading,
    Ready(ModelHandle),
    Failed(String),
}

impl ModelState {
    pub fn status(&self) -> ModelStatus {
        match self {
            ModelState::Loading => ModelStatus::Loading,
            ModelState::Ready(_) => ModelStatus::Ready,
            ModelState::Failed(reason) => ModelStatus::Failed(reason.clone()),
        }
    }

    pub fn handle(&self) -> Option<&ModelHandle> {
        match self {
            ModelState::Ready(handle) => Some(handle),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub resolution: (u32, u32),
    pub sample_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            resolution: (640, 480),
            sample_interval: Duration::from_secs(1),
            jpeg_quality: 80,
        }
    }
}

impl From<&Config> for CaptureSettings {
    fn from(config: &Config) -> Self {
        Self {
            resolution: config.camera_resolution(),
            sample_interval: config.sample_interval(),
            ..Default::default()
        }
    }
}

/// State shared between the session and its sampling task.
struct Shared {
    model: watch::Sender<ModelState>,
    prediction: watch::Sender<Option<Prediction>>,
    preview: watch::Sender<Option<Bytes>>,
    upload_preview: watch::Sender<Option<Bytes>>,
    notice: watch::Sender<Option<String>>,
    engine: InferenceEngine,
    meter: Arc<Meter>,
}

impl Shared {
    fn notify(&self, message: String) {
        self.notice.send_replace(Some(message));
    }

    /// Run the engine on a frame and publish the prediction, if any.
    fn classify(&self, frame: &RgbImage) -> Option<Prediction> {
        let model = self.model.borrow().handle().cloned();

        match self.engine.predict(model.as_ref(), frame) {
            Ok(Some(prediction)) => {
                self.prediction.send_replace(Some(prediction.clone()));
                Some(prediction)
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("Inference failed: {err}");
                self.notify(format!("Inference failed: {err}"));
                None
            }
        }
    }

    /// Capture one frame, classify it and publish it on the display surface.
    fn sample(&self, device: &mut dyn CameraDevice, jpeg_quality: u8) {
        let mut frame = match device.capture() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Skipping tick: {err}");
                return;
            }
        };
        self.meter.tick_sampled();

        self.classify(&frame);

        let prediction = self.prediction.borrow().clone();
        if let Some(prediction) = prediction {
            draw_confidence_bar(&mut frame, &prediction);
        }
        match encode_jpeg(&frame, jpeg_quality) {
            Ok(jpeg) => {
                self.preview.send_replace(Some(jpeg));
            }
            Err(err) => log::warn!("Failed to encode preview: {err}"),
        }
    }
}

/// A running sampling loop. Dropping it cancels the loop.
struct WebcamSession {
    token: CancellationToken,
    _cancel_on_drop: DropGuard,
    task: JoinHandle<()>,
}

pub struct AppSession {
    shared: Arc<Shared>,
    camera: Box<dyn CameraProvider>,
    settings: CaptureSettings,
    webcam: Mutex<Option<WebcamSession>>,
}

impl AppSession {
    pub fn new(
        camera: Box<dyn CameraProvider>,
        settings: CaptureSettings,
        meter: Arc<Meter>,
    ) -> Self {
        let shared = Shared {
            model: watch::channel(ModelState::Loading).0,
            prediction: watch::channel(None).0,
            preview: watch::channel(None).0,
            upload_preview: watch::channel(None).0,
            notice: watch::channel(None).0,
            engine: InferenceEngine::new(Arc::clone(&meter)),
            meter,
        };

        Self {
            shared: Arc::new(shared),
            camera,
            settings,
            webcam: Mutex::new(None),
        }
    }

    pub fn meter(&self) -> &Arc<Meter> {
        &self.shared.meter
    }

    /// Install the outcome of model loading. Only the first call has an effect.
    pub fn install_model(&self, result: Result<ModelHandle, ModelLoadError>) {
        if !matches!(*self.shared.model.borrow(), ModelState::Loading) {
            log::warn!("Model already installed, ignoring");
            return;
        }

        match result {
            Ok(handle) => {
                log::info!("Model installed: {handle:?}");
                self.shared.model.send_replace(ModelState::Ready(handle));
            }
            Err(err) => {
                log::error!("Model unavailable: {err}");
                self.shared.notify(format!("Model unavailable: {err}"));
                self.shared
                    .model
                    .send_replace(ModelState::Failed(err.to_string()));
            }
        }
    }

    pub fn model_status(&self) -> ModelStatus {
        self.shared.model.borrow().status()
    }

    pub fn prediction(&self) -> Option<Prediction> {
        self.shared.prediction.borrow().clone()
    }

    /// Latest webcam frame, `None` while the webcam is inactive.
    pub fn subscribe_preview(&self) -> watch::Receiver<Option<Bytes>> {
        self.shared.preview.subscribe()
    }

    pub fn upload_preview(&self) -> Option<Bytes> {
        self.shared.upload_preview.borrow().clone()
    }

    pub fn notice(&self) -> Option<String> {
        self.shared.notice.borrow().clone()
    }

    pub async fn is_webcam_active(&self) -> bool {
        self.webcam.lock().await.is_some()
    }

    pub async fn snapshot(&self) -> StatusMsg {
        StatusMsg {
            model: self.model_status(),
            webcam_active: self.is_webcam_active().await,
            prediction: self.prediction(),
            notice: self.notice(),
            upload_preview: self.shared.upload_preview.borrow().is_some(),
        }
    }

    /// Open the camera and start sampling. A no-op while already active.
    pub async fn start_webcam(&self) -> Result<(), CameraAccessError> {
        let mut webcam = self.webcam.lock().await;
        if webcam.is_some() {
            log::debug!("Webcam already active");
            return Ok(());
        }
        self.shared.notice.send_replace(None);

        let device = match self.camera.open(self.settings.resolution) {
            Ok(device) => device,
            Err(err) => {
                log::warn!("Webcam not started: {err}");
                self.shared.notify(err.to_string());
                return Err(err);
            }
        };

        let token = CancellationToken::new();
        let task = tokio::spawn(run_sampling(
            Arc::clone(&self.shared),
            device,
            self.settings.clone(),
            token.clone(),
            self.shared.meter.enter_loop(),
        ));
        log::info!(
            "Webcam started, sampling every {:?}",
            self.settings.sample_interval
        );

        *webcam = Some(WebcamSession {
            _cancel_on_drop: token.clone().drop_guard(),
            token,
            task,
        });
        Ok(())
    }

    /// Stop sampling, release the camera and clear the display surface and prediction.
    ///
    /// Safe to call while inactive, which leaves all state untouched.
    pub async fn stop_webcam(&self) {
        let mut webcam = self.webcam.lock().await;
        let session = match webcam.take() {
            Some(session) => session,
            None => {
                log::debug!("Webcam not active");
                return;
            }
        };

        session.token.cancel();
        if let Err(err) = session.task.await {
            log::error!("Sampling task failed: {err}");
        }

        self.shared.preview.send_replace(None);
        self.shared.prediction.send_replace(None);
        log::info!("Webcam stopped");
    }

    /// Decode an uploaded image, show it as preview and classify it once.
    pub fn classify_upload(&self, data: &[u8]) -> Result<Option<Prediction>, UploadError> {
        self.shared.notice.send_replace(None);

        let frame = match image::load_from_memory(data) {
            Ok(image) => image.to_rgb8(),
            Err(err) => {
                log::warn!("Upload rejected: {err}");
                self.shared.notify(format!("Could not decode image: {err}"));
                return Err(err.into());
            }
        };
        log::debug!("Decoded upload {}x{}", frame.width(), frame.height());

        let preview = encode_jpeg(&frame, self.settings.jpeg_quality)
            .map_err(|err| UploadError::Encode(err.to_string()))?;
        self.shared.upload_preview.send_replace(Some(preview));

        Ok(self.shared.classify(&frame))
    }

    /// Release everything held by the session.
    pub async fn shutdown(&self) {
        self.stop_webcam().await;
    }
}

async fn run_sampling(
    shared: Arc<Shared>,
    mut device: Box<dyn CameraDevice>,
    settings: CaptureSettings,
    token: CancellationToken,
    _loop_guard: LoopGuard,
) {
    let period = settings.sample_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    // A slow inference drops the samples it overlaps with
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => shared.sample(device.as_mut(), settings.jpeg_quality),
        }
    }

    drop(device);
    log::debug!("Sampling loop finished");
}
