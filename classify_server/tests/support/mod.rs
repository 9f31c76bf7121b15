//! Mocks shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use classify_server::{
    error::CameraAccessError,
    loader::ModelHandle,
    meter::Meter,
    nn::{InferModel, InputShape, Layout},
    sensors::{CameraDevice, CameraProvider},
    session::{AppSession, CaptureSettings},
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use tract_onnx::prelude::{tensor1, Tensor};

pub const LABELS: [&str; 3] = ["A", "B", "C"];

/// Model answering every forward pass with the next scripted score vector, repeating the
/// last one forever.
pub struct ScriptedModel {
    outputs: Mutex<VecDeque<Vec<f32>>>,
    shape: InputShape,
}

impl ScriptedModel {
    pub fn new(outputs: Vec<Vec<f32>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            shape: InputShape::new(8, Layout::Nhwc),
        }
    }
}

impl InferModel for ScriptedModel {
    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn forward(&self, input: Tensor) -> anyhow::Result<Tensor> {
        assert_eq!(input.shape(), &self.shape.dims()[..]);
        let mut outputs = self.outputs.lock().unwrap();
        let scores = match outputs.len() {
            0 => anyhow::bail!("no scripted output left"),
            1 => outputs[0].clone(),
            _ => outputs.pop_front().unwrap(),
        };
        Ok(tensor1(&scores))
    }
}

/// Model whose forward pass always fails.
pub struct FailingModel;

impl InferModel for FailingModel {
    fn input_shape(&self) -> InputShape {
        InputShape::new(8, Layout::Nchw)
    }

    fn forward(&self, _input: Tensor) -> anyhow::Result<Tensor> {
        anyhow::bail!("kernel exploded")
    }
}

pub fn labels() -> Vec<String> {
    LABELS.iter().map(|label| label.to_string()).collect()
}

pub fn fixed_handle(scores: Vec<f32>) -> ModelHandle {
    ModelHandle::new(Arc::new(ScriptedModel::new(vec![scores])), labels())
}

pub fn scripted_handle(outputs: Vec<Vec<f32>>) -> ModelHandle {
    ModelHandle::new(Arc::new(ScriptedModel::new(outputs)), labels())
}

/// Camera handing out devices which count themselves while open.
#[derive(Clone, Default)]
pub struct MockCamera {
    open_devices: Arc<AtomicUsize>,
    deny: bool,
}

impl MockCamera {
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Default::default()
        }
    }

    pub fn open_devices(&self) -> usize {
        self.open_devices.load(Ordering::SeqCst)
    }
}

impl CameraProvider for MockCamera {
    fn open(&self, resolution: (u32, u32)) -> Result<Box<dyn CameraDevice>, CameraAccessError> {
        if self.deny {
            return Err(CameraAccessError::PermissionDenied("user said no".into()));
        }
        self.open_devices.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            open_devices: Arc::clone(&self.open_devices),
            resolution,
        }))
    }
}

struct MockDevice {
    open_devices: Arc<AtomicUsize>,
    resolution: (u32, u32),
}

impl CameraDevice for MockDevice {
    fn capture(&mut self) -> Result<RgbImage, CameraAccessError> {
        let (width, height) = self.resolution;
        Ok(RgbImage::from_pixel(width, height, Rgb([40, 90, 200])))
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.open_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn session_with(camera: MockCamera, sample_interval: Duration) -> AppSession {
    let settings = CaptureSettings {
        resolution: (64, 48),
        sample_interval,
        ..Default::default()
    };
    AppSession::new(Box::new(camera), settings, Arc::new(Meter::new()))
}

/// A small PNG of a single color.
pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb(color)));
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageOutputFormat::Png)
        .expect("encode png");
    buf.into_inner()
}
