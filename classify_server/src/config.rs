//! Command line configuration.
//!
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::nn::{InputShape, Layout};

#[derive(Parser, Debug, Clone)]
#[clap(author, version)]
pub struct Config {
    /// Address the HTTP server binds to
    #[clap(long, default_value = "127.0.0.1:3000")]
    pub server_address: String,

    /// ONNX model, either a local path or an http(s) URL
    #[clap(long, default_value = "model/model.onnx")]
    pub model: String,

    /// Class names, one per line, either a local path or an http(s) URL
    #[clap(long, default_value = "model/labels.txt")]
    pub labels: String,

    /// Side length in pixels of the square model input
    #[clap(long, default_value_t = 224, value_parser = clap::value_parser!(u32).range(1..))]
    pub input_size: u32,

    /// Memory layout of the model input
    #[clap(long, value_enum, default_value_t = LayoutArg::Nhwc)]
    pub layout: LayoutArg,

    /// Video device of the webcam
    #[clap(long, default_value = "/dev/video0")]
    pub camera: String,

    /// Requested webcam frame width
    #[clap(long, default_value_t = 640)]
    pub camera_width: u32,

    /// Requested webcam frame height
    #[clap(long, default_value_t = 480)]
    pub camera_height: u32,

    /// Milliseconds between two sampled webcam frames
    #[clap(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub sample_interval_ms: u64,

    /// Largest accepted upload in bytes
    #[clap(long, default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Seconds between two meter log lines
    #[clap(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub meter_interval_secs: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    Nchw,
    Nhwc,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Nchw => Layout::Nchw,
            LayoutArg::Nhwc => Layout::Nhwc,
        }
    }
}

impl Config {
    pub fn input_shape(&self) -> InputShape {
        InputShape::new(self.input_size, self.layout.into())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn camera_resolution(&self) -> (u32, u32) {
        (self.camera_width, self.camera_height)
    }
}
