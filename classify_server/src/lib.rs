//! Classify webcam frames and uploaded images with a pretrained ONNX model, served to the
//! browser over HTTP.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod inferer;
pub mod loader;
pub mod meter;
pub mod nn;
pub mod overlay;
pub mod preproc;
pub mod sensors;
pub mod session;
pub mod ui;
pub mod utils;
