//! Model loading.
//!
//! The model artifact and its label list are fetched once at startup, either from a local
//! path or via HTTP, and compiled into a runnable plan.
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::RgbImage;
use reqwest::Client;
use tract_onnx::prelude::Tensor;

use crate::{
    config::Config,
    error::ModelLoadError,
    nn::{InferModel, InputShape, OnnxClassifier},
    utils::download_file,
};

/// Where a static asset comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    Path(PathBuf),
    Url(String),
}

impl ModelSource {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ModelSource::Url(location.to_owned())
        } else {
            ModelSource::Path(PathBuf::from(location))
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Path(path) => write!(f, "{}", path.display()),
            ModelSource::Url(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoaderConfig {
    pub model: ModelSource,
    pub labels: ModelSource,
    pub input_shape: InputShape,
}

impl From<&Config> for LoaderConfig {
    fn from(config: &Config) -> Self {
        Self {
            model: ModelSource::parse(&config.model),
            labels: ModelSource::parse(&config.labels),
            input_shape: config.input_shape(),
        }
    }
}

/// Loaded network together with the class names of its outputs.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<dyn InferModel>,
    labels: Arc<[String]>,
}

impl ModelHandle {
    pub fn new(model: Arc<dyn InferModel>, labels: Vec<String>) -> Self {
        Self {
            model,
            labels: labels.into(),
        }
    }

    pub fn input_shape(&self) -> InputShape {
        self.model.input_shape()
    }

    pub fn is_compiled(&self) -> bool {
        self.model.is_compiled()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn forward(&self, input: Tensor) -> anyhow::Result<Tensor> {
        self.model.forward(input)
    }

    /// Run one throwaway pass so that the first real prediction is not slowed down.
    pub fn warm_up(&self) -> anyhow::Result<()> {
        let side = self.input_shape().side;
        let blank = RgbImage::new(side, side);
        self.forward(crate::preproc::preprocess(&blank, self.input_shape()))?;
        Ok(())
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("input_shape", &self.input_shape())
            .field("compiled", &self.is_compiled())
            .field("labels", &self.labels.len())
            .finish()
    }
}

/// Fetch, parse and compile the model described by `config`.
pub async fn load_model(config: &LoaderConfig) -> Result<ModelHandle, ModelLoadError> {
    let client = Client::new();

    log::info!("Loading model from {}", &config.model);
    let model_bytes = fetch_bytes(&client, &config.model).await?;
    let label_bytes = fetch_bytes(&client, &config.labels).await?;
    let labels = parse_labels(&String::from_utf8_lossy(&label_bytes))?;

    let input_shape = config.input_shape;
    // Compiling and warming up the graph is CPU bound
    let handle = tokio::task::spawn_blocking(move || {
        let model = OnnxClassifier::from_bytes(&model_bytes, input_shape)?;
        let handle = ModelHandle::new(Arc::new(model), labels);
        handle
            .warm_up()
            .map_err(|err| ModelLoadError::Format(format!("{err:#}")))?;
        Ok::<_, ModelLoadError>(handle)
    })
    .await
    .map_err(std::io::Error::from)??;

    log::info!("Model ready: {:?}", &handle);
    Ok(handle)
}

/// Read a static asset fully into memory.
pub async fn fetch_bytes(
    client: &Client,
    source: &ModelSource,
) -> Result<Vec<u8>, ModelLoadError> {
    match source {
        ModelSource::Url(url) => download_file(client, url).await,
        ModelSource::Path(path) => read_local(path).await,
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, ModelLoadError> {
    tokio::fs::read(path).await.map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ModelLoadError::NotFound(path.display().to_string()),
        _ => ModelLoadError::Io(err),
    })
}

/// Parse class names, one per non-empty line.
pub fn parse_labels(text: &str) -> Result<Vec<String>, ModelLoadError> {
    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();

    if labels.is_empty() {
        return Err(ModelLoadError::Labels("no class names found".into()));
    }

    Ok(labels)
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_source_parsing() {
        assert_eq!(
            ModelSource::parse("https://example.org/model/model.onnx"),
            ModelSource::Url("https://example.org/model/model.onnx".into())
        );
        assert_eq!(
            ModelSource::parse("model/model.onnx"),
            ModelSource::Path("model/model.onnx".into())
        );
    }

    #[test]
    fn test_labels_skip_blank_lines() {
        let labels = parse_labels("cat\n\n  dog \r\nbird\n").unwrap();
        assert_eq!(labels, vec!["cat", "dog", "bird"]);
    }

    #[test]
    fn test_empty_labels_rejected() {
        assert!(matches!(parse_labels(" \n\n"), Err(ModelLoadError::Labels(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let res = fetch_bytes(
            &Client::new(),
            &ModelSource::parse("does/not/exist/model.onnx"),
        )
        .await;
        assert!(matches!(res, Err(ModelLoadError::NotFound(_))));
    }
}
