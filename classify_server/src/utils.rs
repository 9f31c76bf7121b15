//! Utility functions
//!
use std::{
    io::{self, Cursor},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};
use reqwest::Client;

use crate::error::ModelLoadError;

/// Download a file from a URL, served from the cache directory when a copy exists there.
///
/// The cache is best effort: an unusable cache directory only costs the download.
pub async fn download_file(client: &Client, url: &str) -> Result<Vec<u8>, ModelLoadError> {
    let filepath = cache_path(url);
    match tokio::fs::read(&filepath).await {
        Ok(content) => {
            log::info!("Using cached {} for {url}", filepath.display());
            return Ok(content);
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("Ignoring cache entry {}: {err}", filepath.display()),
    }

    let resp = client.get(url).send().await?.error_for_status()?;
    let content = resp.bytes().await?.to_vec();

    match store(&filepath, &content).await {
        Ok(()) => log::debug!(
            "Cached {} bytes of {url} in {}",
            content.len(),
            filepath.display()
        ),
        Err(err) => log::warn!("Could not cache {url} in {}: {err}", filepath.display()),
    }

    Ok(content)
}

/// Write a cache entry. A partial write never shows up under the final name.
async fn store(filepath: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = filepath.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut partial = filepath.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    tokio::fs::write(&partial, content).await?;
    tokio::fs::rename(&partial, filepath).await
}

/// Location in the user cache directory for a downloaded file, keyed by host and path.
pub fn cache_path(url: &str) -> PathBuf {
    let location = url.split(['?', '#']).next().unwrap_or(url);
    let location = location
        .split_once("://")
        .map_or(location, |(_, rest)| rest);

    let mut segments: Vec<String> = location
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .map(|segment| segment.replace(':', "_"))
        .collect();
    if segments.len() < 2 || location.ends_with('/') {
        segments.push("download.bin".into());
    }

    let mut path = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("classify_server");
    path.extend(segments);
    path
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Bytes, image::ImageError> {
    let (width, height) = frame.dimensions();
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode(frame, width, height, ColorType::Rgb8)?;

    Ok(Bytes::from(buf.into_inner()))
}

/// Wrap a JPEG as one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}
