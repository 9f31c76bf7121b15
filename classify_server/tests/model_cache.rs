//! Download cache behaviour. Kept in its own test binary since it changes the process
//! environment. `XDG_CACHE_HOME` only steers the cache directory on Linux.
#![cfg(target_os = "linux")]

use std::{
    net::TcpListener,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{routing::get, Router};
use classify_server::loader::{fetch_bytes, parse_labels, ModelSource};

const LABELS: &str = "cat\ndog\n";

/// Serve the label file, counting the requests.
fn serve_labels(hits: Arc<AtomicUsize>) -> anyhow::Result<String> {
    let app: Router = Router::new().route(
        "/model/labels.txt",
        get(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                LABELS
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    tokio::spawn(axum::Server::from_tcp(listener)?.serve(app.into_make_service()));

    Ok(format!("http://{addr}/model/labels.txt"))
}

fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("classify_server_{name}_{}", std::process::id()))
}

#[tokio::test]
async fn test_cache_is_best_effort_and_read_back() -> anyhow::Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let source = ModelSource::parse(&serve_labels(Arc::clone(&hits))?);
    let client = reqwest::Client::new();

    // A cache root which is a plain file can neither be read nor written
    let blocker = scratch("blocker");
    std::fs::write(&blocker, b"not a directory")?;
    std::env::set_var("XDG_CACHE_HOME", &blocker);

    let bytes = fetch_bytes(&client, &source).await?;
    assert_eq!(parse_labels(&String::from_utf8_lossy(&bytes))?, vec!["cat", "dog"]);
    let bytes = fetch_bytes(&client, &source).await?;
    assert_eq!(bytes, LABELS.as_bytes());
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // A usable cache answers the second fetch
    let cache_root = scratch("cache");
    std::env::set_var("XDG_CACHE_HOME", &cache_root);

    assert_eq!(fetch_bytes(&client, &source).await?, LABELS.as_bytes());
    assert_eq!(fetch_bytes(&client, &source).await?, LABELS.as_bytes());
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let _ = std::fs::remove_file(&blocker);
    let _ = std::fs::remove_dir_all(&cache_root);
    Ok(())
}
