//! HTML rendering of the session state.
//!
//! Rendering is a pure function of a [`StatusMsg`] snapshot.
use std::fmt::Write;

use common::protocol::{ModelStatus, Prediction, StatusMsg};

const STYLE: &str = r#"
    body { font-family: sans-serif; max-width: 720px; margin: 2em auto; }
    .alert { background: #fdd; border: 1px solid #c00; padding: 1em; }
    .notice { background: #ffd; border: 1px solid #cc0; padding: 0.5em; }
    .placeholder { width: 640px; height: 480px; background: #eee; display: flex;
                   align-items: center; justify-content: center; }
    .card { border: 1px solid #ccc; padding: 1em; margin-top: 1em; }
    .track { background: #eee; height: 12px; }
    .bar { background: #2a2; height: 12px; }
    .panel { border: none; }
"#;

/// Render the full page for a snapshot.
///
/// While the webcam runs, the prediction lives in a self-refreshing frame so that the
/// stream on the page is never reloaded.
pub fn render_page(status: &StatusMsg) -> String {
    let mut body = String::from("<h3>Image classifier</h3>\n");

    if let Some(notice) = &status.notice {
        let _ = writeln!(body, r#"<p class="notice">{}</p>"#, escape(notice));
    }

    match &status.model {
        ModelStatus::Loading => {
            body.push_str(r#"<p class="loading">Loading model&hellip;</p>"#);
        }
        ModelStatus::Failed(reason) => {
            let _ = write!(
                body,
                r#"<div class="alert" role="alert"><strong>Model unavailable.</strong> {} Reload the page after fixing the model to try again.</div>"#,
                escape(reason)
            );
        }
        ModelStatus::Ready => {
            body.push_str(&render_webcam(status.webcam_active));
            body.push_str(&render_upload(status.upload_preview));
        }
    }

    if status.webcam_active {
        body.push_str(
            r#"<iframe class="panel" src="/prediction" title="prediction" width="100%" height="120"></iframe>"#,
        );
        body.push('\n');
    } else if let Some(prediction) = &status.prediction {
        body.push_str(&render_prediction(prediction));
    }

    let refresh = match status.model {
        ModelStatus::Loading => REFRESH,
        _ => "",
    };
    document(refresh, &body)
}

/// Render the live prediction panel embedded in the page while the webcam runs.
pub fn render_prediction_panel(status: &StatusMsg) -> String {
    let mut body = String::new();

    if let Some(notice) = &status.notice {
        let _ = writeln!(body, r#"<p class="notice">{}</p>"#, escape(notice));
    }
    match &status.prediction {
        Some(prediction) => body.push_str(&render_prediction(prediction)),
        None => body.push_str(r#"<p class="waiting">No prediction yet</p>"#),
    }

    let refresh = if status.webcam_active { REFRESH } else { "" };
    document(refresh, &body)
}

const REFRESH: &str = r#"<meta http-equiv="refresh" content="1">"#;

fn document(refresh: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{refresh}\n<title>Image classifier</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

fn render_webcam(active: bool) -> String {
    if active {
        r#"<section class="webcam">
<img src="/webcam/stream" width="640" height="480" alt="webcam">
<form method="post" action="/webcam/stop"><button type="submit">Stop webcam</button></form>
</section>
"#
        .to_owned()
    } else {
        r#"<section class="webcam">
<div class="placeholder">Webcam is off</div>
<form method="post" action="/webcam/start"><button type="submit">Start webcam</button></form>
</section>
"#
        .to_owned()
    }
}

fn render_upload(has_preview: bool) -> String {
    let mut section = String::from(
        r#"<section class="upload">
<form method="post" action="/upload" enctype="multipart/form-data">
<input type="file" name="file" accept="image/*">
<button type="submit">Classify</button>
</form>
"#,
    );
    if has_preview {
        section.push_str(r#"<img src="/upload/preview" width="320" alt="uploaded image">"#);
        section.push('\n');
    }
    section.push_str("</section>\n");
    section
}

fn render_prediction(prediction: &Prediction) -> String {
    let width = prediction.confidence.clamp(0.0, 100.0);
    format!(
        r#"<div class="card">
<div class="label">{}</div>
<div class="confidence">{}</div>
<div class="track"><div class="bar" style="width: {width:.2}%"></div></div>
</div>
"#,
        escape(&prediction.label),
        prediction.confidence_text(),
    )
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
