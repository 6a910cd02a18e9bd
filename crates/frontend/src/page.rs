//! HTML rendering.

use crate::draw::{GREEN, display_name, fixed_color, to_hex};
use inference::DetectionResult;

const STYLE: &str = r#"
body { margin: 0; min-height: 100vh; background: linear-gradient(135deg, #556B2F 0%, #6B8E23 100%);
       color: #F9F9F9; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; }
main { max-width: 1100px; margin: 0 auto; padding: 1rem; text-align: center; }
h1, h2 { color: #F4D03F; text-transform: uppercase; letter-spacing: 1px; font-weight: 700; }
h1 { font-size: clamp(2.5rem, 7vw, 5rem); margin-bottom: 0.5rem; }
.tagline { color: #E8E8E8; font-weight: 700; text-transform: uppercase; letter-spacing: 1px; }
.detect-btn { background: #F4D03F; color: #556B2F; border: none; font-weight: 800; letter-spacing: 2px;
              border-radius: 16px; padding: 1.5rem 4rem; font-size: 1.5rem; cursor: pointer;
              text-transform: uppercase; box-shadow: 0 6px 25px rgba(244, 208, 63, 0.5); }
.detect-btn:hover { background: #FFE66D; }
input[type=file] { display: none; }
.result img { max-width: 100%; border-radius: 6px; }
.analysis-box { background: #8B7355; border: 2px solid #F4D03F; padding: 1rem 1.5rem; margin: 1.5rem 0;
                border-radius: 6px; text-align: left; }
.class-row { margin: 0.8rem 0; padding: 0.8rem 1rem; display: flex; align-items: center; gap: 1.2rem;
             background: rgba(0, 0, 0, 0.2); border-radius: 8px; }
.swatch { width: 36px; height: 36px; border: 3px solid #FFFFFF; border-radius: 8px; flex-shrink: 0; }
.class-name { font-size: 1.4rem; font-weight: 800; margin: 0; text-transform: uppercase; }
.error { background: rgba(255, 0, 64, 0.2); border: 1px solid #ff0040; padding: 1rem; border-radius: 6px; }
"#;

const UPLOAD_FORM: &str = r#"
<form action="/detect" method="post" enctype="multipart/form-data" id="upload">
  <label class="detect-btn" for="file">Detect weeds</label>
  <input type="file" id="file" name="file" accept=".jpg,.jpeg,.png,image/jpeg,image/png"
         onchange="document.getElementById('upload').submit()">
  <noscript><button type="submit">Upload</button></noscript>
</form>
"#;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Detection count per class, in order of first appearance.
pub fn class_counts(result: &DetectionResult) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for class in result.classes() {
        match counts.iter_mut().find(|(name, _)| name == class) {
            Some((_, n)) => *n += 1,
            None => counts.push((class.clone(), 1)),
        }
    }
    counts
}

fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Cotton Weed Detection</title>
<style>{STYLE}</style>
</head>
<body>
<main>
<h1>Cotton Weed Detection System</h1>
<p class="tagline">Smart weed identification for modern farming</p>
<hr>
{UPLOAD_FORM}
{body}
</main>
</body>
</html>"#
    )
}

pub fn render_index() -> String {
    layout("")
}

pub fn render_error(message: &str) -> String {
    layout(&format!(
        r#"<p class="error">{}</p>"#,
        escape_html(message)
    ))
}

/// Annotated image plus the per-class summary.
pub fn render_result(jpeg_base64: &str, result: &DetectionResult) -> String {
    let mut body = format!(
        r#"<section class="result">
<h2>Detection results</h2>
<img alt="Annotated detections" src="data:image/jpeg;base64,{jpeg_base64}">
"#
    );

    if result.is_empty() {
        body.push_str("<p>No weeds detected</p>\n");
    } else {
        body.push_str(r#"<div class="analysis-box"><h2>Detected classes</h2>"#);
        for (class, count) in class_counts(result) {
            // The summary uses fixed colors only, unknown classes show green
            let color = to_hex(fixed_color(&class).unwrap_or(GREEN));
            let plural = if count > 1 { "s" } else { "" };
            body.push_str(&format!(
                r#"<div class="class-row" style="border-left: 6px solid {color}">
<div class="swatch" style="background-color: {color}"></div>
<div><p class="class-name" style="color: {color}">{name}</p>
<p>{count} detection{plural} found</p></div>
</div>
"#,
                name = escape_html(&display_name(&class)),
            ));
        }
        body.push_str("</div>\n");
    }

    body.push_str("</section>");
    layout(&body)
}
