use axum::{debug_handler, http::header, response::{Html, IntoResponse}};

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

#[debug_handler]
pub async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], include_res!(str, "/style.css"))
}

/// Escapes text for use in HTML bodies and quoted attributes. Braces are
/// encoded too, so no placeholder survives into a filled template.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inline error line, or nothing.
pub fn error_line(error: Option<&str>) -> String {
    error
        .map(|error| format!(r#"<div class="error">{}</div>"#, escape(error)))
        .unwrap_or_default()
}

pub fn avatar(url: Option<&str>) -> String {
    match url {
        Some(url) if !url.is_empty() => {
            format!(r#"<img class="avatar" src="{}" alt="avatar">"#, escape(url))
        }
        _ => String::new(),
    }
}

pub fn page(title: &str, header: &str, body: &str) -> Html<String> {
    Html(
        include_res!(str, "/pages/layout.html")
            .replace("{title}", &escape(title))
            .replace("{header}", header)
            .replace("{body}", body),
    )
}
