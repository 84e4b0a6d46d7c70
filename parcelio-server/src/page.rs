use parcelio_core::CatalogSnapshot;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt::Write;

/// Characters left as-is in object links.
const LINK_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub const FAVICON_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 32 32"><rect x="3" y="7" width="26" height="20" rx="3" fill="#c27c2c"/><rect x="3" y="7" width="26" height="6" rx="2" fill="#8a5418"/><rect x="13" y="7" width="6" height="20" fill="#f3d9a4"/></svg>"##;

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Render a byte count with binary multiples, e.g. `4.00 KB`.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn encode_component(name: &str) -> String {
    utf8_percent_encode(name, LINK_SAFE).to_string()
}

pub fn object_href(name: &str) -> String {
    format!("/{}", encode_component(name))
}

pub fn render_index(snapshot: &CatalogSnapshot) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>parcelio</title>\n<link rel=\"icon\" href=\"/favicon.ico\">\n");
    html.push_str("</head>\n<body>\n");

    let _ = writeln!(
        html,
        "<p>{} objects, {} stored</p>",
        snapshot.data.len(),
        format_size(snapshot.meta.total_size)
    );

    html.push_str("<ul>\n");
    for (name, record) in &snapshot.data {
        let _ = writeln!(
            html,
            "<li><a href=\"{}\">{}</a> ({})</li>",
            escape_html(&object_href(name)),
            escape_html(name),
            format_size(record.size)
        );
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    html
}
