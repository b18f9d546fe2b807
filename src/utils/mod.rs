use std::path::{Path, PathBuf};

use url::Url;

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Filename carried by a `Content-Disposition` header value, quotes removed.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let mut extended = None;

    for param in split_params(header) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename" => {
                let name = value.trim().replace('"', "");
                if !name.is_empty() {
                    return Some(name);
                }
            }
            // RFC 5987 form: filename*=UTF-8''name
            "filename*" => {
                extended = value
                    .split_once("''")
                    .map(|(_, name)| percent_decode(name.trim().trim_matches('"')))
                    .filter(|name| !name.is_empty());
            }
            _ => {}
        }
    }

    extended
}

/// Splits header parameters on `;`, leaving quoted strings intact.
fn split_params(header: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in header.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(header[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(header[start..].trim());
    params
}

fn percent_decode(value: &str) -> String {
    percent_encoding::percent_decode_str(value)
        .decode_utf8_lossy()
        .into_owned()
}

/// Last non-empty path segment of a URL, percent-decoded.
pub fn url_file_name(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(percent_decode)
}

/// Lowercased extension of a path, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub async fn ensure_dir(path: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(path).await?;
    Ok(path.to_path_buf())
}
