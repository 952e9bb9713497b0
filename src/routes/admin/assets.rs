//! `/api/admin/{icons,themes}/*` (spec.md §4.G): a thin directory listing
//! and byte-serving shim, not a bundled asset pipeline. Icons are grouped
//! under `icons/{dashboard,lucide,custom}/`, themes live flat under
//! `themes/`. Both live under the config data directory so a deployment can
//! drop its own files in without a rebuild.

use std::path::{Path as FsPath, PathBuf};

use axum::Json;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::auth::identity::Identity;
use crate::config::loader::data_dir;
use crate::error::AppError;

fn icons_dir(collection: &str) -> Option<PathBuf> {
    match collection {
        "dashboard" | "lucide" | "custom" => Some(data_dir().join("icons").join(collection)),
        _ => None,
    }
}

fn themes_dir() -> PathBuf {
    data_dir().join("themes")
}

/// Guards against `..`/absolute-path traversal: the final component must
/// stay a plain filename.
fn safe_name(name: &str) -> Option<&str> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
        None
    } else {
        Some(name)
    }
}

async fn list_dir(dir: &FsPath) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    names
}

pub async fn list_icons(_identity: Identity, Path(collection): Path<String>) -> Response {
    let Some(dir) = icons_dir(&collection) else {
        return AppError::NotFound(format!("unknown icon collection '{collection}'")).into_response();
    };
    Json(list_dir(&dir).await).into_response()
}

pub async fn get_icon(
    _identity: Identity,
    Path((collection, name)): Path<(String, String)>,
) -> Response {
    let (Some(dir), Some(name)) = (icons_dir(&collection), safe_name(&name)) else {
        return AppError::NotFound("icon not found".into()).into_response();
    };
    serve_file(dir.join(name)).await
}

pub async fn list_themes(_identity: Identity) -> Response {
    Json(list_dir(&themes_dir()).await).into_response()
}

pub async fn get_theme(_identity: Identity, Path(name): Path<String>) -> Response {
    let Some(name) = safe_name(&name) else {
        return AppError::NotFound("theme not found".into()).into_response();
    };
    serve_file(themes_dir().join(name)).await
}

async fn serve_file(path: PathBuf) -> Response {
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = mime_guess_by_extension(&path);
            ([(header::CONTENT_TYPE, content_type)], Bytes::from(bytes)).into_response()
        }
        Err(_) => AppError::NotFound("asset not found".into()).into_response(),
    }
}

fn mime_guess_by_extension(path: &FsPath) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("css") => "text/css",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_name_rejects_traversal() {
        assert_eq!(safe_name(".."), None);
        assert_eq!(safe_name("../etc/passwd"), None);
        assert_eq!(safe_name("icon.svg"), Some("icon.svg"));
    }

    #[test]
    fn icons_dir_rejects_unknown_collection() {
        assert!(icons_dir("unknown").is_none());
        assert!(icons_dir("lucide").is_some());
    }
}
