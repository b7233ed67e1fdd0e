use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

use super::{Blob, ContentTypeMap, Producer};
use crate::error::AppError;

/// Serves files rooted at `webroot`, but only for paths matching one of the
/// configured whitelist prefixes (`/pages/.*`, `/static/.*` by default); every
/// other path is left to the next producer (which, by default, 404s).
pub struct FilesystemProducer {
    webroot: PathBuf,
    whitelist: Vec<Regex>,
    content_types: ContentTypeMap,
}

impl FilesystemProducer {
    pub fn new(webroot: impl Into<PathBuf>, whitelist: Vec<Regex>, content_types: ContentTypeMap) -> Self {
        Self {
            webroot: webroot.into(),
            whitelist,
            content_types,
        }
    }

    fn is_whitelisted(&self, path: &str) -> bool {
        self.whitelist.iter().any(|re| re.is_match(path))
    }

    /// Resolve `path` to a filesystem path strictly inside `webroot`,
    /// rejecting any `..` traversal component.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = path.trim_start_matches('/');
        let candidate = self.webroot.join(relative);
        if relative.split('/').any(|seg| seg == "..") {
            return None;
        }
        Some(candidate)
    }
}

#[async_trait]
impl Producer for FilesystemProducer {
    async fn get(&self, path: &str) -> Result<Option<Blob>, AppError> {
        if !self.is_whitelisted(path) {
            return Ok(None);
        }
        let Some(file_path) = self.resolve(path) else {
            return Ok(None);
        };
        match tokio::fs::read(&file_path).await {
            Ok(bytes) => {
                let content_type = self.content_types.lookup(path);
                Ok(Some(Blob::new(bytes, content_type)))
            }
            // No file at this path: decline, let the next producer (or the
            // 404 hook) take it.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            // Permission denied, too many open files, etc: this request
            // fails, but the path itself may well exist — don't let another
            // producer or the 404 hook paper over it.
            Err(err) => Err(AppError::ServerTransient(format!(
                "reading {}: {err}",
                file_path.display()
            ))),
        }
    }
}

pub fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}
