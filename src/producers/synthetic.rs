use async_trait::async_trait;
use std::collections::HashMap;

use super::{Blob, Producer};
use crate::error::AppError;

/// Statically registered `path → content` pairs, e.g. `/static/version.js`.
pub struct SyntheticProducer {
    entries: HashMap<String, Blob>,
}

impl SyntheticProducer {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, path: impl Into<String>, content: String, content_type: impl Into<String>) {
        self.entries
            .insert(path.into(), Blob::new(content.into_bytes(), content_type));
    }
}

impl Default for SyntheticProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for SyntheticProducer {
    async fn get(&self, path: &str) -> Result<Option<Blob>, AppError> {
        Ok(self.entries.get(path).cloned())
    }
}

/// Build the default synthetic chain entry: `/static/version.js`, per §6.
pub fn version_js(version: &str, revision: &str) -> String {
    format!(r#"this._instantVersion_ = {{version:"{version}", revision:"{revision}"}};"#)
}
