use async_trait::async_trait;
use include_dir::{include_dir, Dir};

use super::{Blob, ContentTypeMap, Producer};
use crate::error::AppError;

static EMBEDDED: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/embedded");

/// Classpath-style lookup against the binary's own embedded resource tree, so
/// the server serves a working default UI even with no webroot on disk.
pub struct ResourceProducer {
    content_types: ContentTypeMap,
}

impl ResourceProducer {
    pub fn new(content_types: ContentTypeMap) -> Self {
        Self { content_types }
    }
}

#[async_trait]
impl Producer for ResourceProducer {
    async fn get(&self, path: &str) -> Result<Option<Blob>, AppError> {
        let relative = path.trim_start_matches('/');
        let Some(file) = EMBEDDED.get_file(relative) else {
            return Ok(None);
        };
        let content_type = self.content_types.lookup(path);
        Ok(Some(Blob::new(file.contents().to_vec(), content_type)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_embedded_main_page() {
        let producer = ResourceProducer::new(ContentTypeMap::default_map());
        let blob = producer.get("/pages/main.html").await.unwrap().unwrap();
        assert_eq!(blob.content_type, "text/html; charset=utf-8");
    }

    #[tokio::test]
    async fn missing_resource_is_none() {
        let producer = ResourceProducer::new(ContentTypeMap::default_map());
        assert!(producer.get("/pages/does-not-exist.html").await.unwrap().is_none());
    }
}
