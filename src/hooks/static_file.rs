use async_trait::async_trait;
use std::sync::Arc;

use super::{Hook, HookOutcome, HookReply, RequestData};
use crate::producers::ProducerChain;

/// Resolves the (possibly alias-rewritten) path through the producer chain.
pub struct StaticFileHook {
    producers: Arc<ProducerChain>,
}

impl StaticFileHook {
    pub fn new(producers: Arc<ProducerChain>) -> Self {
        Self { producers }
    }
}

#[async_trait]
impl Hook for StaticFileHook {
    async fn evaluate(&self, req: &mut RequestData) -> HookOutcome {
        if req.method != "GET" {
            return HookOutcome::Declined;
        }
        let path = req
            .extra_data
            .get("resolved_path")
            .cloned()
            .unwrap_or_else(|| req.path.clone());

        match self.producers.get(&path).await {
            Ok(Some(blob)) => HookOutcome::Handled(HookReply::ok((*blob.bytes).clone(), blob.content_type)),
            Ok(None) => HookOutcome::Declined,
            Err(err) => HookOutcome::Error(err),
        }
    }
}
