use async_trait::async_trait;
use std::sync::Arc;

use super::{Hook, HookOutcome, HookReply, RequestData};
use crate::producers::AliasProducer;

/// Rewrites `req.path` in place via the alias table and stashes it in
/// `extra_data["resolved_path"]` for the static-file hook that follows. Never
/// claims the request itself — except on an alias cycle, which is a 500.
pub struct FileAliasHook {
    aliases: Arc<AliasProducer>,
}

impl FileAliasHook {
    pub fn new(aliases: Arc<AliasProducer>) -> Self {
        Self { aliases }
    }
}

#[async_trait]
impl Hook for FileAliasHook {
    async fn evaluate(&self, req: &mut RequestData) -> HookOutcome {
        if req.method != "GET" {
            return HookOutcome::Declined;
        }
        match self.aliases.resolve(&req.path) {
            Ok(resolved) => {
                req.extra_data.insert("resolved_path".to_string(), resolved);
                HookOutcome::Declined
            }
            Err(_cycle) => HookOutcome::Handled(HookReply::status(500, "alias cycle detected")),
        }
    }
}
