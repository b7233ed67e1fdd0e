use async_trait::async_trait;

use super::{Hook, HookOutcome, HookReply, RequestData};

/// Terminal hook: always claims with a minimal 404 body.
pub struct NotFoundHook;

#[async_trait]
impl Hook for NotFoundHook {
    async fn evaluate(&self, _req: &mut RequestData) -> HookOutcome {
        HookOutcome::Handled(HookReply::status(404, "not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::test_request;

    #[tokio::test]
    async fn always_claims() {
        let hook = NotFoundHook;
        let mut req = test_request("/anything/at/all");
        match hook.evaluate(&mut req).await {
            HookOutcome::Handled(reply) => assert_eq!(reply.status, 404),
            _ => panic!("not-found hook must always claim"),
        }
    }
}
