use async_trait::async_trait;
use regex::Regex;

use super::{Hook, HookOutcome, HookReply, RequestData};

pub struct RedirectRule {
    pub pattern: Regex,
    pub template: String,
    pub code: u16,
}

/// Regex → (location template, status code) redirects, e.g.
/// `/room/<ROOM>` → 301 `/room/<ROOM>/`.
pub struct RedirectHook {
    rules: Vec<RedirectRule>,
}

impl RedirectHook {
    pub fn new(rules: Vec<RedirectRule>) -> Self {
        Self { rules }
    }

    pub fn default_rules() -> Vec<RedirectRule> {
        vec![RedirectRule {
            pattern: Regex::new(r"^/room/([a-zA-Z][a-zA-Z0-9_-]*[a-zA-Z0-9]|[a-zA-Z])$").unwrap(),
            template: r"/room/\1/".to_string(),
            code: 301,
        }]
    }
}

#[async_trait]
impl Hook for RedirectHook {
    async fn evaluate(&self, req: &mut RequestData) -> HookOutcome {
        if req.method != "GET" {
            return HookOutcome::Declined;
        }
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(&req.path) {
                let location = expand(&rule.template, &caps);
                return HookOutcome::Handled(HookReply::redirect(rule.code, location));
            }
        }
        HookOutcome::Declined
    }
}

fn expand(template: &str, caps: &regex::Captures) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    let idx = d.to_digit(10).unwrap() as usize;
                    chars.next();
                    if let Some(m) = caps.get(idx) {
                        out.push_str(m.as_str());
                    }
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
