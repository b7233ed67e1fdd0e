use regex::Regex;

/// Path whitelist for WS upgrades: `(regex, tag)` pairs, first match wins. The
/// tag (`""` for `/api/ws`, the room name for `/room/<ROOM>/ws`) is handed to
/// the upgrade handler. A non-matching upgrade path is rejected with 404 per
/// §7 ("Upgrade rejection").
pub struct WsWhitelist {
    rules: Vec<(Regex, Tag)>,
}

enum Tag {
    Fixed(String),
    Captured,
}

impl WsWhitelist {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_fixed(mut self, pattern: &str, tag: impl Into<String>) -> Self {
        self.rules
            .push((Regex::new(pattern).expect("valid ws whitelist regex"), Tag::Fixed(tag.into())));
        self
    }

    /// Pattern's first capture group becomes the tag (the room name).
    pub fn with_captured(mut self, pattern: &str) -> Self {
        self.rules
            .push((Regex::new(pattern).expect("valid ws whitelist regex"), Tag::Captured));
        self
    }

    pub fn tag_for(&self, path: &str) -> Option<String> {
        for (re, tag) in &self.rules {
            if let Some(caps) = re.captures(path) {
                return Some(match tag {
                    Tag::Fixed(s) => s.clone(),
                    Tag::Captured => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                });
            }
        }
        None
    }

    pub fn default_whitelist() -> Self {
        Self::new()
            .with_fixed(r"^/api/ws$", "")
            .with_captured(r"^/room/([a-zA-Z][a-zA-Z0-9_-]*[a-zA-Z0-9]|[a-zA-Z])/ws$")
    }
}

impl Default for WsWhitelist {
    fn default() -> Self {
        Self::new()
    }
}
