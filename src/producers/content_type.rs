use regex::Regex;

/// Regex → MIME map, consulted in registration order; first match wins.
/// Falls back to `application/octet-stream` if nothing matches.
pub struct ContentTypeMap {
    rules: Vec<(Regex, String)>,
}

impl ContentTypeMap {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, pattern: &str, content_type: impl Into<String>) -> Self {
        self.rules
            .push((Regex::new(pattern).expect("valid content-type regex"), content_type.into()));
        self
    }

    pub fn lookup(&self, path: &str) -> String {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(path))
            .map(|(_, ct)| ct.clone())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    /// The default map from spec.md §6.
    pub fn default_map() -> Self {
        Self::new()
            .with_rule(r"\.html$", "text/html; charset=utf-8")
            .with_rule(r"\.css$", "text/css; charset=utf-8")
            .with_rule(r"\.js$", "application/javascript; charset=utf-8")
            .with_rule(r"\.svg$", "image/svg+xml; charset=utf-8")
            .with_rule(r"\.png$", "image/png")
            .with_rule(r"\.ico$", "image/vnd.microsoft.icon")
    }
}

impl Default for ContentTypeMap {
    fn default() -> Self {
        Self::default_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_extensions() {
        let map = ContentTypeMap::default_map();
        assert_eq!(map.lookup("/pages/main.html"), "text/html; charset=utf-8");
        assert_eq!(map.lookup("/static/app.js"), "application/javascript; charset=utf-8");
        assert_eq!(map.lookup("/static/logo.ico"), "image/vnd.microsoft.icon");
    }

    #[test]
    fn falls_back_for_unknown_extension() {
        let map = ContentTypeMap::default_map();
        assert_eq!(map.lookup("/static/data.bin"), "application/octet-stream");
    }
}
