use regex::Regex;

/// Literal or regex path rewriter, consulted by the file-alias hook before the
/// producer chain runs. Aliases compose (the output of one rule feeds back in
/// as input to the whole table) until a fixed point, or a cycle is detected.
pub struct AliasProducer {
    rules: Vec<(Regex, String)>,
    max_iterations: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AliasCycle;

impl AliasProducer {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            // Generous bound on composition depth before we call it a cycle —
            // real alias tables are a handful of rules deep at most.
            max_iterations: 32,
        }
    }

    pub fn with_rule(mut self, pattern: &str, template: impl Into<String>) -> Self {
        self.rules
            .push((Regex::new(pattern).expect("valid alias regex"), template.into()));
        self
    }

    /// Resolve `path` to its fixed point under the alias table, or `Err` if a
    /// cycle is detected (the hook maps this to 500).
    pub fn resolve(&self, path: &str) -> Result<String, AliasCycle> {
        let mut current = path.to_string();
        let mut seen = vec![current.clone()];

        for _ in 0..self.max_iterations {
            let Some(next) = self.rewrite_once(&current) else {
                return Ok(current);
            };
            if seen.contains(&next) {
                return Err(AliasCycle);
            }
            seen.push(next.clone());
            current = next;
        }
        Err(AliasCycle)
    }

    fn rewrite_once(&self, path: &str) -> Option<String> {
        let (re, template) = self.rules.iter().find(|(re, _)| re.is_match(path))?;
        let caps = re.captures(path)?;
        Some(expand_backreferences(template, &caps))
    }
}

impl Default for AliasProducer {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand `\0`..`\9` backreferences from `caps` into `template`; `\\` escapes a
/// literal backslash.
fn expand_backreferences(template: &str, caps: &regex::Captures) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    let idx: usize = d.to_digit(10).unwrap() as usize;
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

/// Build the default static alias table from spec.md §6.
pub fn default_aliases() -> AliasProducer {
    AliasProducer::new()
        .with_rule(r"^/$", "/pages/main.html")
        .with_rule(r"^/favicon\.ico$", "/static/logo-static_128x128.ico")
        .with_rule(
            r"^/room/([a-zA-Z][a-zA-Z0-9_-]*[a-zA-Z0-9]|[a-zA-Z])/$",
            r"/static/room.html",
        )
        .with_rule(r"^/([a-zA-Z0-9_-]+)\.html$", r"/pages/\1.html")
}
