//! Include/exclude glob rules for changed file paths

use std::fmt;

use glob::{MatchOptions, Pattern};

use crate::error::ConfigError;

/// `*` and `?` stay inside one path component and dotfiles need an explicit
/// leading dot, the same defaults minimatch uses.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// A single compiled rule.
///
/// `{a,b}` alternation is expanded up front, so one rule may hold several
/// patterns; the rule matches when any of them does.
#[derive(Debug, Clone)]
pub struct PathRule {
    source: String,
    patterns: Vec<Pattern>,
    exclude: bool,
}

impl PathRule {
    /// Parse one rule string. Returns `Ok(None)` for blank input.
    ///
    /// A leading `!` marks the rule as an exclusion.
    pub fn parse(rule: &str) -> Result<Option<Self>, ConfigError> {
        let trimmed = rule.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (glob, exclude) = match trimmed.strip_prefix('!') {
            Some(rest) => (rest.trim(), true),
            None => (trimmed, false),
        };

        let patterns = expand_braces(glob)
            .iter()
            .map(|alt| Pattern::new(&collapse_partial_globstars(alt)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ConfigError::InvalidPathFilter {
                rule: rule.to_string(),
                source,
            })?;

        Ok(Some(Self {
            source: glob.to_string(),
            patterns,
            exclude,
        }))
    }

    /// The rule text without its `!` prefix
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn is_exclude(&self) -> bool {
        self.exclude
    }

    fn matches(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}

impl fmt::Display for PathRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exclude {
            write!(f, "!{}", self.source)
        } else {
            write!(f, "{}", self.source)
        }
    }
}

/// Expand `{a,b}` alternation, nested groups included.
///
/// A group without a top-level comma (`{a}`) or without a closing brace is
/// kept as literal text.
fn expand_braces(glob: &str) -> Vec<String> {
    let bytes = glob.as_bytes();
    let mut start = 0;

    while let Some(offset) = glob[start..].find('{') {
        let open = start + offset;
        let mut depth = 0usize;
        let mut commas = Vec::new();
        let mut close = None;

        for (i, &b) in bytes.iter().enumerate().skip(open) {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                b',' if depth == 1 => commas.push(i),
                _ => {}
            }
        }

        match close {
            Some(close) if !commas.is_empty() => {
                let prefix = &glob[..open];
                let suffix = &glob[close + 1..];
                let mut bounds = vec![open];
                bounds.extend(&commas);
                bounds.push(close);

                return bounds
                    .windows(2)
                    .flat_map(|w| {
                        let alt = &glob[w[0] + 1..w[1]];
                        expand_braces(&format!("{prefix}{alt}{suffix}"))
                    })
                    .collect();
            }
            _ => start = open + 1,
        }
    }

    vec![glob.to_string()]
}

/// A `**` that is not a whole path component acts like `*`.
fn collapse_partial_globstars(glob: &str) -> String {
    glob.split('/')
        .map(|component| {
            if component == "**" {
                return component.to_string();
            }
            let mut out = String::with_capacity(component.len());
            for c in component.chars() {
                if c == '*' && out.ends_with('*') {
                    continue;
                }
                out.push(c);
            }
            out
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Ordered rule list deciding which paths are in scope for review.
///
/// With no rules every path passes. Once any include rule exists, a path must
/// match at least one of them. A matching exclude rule always wins.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<PathRule>,
}

impl PathFilter {
    pub fn new<I, S>(rules: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for rule in rules {
            if let Some(rule) = PathRule::parse(rule.as_ref())? {
                parsed.push(rule);
            }
        }
        Ok(Self { rules: parsed })
    }

    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn check(&self, path: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let mut included = false;
        let mut excluded = false;
        let mut inclusion_rule_exists = false;

        for rule in &self.rules {
            if rule.matches(path) {
                if rule.exclude {
                    excluded = true;
                } else {
                    included = true;
                }
            }
            if !rule.exclude {
                inclusion_rule_exists = true;
            }
        }

        (!inclusion_rule_exists || included) && !excluded
    }
}

impl fmt::Display for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules: Vec<String> = self.rules.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", rules.join(", "))
    }
}
