use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::token::Token;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Case-insensitive full equality.
    Exact,
    /// Case-insensitive substring.
    Contains,
    /// Case-insensitive glob (`*`, `?`, `[...]`).
    Pattern,
}

/// Which token field a rule is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTarget {
    #[default]
    Text,
    Uid,
}

fn default_enabled() -> bool {
    true
}

/// A stored rule that rewrites a token into script text.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MappingRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "match")]
    pub kind: MatchKind,
    #[serde(default)]
    pub target: MatchTarget,
    pub value: String,
    /// Script text used in place of the token payload.
    pub script: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("failed to walk mappings folder: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to read mapping file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse mapping file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid pattern in mapping {id}: {source}")]
    Pattern {
        id: String,
        source: glob::PatternError,
    },
}

// ── Compiled table ────────────────────────────────────────────────────────────

enum Matcher {
    Exact(String),
    Contains(String),
    Pattern(Pattern),
}

impl Matcher {
    fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(m) => value.to_lowercase() == *m,
            Matcher::Contains(m) => value.to_lowercase().contains(m.as_str()),
            Matcher::Pattern(p) => p.matches_with(value, GLOB_OPTIONS),
        }
    }
}

struct CompiledRule {
    rule: MappingRule,
    matcher: Matcher,
}

/// Read-only, load-ordered rule table.
#[derive(Default)]
pub struct MappingTable {
    rules: Vec<CompiledRule>,
}

impl MappingTable {
    pub fn build(rules: Vec<MappingRule>) -> Result<Self, MappingError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (n, mut rule) in rules.into_iter().enumerate() {
            if rule.id.is_empty() {
                rule.id = format!("mapping-{}", n + 1);
            }
            let matcher = match rule.kind {
                MatchKind::Exact => Matcher::Exact(rule.value.to_lowercase()),
                MatchKind::Contains => Matcher::Contains(rule.value.to_lowercase()),
                MatchKind::Pattern => {
                    Matcher::Pattern(Pattern::new(&rule.value).map_err(|source| {
                        MappingError::Pattern {
                            id: rule.id.clone(),
                            source,
                        }
                    })?)
                }
            };
            compiled.push(CompiledRule { rule, matcher });
        }
        Ok(MappingTable { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First enabled rule matching the token, in load order.
    pub fn find(&self, token: &Token) -> Option<&MappingRule> {
        self.rules
            .iter()
            .filter(|c| c.rule.enabled)
            .find(|c| {
                let field = match c.rule.target {
                    MatchTarget::Text => &token.text,
                    MatchTarget::Uid => &token.uid,
                };
                c.matcher.matches(field)
            })
            .map(|c| &c.rule)
    }

    /// Resolve a token to script text. Falls back to the raw payload when no
    /// rule matches; the flag reports whether a rule was applied.
    pub fn resolve(&self, token: &Token) -> (String, bool) {
        match self.find(token) {
            Some(rule) => (rule.script.clone(), true),
            None => (token.text.clone(), false),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct MappingFile {
    #[serde(default, rename = "mapping")]
    mappings: Vec<MappingRule>,
}

/// Read every `*.toml` file below `dir` in sorted path order.
/// A missing folder yields no rules.
pub fn load_mapping_files(dir: &Path) -> Result<Vec<MappingRule>, MappingError> {
    if !dir.exists() {
        tracing::debug!("mappings folder {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut rules = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if !entry.file_type().is_file() || !is_toml {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| MappingError::Read {
            path: path.to_owned(),
            source,
        })?;
        let file: MappingFile = toml::from_str(&content).map_err(|source| MappingError::Parse {
            path: path.to_owned(),
            source,
        })?;
        tracing::debug!("loaded {} mappings from {}", file.mappings.len(), path.display());
        rules.extend(file.mappings);
    }
    Ok(rules)
}

/// Holds the active mapping table and rebuilds it on reload.
///
/// Matching always works on an `Arc` snapshot; reload builds a complete new
/// table and swaps it in, so a match in progress never sees a partial table.
pub struct MappingStore {
    table: RwLock<Arc<MappingTable>>,
    inline: Vec<MappingRule>,
    dir: Option<PathBuf>,
}

impl MappingStore {
    /// Load inline rules followed by the rules found in `dir`.
    pub fn load(inline: Vec<MappingRule>, dir: Option<PathBuf>) -> Result<Self, MappingError> {
        let table = Self::build_table(&inline, dir.as_deref())?;
        tracing::info!("loaded {} mapping rules", table.len());
        Ok(MappingStore {
            table: RwLock::new(Arc::new(table)),
            inline,
            dir,
        })
    }

    fn build_table(inline: &[MappingRule], dir: Option<&Path>) -> Result<MappingTable, MappingError> {
        let mut rules = inline.to_vec();
        if let Some(dir) = dir {
            rules.extend(load_mapping_files(dir)?);
        }
        MappingTable::build(rules)
    }

    /// Rebuild from the configured sources. On error the current table stays.
    pub fn reload(&self) -> Result<usize, MappingError> {
        let table = Self::build_table(&self.inline, self.dir.as_deref())?;
        let count = table.len();
        *self.table.write() = Arc::new(table);
        tracing::info!("reloaded {} mapping rules", count);
        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<MappingTable> {
        self.table.read().clone()
    }

    pub fn resolve(&self, token: &Token) -> (String, bool) {
        self.snapshot().resolve(token)
    }
}
