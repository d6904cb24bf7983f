//! Ignore rules: pattern-based exclusion applied to candidate paths before
//! they are indexed.
//!
//! Global rules and the rules attached to a root's folder are combined
//! additively: a path is ignored as soon as any enabled rule matches it.
//! Patterns are evaluated against the path relative to the scan root using
//! `/` separators, so `*.tmp`, `cache/**` and `^raw/` behave the same on
//! every platform.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use parking_lot::RwLock;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::types::FolderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Shell glob (`*`, `?`, `**`, `{a,b}`), case-insensitive.
    Glob,
    /// Regular expression matched anywhere in the relative path.
    Regex,
    /// Literal relative path; also covers everything beneath it.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Matches files only.
    File,
    /// Matches directories; everything beneath a match is ignored.
    Directory,
    /// Matches both.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    /// `None` for global rules.
    pub folder_id: Option<FolderId>,
    pub pattern: String,
    pub pattern_type: PatternType,
    pub rule_type: RuleType,
    pub enabled: bool,
}

impl IgnoreRule {
    /// Enabled global glob rule, the most common kind.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            folder_id: None,
            pattern: pattern.into(),
            pattern_type: PatternType::Glob,
            rule_type: RuleType::Any,
            enabled: true,
        }
    }

    pub fn for_folder(mut self, folder_id: FolderId) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub fn with_rule_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    pub fn with_pattern_type(mut self, pattern_type: PatternType) -> Self {
        self.pattern_type = pattern_type;
        self
    }

    fn applies_to_files(&self) -> bool {
        matches!(self.rule_type, RuleType::File | RuleType::Any)
    }

    fn applies_to_dirs(&self) -> bool {
        matches!(self.rule_type, RuleType::Directory | RuleType::Any)
    }
}

/// Storage of ignore rules (external collaborator).
pub trait IgnoreRuleSource: Send + Sync + fmt::Debug {
    fn global_rules(&self) -> Result<Vec<IgnoreRule>>;

    fn rules_for_folder(&self, folder_id: FolderId) -> Result<Vec<IgnoreRule>>;
}

/// In-process rule store.
#[derive(Debug, Default)]
pub struct StaticIgnoreRules {
    global: RwLock<Vec<IgnoreRule>>,
    per_folder: RwLock<HashMap<FolderId, Vec<IgnoreRule>>>,
}

impl StaticIgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(rules: Vec<IgnoreRule>) -> Self {
        Self {
            global: RwLock::new(rules),
            per_folder: RwLock::new(HashMap::new()),
        }
    }

    /// Add a rule; rules carrying a folder id are stored per folder.
    pub fn add(&self, rule: IgnoreRule) {
        match rule.folder_id {
            Some(folder_id) => self
                .per_folder
                .write()
                .entry(folder_id)
                .or_default()
                .push(rule),
            None => self.global.write().push(rule),
        }
    }
}

impl IgnoreRuleSource for StaticIgnoreRules {
    fn global_rules(&self) -> Result<Vec<IgnoreRule>> {
        Ok(self.global.read().clone())
    }

    fn rules_for_folder(&self, folder_id: FolderId) -> Result<Vec<IgnoreRule>> {
        Ok(self
            .per_folder
            .read()
            .get(&folder_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Compiled patterns for one rule target (files or directories).
#[derive(Debug, Clone)]
struct PatternSet {
    globs: GlobSet,
    regexes: RegexSet,
    exact: Vec<String>,
}

impl PatternSet {
    fn compile<'a>(
        rules: impl Iterator<Item = &'a IgnoreRule>,
    ) -> Result<Self> {
        let mut globs = GlobSetBuilder::new();
        let mut regexes = Vec::new();
        let mut exact = Vec::new();

        for rule in rules {
            match rule.pattern_type {
                PatternType::Glob => {
                    let glob = GlobBuilder::new(&rule.pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|err| invalid_pattern(&rule.pattern, err))?;
                    globs.add(glob);
                }
                PatternType::Regex => regexes.push(rule.pattern.clone()),
                PatternType::Exact => exact.push(
                    rule.pattern.trim_matches('/').replace('\\', "/"),
                ),
            }
        }

        let globs = globs
            .build()
            .map_err(|err| invalid_pattern("<glob set>", err))?;
        let regexes = RegexSet::new(&regexes).map_err(|err| {
            invalid_pattern(&regexes.join(" | "), err)
        })?;

        Ok(Self {
            globs,
            regexes,
            exact,
        })
    }

    fn is_empty(&self) -> bool {
        self.globs.is_empty()
            && self.regexes.is_empty()
            && self.exact.is_empty()
    }

    fn matches(&self, relative: &str) -> bool {
        if relative.is_empty() {
            return false;
        }
        self.globs.is_match(relative)
            || self.regexes.is_match(relative)
            || self.exact.iter().any(|exact| {
                relative == exact
                    || relative
                        .strip_prefix(exact.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}

fn invalid_pattern(pattern: &str, err: impl fmt::Display) -> IndexError {
    IndexError::InvalidIgnorePattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    }
}

/// Union of every enabled rule that applies to one scan root.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    files: PatternSet,
    dirs: PatternSet,
}

impl Default for IgnoreMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

impl IgnoreMatcher {
    /// Matcher that ignores nothing.
    pub fn empty() -> Self {
        Self {
            files: PatternSet {
                globs: GlobSet::empty(),
                regexes: RegexSet::empty(),
                exact: Vec::new(),
            },
            dirs: PatternSet {
                globs: GlobSet::empty(),
                regexes: RegexSet::empty(),
                exact: Vec::new(),
            },
        }
    }

    pub fn compile<'a>(
        rules: impl IntoIterator<Item = &'a IgnoreRule>,
    ) -> Result<Self> {
        let enabled: Vec<&IgnoreRule> =
            rules.into_iter().filter(|rule| rule.enabled).collect();
        Ok(Self {
            files: PatternSet::compile(
                enabled.iter().copied().filter(|r| r.applies_to_files()),
            )?,
            dirs: PatternSet::compile(
                enabled.iter().copied().filter(|r| r.applies_to_dirs()),
            )?,
        })
    }

    /// Compile global rules plus the rules of `folder_id`, when known.
    pub fn load(
        source: &dyn IgnoreRuleSource,
        folder_id: Option<FolderId>,
    ) -> Result<Self> {
        let mut rules = source.global_rules()?;
        if let Some(folder_id) = folder_id {
            rules.extend(source.rules_for_folder(folder_id)?);
        }
        Self::compile(&rules)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Whether the file at `path` is excluded, judged relative to `root`.
    ///
    /// Directory rules matching any ancestor between `root` and the file
    /// exclude it as well.
    pub fn is_ignored(&self, path: &Path, root: &Path) -> bool {
        let Some(relative) = relative_slash_path(path, root) else {
            return false;
        };
        if self.files.matches(&relative) {
            return true;
        }
        if self.dirs.is_empty() {
            return false;
        }
        let mut prefix = String::new();
        let segments: Vec<&str> = relative.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self.dirs.matches(&prefix) {
                return true;
            }
        }
        false
    }

    /// Whether the directory at `path` (and so its subtree) is excluded.
    pub fn is_ignored_dir(&self, path: &Path, root: &Path) -> bool {
        relative_slash_path(path, root)
            .is_some_and(|relative| self.dirs.matches(&relative))
    }
}

/// `path` relative to `root`, joined with `/`. `None` when outside the root.
fn relative_slash_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => {
                Some(segment.to_string_lossy().into_owned())
            }
            _ => None,
        })
        .collect();
    Some(segments.join("/"))
}
