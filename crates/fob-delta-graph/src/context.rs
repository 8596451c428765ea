//! Context modules: virtual modules standing for "every file under a
//! directory that matches a filter".
//!
//! A `require.context(dir, recursive, /filter/, mode)` call never resolves to a
//! concrete file. The graph instead keys it by a virtual path derived from a
//! hash of its parameters, and remembers the compiled [`RequireContext`] so
//! file additions can later be matched against it.

use std::fmt;
use std::path::{Component, Path};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{GraphError, Result};

/// How the files matched by a context are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextMode {
    #[default]
    Sync,
    Eager,
    Lazy,
    LazyOnce,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Sync => "sync",
            ContextMode::Eager => "eager",
            ContextMode::Lazy => "lazy",
            ContextMode::LazyOnce => "lazy-once",
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter pattern in its declared (uncompiled) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextFilter {
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
}

impl ContextFilter {
    pub fn new(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }

    /// Compile the pattern, translating the declared flags.
    ///
    /// `g`, `y` and `u` only affect stateful matching and are ignored.
    pub fn compile(&self) -> Result<Regex> {
        let mut builder = RegexBuilder::new(&self.pattern);
        for flag in self.flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'g' | 'y' | 'u' => {}
                other => {
                    return Err(GraphError::InvalidContextFilter {
                        pattern: self.pattern.clone(),
                        reason: format!("unsupported flag '{other}'"),
                    });
                }
            }
        }
        builder
            .build()
            .map_err(|err| GraphError::InvalidContextFilter {
                pattern: self.pattern.clone(),
                reason: err.to_string(),
            })
    }
}

/// Parameters carried by a dependency created from `require.context`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequireContextParams {
    pub recursive: bool,
    pub filter: ContextFilter,
    #[serde(default)]
    pub mode: ContextMode,
}

/// A compiled context, registered in the graph under its virtual path.
#[derive(Debug, Clone)]
pub struct RequireContext {
    /// Absolute directory the context is rooted at.
    pub from: String,
    pub mode: ContextMode,
    pub recursive: bool,
    pub filter: Regex,
}

impl RequireContext {
    pub fn new(from: impl Into<String>, params: &RequireContextParams) -> Result<Self> {
        Ok(Self {
            from: from.into(),
            mode: params.mode,
            recursive: params.recursive,
            filter: params.filter.compile()?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        file_matches_context(path, self)
    }
}

/// Stable textual id of a context, used as the hash input.
pub fn get_context_module_id(from: &str, params: &RequireContextParams) -> String {
    let filter = format!("/{}/{}", params.filter.pattern, params.filter.flags);
    [
        from,
        params.mode.as_str(),
        if params.recursive { "recursive" } else { "" },
        filter.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Virtual module path for a context rooted at `from`.
pub fn derive_absolute_path_from_context(from: &str, params: &RequireContextParams) -> String {
    let base = from
        .strip_suffix('/')
        .or_else(|| from.strip_suffix('\\'))
        .unwrap_or(from);
    let hash = blake3::hash(get_context_module_id(base, params).as_bytes());
    format!("{base}?ctx={}", hash.to_hex())
}

/// Whether `test_path` is one of the files selected by `context`.
pub fn file_matches_context(test_path: &str, context: &RequireContext) -> bool {
    let Some(relative) = relative_to(&context.from, test_path) else {
        return false;
    };
    if relative.is_empty() || relative.starts_with("..") || Path::new(&relative).is_absolute() {
        return false;
    }
    if !context.recursive && relative.contains(['/', '\\']) {
        return false;
    }
    let normalized = format!("./{}", relative.replace('\\', "/"));
    context.filter.is_match(&normalized)
}

/// Relative path from directory `from` to `to`, with `..` segments when `to`
/// lies outside of `from`. Returns `None` when the paths share no root.
fn relative_to(from: &str, to: &str) -> Option<String> {
    let from = path_clean::clean(from);
    let to = path_clean::clean(to);
    if from.is_absolute() != to.is_absolute() {
        return None;
    }

    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let shared = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat_n("..".to_string(), from.len() - shared));
    parts.extend(
        to[shared..]
            .iter()
            .map(|component| component.as_os_str().to_string_lossy().into_owned()),
    );
    Some(parts.join("/"))
}
