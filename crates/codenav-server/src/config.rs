//! Languages and read-only server configuration.

use codenav_client::RateLimitConfig;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A source language with a running-server identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    /// Python (`.py`, `.pyi`)
    Python,
    /// TypeScript (`.ts`, `.tsx`)
    TypeScript,
    /// JavaScript (`.js`, `.jsx`, `.mjs`)
    JavaScript,
    /// Rust (`.rs`)
    Rust,
    /// Go (`.go`)
    Go,
    /// Java (`.java`)
    Java,
    /// C# (`.cs`)
    CSharp,
    /// Ruby (`.rb`)
    Ruby,
    /// PHP (`.php`)
    Php,
    /// Nix (`.nix`)
    Nix,
    /// Vue single-file components (`.vue`); definitions and references for
    /// the embedded script resolve through a companion server.
    Vue,
    /// Any language this build has no dedicated entry for. The string is
    /// both the identifier and the LSP `languageId`.
    Other(String),
}

impl Language {
    /// Stable identifier, also used as the per-language cache directory
    /// name and the LSP `languageId` for `didOpen`.
    pub fn id(&self) -> &str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Nix => "nix",
            Language::Vue => "vue",
            Language::Other(id) => id,
        }
    }

    /// File extensions this language claims (without the dot).
    pub fn file_extensions(&self) -> &[&str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::Rust => &["rs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::CSharp => &["cs"],
            Language::Ruby => &["rb", "rake"],
            Language::Php => &["php"],
            Language::Nix => &["nix"],
            Language::Vue => &["vue"],
            Language::Other(_) => &[],
        }
    }

    /// Whether this language claims the given repository-relative path by
    /// extension. [`Language::Other`] claims everything, since the caller
    /// supplied no extension table for it.
    pub fn claims_path(&self, relative_path: &str) -> bool {
        let extensions = self.file_extensions();
        if extensions.is_empty() {
            return true;
        }
        let ext = relative_path.rsplit('.').next().unwrap_or("");
        extensions.contains(&ext)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// LSP `languageId` for a file extension, when the extension belongs to a
/// known language. Used so a server can open files of other languages
/// (companion indexing) with the id their servers expect.
pub fn language_id_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "py" | "pyi" => Some("python"),
        "ts" | "mts" | "cts" => Some("typescript"),
        "tsx" => Some("typescriptreact"),
        "js" | "mjs" | "cjs" => Some("javascript"),
        "jsx" => Some("javascriptreact"),
        "rs" => Some("rust"),
        "go" => Some("go"),
        "java" => Some("java"),
        "cs" => Some("csharp"),
        "rb" | "rake" => Some("ruby"),
        "php" => Some("php"),
        "nix" => Some("nix"),
        "vue" => Some("vue"),
        _ => None,
    }
}

/// Repository file encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8 (default). Invalid sequences fail the read.
    #[default]
    Utf8,
    /// ISO 8859-1; every byte maps to the corresponding code point.
    Latin1,
}

impl Encoding {
    /// Decode file bytes in this encoding.
    pub fn decode(&self, bytes: Vec<u8>) -> Result<String, codenav_error::Error> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes)
                .map_err(|e| codenav_error::Error::Encoding(format!("invalid UTF-8: {}", e))),
            Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

/// Ordered ignore patterns plus an optional caller-supplied predicate.
#[derive(Clone, Default)]
pub struct IgnoreSpec {
    globs: Option<GlobSet>,
    predicate: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl IgnoreSpec {
    /// Build from glob patterns (gitignore-style, matched against the
    /// repository-relative path). Invalid patterns are logged and skipped.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            match Glob::new(pattern.as_ref()) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!(pattern = pattern.as_ref(), error = %e, "invalid ignore pattern"),
            }
        }
        let globs = match builder.build() {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(error = %e, "failed to build ignore glob set");
                None
            }
        };
        Self { globs, predicate: None }
    }

    /// Add a predicate consulted after the glob set.
    pub fn with_predicate(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether the repository-relative path is ignored.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        if let Some(globs) = &self.globs {
            if globs.is_match(relative_path) {
                return true;
            }
        }
        if let Some(predicate) = &self.predicate {
            if predicate(relative_path) {
                return true;
            }
        }
        false
    }
}

impl std::fmt::Debug for IgnoreSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnoreSpec")
            .field("globs", &self.globs.as_ref().map(GlobSet::len))
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Read-only configuration for one per-server facade, fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Absolute repository root.
    pub repository_root: PathBuf,
    /// Encoding for file reads.
    pub encoding: Encoding,
    /// Ignore patterns applied to enumeration and reference filtering.
    pub ignore: IgnoreSpec,
    /// Server-specific `initializationOptions` for the handshake.
    pub initialization_options: Option<Value>,
    /// Default per-request timeout.
    pub default_timeout: Duration,
    /// Token-bucket parameters; `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// Directory holding per-language cache files.
    pub cache_dir: PathBuf,
    /// Schema version folded into every cache version stamp.
    pub cache_schema_version: u32,
    /// Debounce interval for the async cache persister.
    pub persister_debounce: Duration,
    /// Whether cache writes run on the background persister.
    pub persister_enabled: bool,
    /// Log wire traffic (method + id) at debug level.
    pub trace_lsp: bool,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the repository root.
    pub fn new(repository_root: impl Into<PathBuf>) -> Self {
        let repository_root = repository_root.into();
        let cache_dir = repository_root.join(".codenav").join("cache");
        Self {
            repository_root,
            encoding: Encoding::default(),
            ignore: IgnoreSpec::default(),
            initialization_options: None,
            default_timeout: Duration::from_secs(30),
            rate_limit: Some(RateLimitConfig::default()),
            cache_dir,
            cache_schema_version: 1,
            persister_debounce: Duration::from_secs(5),
            persister_enabled: true,
            trace_lsp: false,
        }
    }
}
