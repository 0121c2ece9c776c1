//! Companion-server orchestration for hybrid file formats.
//!
//! A primary server for a domain format (say, single-file components)
//! delegates definition, reference, and rename operations to companion
//! servers configured for the embedded languages, and keeps the companions
//! able to resolve cross-file symbols by opening every domain file on them
//! up front.

use crate::config::Language;
use crate::facade::LanguageServer;
use codenav_symbols::SymbolLocation;
use globset::{Glob, GlobSet, GlobSetBuilder};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Configuration of one embedded language inside a domain format.
#[derive(Debug, Clone)]
pub struct EmbeddedLanguageConfig {
    /// Identifier of the embedded language (e.g. `typescript`).
    pub language_id: String,
    /// Glob patterns (against repository-relative paths) selecting the
    /// domain files this companion should index.
    pub file_patterns: Vec<String>,
    /// Higher wins when several companions handle the same operation.
    pub priority: i32,
    /// Companion answers `textDocument/definition`.
    pub handles_definitions: bool,
    /// Companion answers `textDocument/references`.
    pub handles_references: bool,
    /// Companion answers `textDocument/rename`.
    pub handles_rename: bool,
}

/// Operation categories a companion can take over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionOperation {
    /// Go-to-definition.
    Definitions,
    /// Find references.
    References,
    /// Rename.
    Rename,
}

impl EmbeddedLanguageConfig {
    fn handles(&self, operation: CompanionOperation) -> bool {
        match operation {
            CompanionOperation::Definitions => self.handles_definitions,
            CompanionOperation::References => self.handles_references,
            CompanionOperation::Rename => self.handles_rename,
        }
    }
}

/// Primary-computed references for a domain format (occurrences the
/// embedded-language companion cannot see, like template bindings).
pub type DomainReferencesFn =
    Arc<dyn Fn(&str, u32, u32) -> Vec<SymbolLocation> + Send + Sync>;

/// The companion servers attached to one primary facade.
pub struct CompanionSet {
    /// Extension (without dot) of the primary's domain files.
    domain_extension: String,
    companions: Vec<CompanionEntry>,
    indexed: AtomicBool,
    /// `(companion index, relative path)` pairs opened for indexing, so
    /// shutdown can decrement exactly the ref-counts indexing added.
    indexed_files: Mutex<Vec<(usize, String)>>,
    domain_references: Option<DomainReferencesFn>,
}

struct CompanionEntry {
    config: EmbeddedLanguageConfig,
    server: Arc<LanguageServer>,
    matcher: Option<GlobSet>,
}

impl CompanionSet {
    /// Build a set from embedded-language configs and their (not yet
    /// started) servers.
    pub fn new(
        domain_extension: impl Into<String>,
        companions: Vec<(EmbeddedLanguageConfig, Arc<LanguageServer>)>,
    ) -> Self {
        let companions = companions
            .into_iter()
            .map(|(config, server)| {
                let matcher = build_matcher(&config.file_patterns);
                CompanionEntry { config, server, matcher }
            })
            .collect();
        Self {
            domain_extension: domain_extension.into(),
            companions,
            indexed: AtomicBool::new(false),
            indexed_files: Mutex::new(Vec::new()),
            domain_references: None,
        }
    }

    /// Install a domain-specific reference provider merged into companion
    /// results.
    pub fn with_domain_references(mut self, provider: DomainReferencesFn) -> Self {
        self.domain_references = Some(provider);
        self
    }

    pub(crate) fn domain_extension(&self) -> &str {
        &self.domain_extension
    }

    pub(crate) fn domain_references(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
    ) -> Vec<SymbolLocation> {
        match &self.domain_references {
            Some(provider) => provider(relative_path, line, character),
            None => Vec::new(),
        }
    }

    /// Start every companion. A single failure fails the whole set (and
    /// with it the primary's start); already-started companions are
    /// stopped again.
    pub(crate) fn start_all(&self) -> codenav_error::Result<()> {
        let mut started: Vec<&CompanionEntry> = Vec::new();
        for entry in &self.companions {
            info!(language = %entry.config.language_id, "starting companion server");
            if let Err(e) = entry.server.start() {
                warn!(language = %entry.config.language_id, error = %e, "companion failed to start");
                for prior in started {
                    prior.server.stop(std::time::Duration::from_secs(2), false);
                }
                return Err(e);
            }
            started.push(entry);
        }
        Ok(())
    }

    /// Release indexed files and stop every companion. Failures are
    /// logged; the primary's stop continues regardless.
    pub(crate) fn stop_all(&self, timeout: std::time::Duration) {
        self.cleanup_indexed_files();
        for entry in &self.companions {
            info!(language = %entry.config.language_id, "stopping companion server");
            entry.server.stop(timeout, false);
        }
        self.indexed.store(false, Ordering::SeqCst);
    }

    /// Highest-priority running companion handling `operation`.
    pub(crate) fn companion_for(
        &self,
        operation: CompanionOperation,
    ) -> Option<Arc<LanguageServer>> {
        let mut candidates: Vec<&CompanionEntry> =
            self.companions.iter().filter(|e| e.config.handles(operation)).collect();
        candidates.sort_by_key(|e| std::cmp::Reverse(e.config.priority));
        for entry in candidates {
            if entry.server.is_running() {
                return Some(Arc::clone(&entry.server));
            }
            // A crashed companion is skipped; callers fall back to the
            // primary's own implementation.
            warn!(
                language = %entry.config.language_id,
                "companion not running; falling back"
            );
        }
        None
    }

    /// Open every domain file on each companion whose glob set matches, so
    /// cross-file references resolve. Runs once per session; per-file
    /// failures are logged and skipped.
    pub(crate) fn ensure_domain_files_indexed(&self, domain_files: &[String]) {
        if self.indexed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(count = domain_files.len(), "indexing domain files on companions");

        let mut opened = self.indexed_files.lock();
        for (index, entry) in self.companions.iter().enumerate() {
            for file in domain_files {
                let matches = match &entry.matcher {
                    Some(matcher) => matcher.is_match(file),
                    None => false,
                };
                if !matches {
                    continue;
                }
                match entry.server.open_file_pinned(file) {
                    Ok(()) => opened.push((index, file.clone())),
                    Err(e) => {
                        debug!(
                            file = %file,
                            language = %entry.config.language_id,
                            error = %e,
                            "failed to index domain file on companion"
                        );
                    }
                }
            }
        }
        debug!(opened = opened.len(), "domain file indexing complete");
    }

    /// Decrement the ref-counts indexing added, closing files that reach
    /// zero.
    pub(crate) fn cleanup_indexed_files(&self) {
        let opened: Vec<(usize, String)> = {
            let mut indexed = self.indexed_files.lock();
            indexed.drain(..).collect()
        };
        if opened.is_empty() {
            return;
        }
        debug!(count = opened.len(), "releasing indexed domain files");
        for (index, file) in opened {
            if let Some(entry) = self.companions.get(index) {
                entry.server.release_file(&file);
            }
        }
    }

    /// Languages of the attached companions (diagnostics).
    pub fn companion_languages(&self) -> Vec<Language> {
        self.companions.iter().map(|e| e.server.language().clone()).collect()
    }
}

fn build_matcher(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "invalid companion file pattern"),
        }
    }
    builder.build().ok()
}

/// Deduplicate references by `(path, start line, start character)`,
/// preserving first-seen order. Paths are canonicalized case-insensitively
/// on Windows so drive-letter spelling differences cannot produce
/// duplicates.
pub(crate) fn merge_references(
    companion_refs: Vec<SymbolLocation>,
    domain_refs: Vec<SymbolLocation>,
) -> Vec<SymbolLocation> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for reference in companion_refs.into_iter().chain(domain_refs) {
        let key = (
            dedupe_path_key(&reference.relative_path),
            reference.range.start.line,
            reference.range.start.character,
        );
        if seen.insert(key) {
            merged.push(reference);
        }
    }
    merged
}

#[cfg(windows)]
fn dedupe_path_key(path: &str) -> String {
    path.to_ascii_lowercase()
}

#[cfg(not(windows))]
fn dedupe_path_key(path: &str) -> String {
    path.to_string()
}
