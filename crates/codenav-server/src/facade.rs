//! The per-server facade: a uniform, repository-relative symbolic API over
//! one language server.

use crate::caches::{CacheFlavor, SymbolCaches};
use crate::call_graph::{
    CallDirection, CallGraph, CallGraphBuilder, parse_call_item, parse_call_sites,
};
use crate::companion::{CompanionOperation, CompanionSet, merge_references};
use crate::config::{Language, ServerConfig, language_id_for_extension};
use crate::convert::{
    display_path, parse_document_symbols, parse_locations, parse_workspace_symbols,
};
use crate::edits::{Hover, WorkspaceEdit, parse_hover, parse_workspace_edit};
use crate::policy::{DefaultPolicy, LanguagePolicy};
use codenav_cache::{AsyncCachePersister, CacheConfig, CacheStats, save_cache};
use codenav_client::{LaunchDescriptor, ServerSession, SessionConfig};
use codenav_error::{Error, Result};
use codenav_protocol::methods;
use codenav_symbols::{
    NamePathComponent, NamePathPattern, Position, Reference, Symbol, SymbolLocation,
    assign_overload_indices, extract_range,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One open file on the wire.
struct FileBuffer {
    uri: String,
    contents: String,
    version: i32,
    ref_count: usize,
}

/// Scoped file acquisition. Dropping the scope decrements the ref-count
/// and sends `didClose` when it reaches zero, on every exit path.
pub struct FileScope<'a> {
    server: &'a LanguageServer,
    relative_path: String,
}

impl FileScope<'_> {
    /// The repository-relative path this scope holds open.
    pub fn path(&self) -> &str {
        &self.relative_path
    }
}

impl Drop for FileScope<'_> {
    fn drop(&mut self) {
        self.server.release_file(&self.relative_path);
    }
}

/// A language server plus the repository-relative view codenav exposes
/// over it: ref-counted file buffers, cached document symbols, name-path
/// lookup, and the reference/definition/rename/hover operations.
pub struct LanguageServer {
    language: Language,
    config: Arc<ServerConfig>,
    policy: Arc<dyn LanguagePolicy>,
    launch: Option<LaunchDescriptor>,
    session: RwLock<Option<Arc<ServerSession>>>,
    capabilities: Mutex<Value>,
    buffers: Mutex<HashMap<String, FileBuffer>>,
    caches: SymbolCaches,
    cross_file_waited: AtomicBool,
    companions: Option<CompanionSet>,
}

impl LanguageServer {
    /// Create a facade that will spawn `launch` on [`LanguageServer::start`].
    pub fn new(language: Language, launch: LaunchDescriptor, config: ServerConfig) -> Self {
        Self::with_policy(language, launch, config, Arc::new(DefaultPolicy))
    }

    /// Create a facade with a language-specific policy.
    pub fn with_policy(
        language: Language,
        launch: LaunchDescriptor,
        config: ServerConfig,
        policy: Arc<dyn LanguagePolicy>,
    ) -> Self {
        Self::build(language, Some(launch), config, policy, None)
    }

    /// Create a facade whose session will be attached manually via
    /// [`LanguageServer::attach_session`] (test harnesses, custom
    /// transports).
    pub fn detached(language: Language, config: ServerConfig) -> Self {
        Self::build(language, None, config, Arc::new(DefaultPolicy), None)
    }

    /// Add companion orchestration to a facade under construction.
    pub fn with_companions(mut self, companions: CompanionSet) -> Self {
        self.companions = Some(companions);
        self
    }

    fn build(
        language: Language,
        launch: Option<LaunchDescriptor>,
        config: ServerConfig,
        policy: Arc<dyn LanguagePolicy>,
        companions: Option<CompanionSet>,
    ) -> Self {
        let cache_dir = config.cache_dir.join(language.id());
        Self {
            language,
            config: Arc::new(config),
            policy,
            launch,
            session: RwLock::new(None),
            capabilities: Mutex::new(Value::Null),
            buffers: Mutex::new(HashMap::new()),
            caches: SymbolCaches::new(cache_dir, CacheConfig::default()),
            cross_file_waited: AtomicBool::new(false),
            companions,
        }
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Spawn the child process, run the handshake, load caches, and start
    /// any companions.
    pub fn start(&self) -> Result<()> {
        if self.session.read().is_some() {
            return Ok(());
        }
        let launch = self
            .launch
            .as_ref()
            .ok_or_else(|| Error::Transport("no launch descriptor configured".to_string()))?;
        let session = ServerSession::spawn(launch, self.session_config())?;
        self.attach_session(session)
    }

    /// Attach an already-constructed session and run the handshake.
    pub fn attach_session(&self, session: ServerSession) -> Result<()> {
        let root_uri = codenav_uri::path_to_uri(&self.config.repository_root)
            .map_err(Error::Transport)?;
        let init_result = session.initialize(
            &root_uri,
            client_capabilities(),
            self.config.initialization_options.clone(),
        )?;
        *self.capabilities.lock() =
            init_result.get("capabilities").cloned().unwrap_or(Value::Null);
        *self.session.write() = Some(Arc::new(session));

        self.caches.load_from_disk(&self.cache_version());

        if let Some(companions) = &self.companions {
            if let Err(e) = companions.start_all() {
                warn!(language = %self.language, error = %e, "companion startup failed; stopping primary");
                if let Some(session) = self.session.write().take() {
                    session.stop(Duration::from_secs(2));
                }
                return Err(e);
            }
        }

        info!(language = %self.language, "language server started");
        Ok(())
    }

    /// Whether the underlying session is alive.
    pub fn is_running(&self) -> bool {
        self.session.read().as_ref().is_some_and(|s| s.is_running())
    }

    /// Stop companions, optionally save caches, then shut the session
    /// down within `timeout`.
    pub fn stop(&self, timeout: Duration, save_cache: bool) {
        if let Some(companions) = &self.companions {
            companions.stop_all(timeout);
        }
        if save_cache {
            if let Err(e) = self.save_caches() {
                warn!(language = %self.language, error = %e, "failed to save caches on stop");
            }
        }
        if let Some(session) = self.session.write().take() {
            info!(language = %self.language, "stopping language server");
            session.stop(timeout);
        }
        self.buffers.lock().clear();
    }

    /// The language this facade serves.
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// The server's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            default_timeout: self.config.default_timeout,
            rate_limit: self.config.rate_limit,
            trace: self.config.trace_lsp,
        }
    }

    fn session(&self) -> Result<Arc<ServerSession>> {
        match self.session.read().as_ref() {
            Some(session) if session.is_running() => Ok(Arc::clone(session)),
            _ => Err(Error::NotStarted),
        }
    }

    // -------------------------------------------------------------------
    // Paths and ignore rules
    // -------------------------------------------------------------------

    /// Absolute path for a repository-relative one, rejecting traversal
    /// outside the root.
    fn absolute_path(&self, relative_path: &str) -> Result<PathBuf> {
        if relative_path.split('/').any(|segment| segment == "..") {
            return Err(Error::PathOutsideRepository(relative_path.to_string()));
        }
        Ok(codenav_uri::from_repository_relative(&self.config.repository_root, relative_path))
    }

    /// Whether a path is ignored for this server. With
    /// `ignore_unsupported`, files the language does not claim count as
    /// ignored too (the manager routes on this).
    pub fn is_ignored_path(&self, relative_path: &str, ignore_unsupported: bool) -> bool {
        if relative_path
            .split('/')
            .any(|segment| self.policy.ignored_dirnames().contains(&segment))
        {
            return true;
        }
        if self.config.ignore.is_ignored(relative_path) {
            return true;
        }
        if ignore_unsupported && !self.language.claims_path(relative_path) {
            return true;
        }
        false
    }

    // -------------------------------------------------------------------
    // File buffers
    // -------------------------------------------------------------------

    /// Open a file for the duration of the returned scope. The first open
    /// reads it from disk in the repository encoding and sends `didOpen`;
    /// nested opens only bump the ref-count.
    pub fn open_file(&self, relative_path: &str) -> Result<FileScope<'_>> {
        self.open_file_pinned(relative_path)?;
        Ok(FileScope { server: self, relative_path: relative_path.to_string() })
    }

    /// Open without a scope; the caller owns one ref-count increment and
    /// must pair it with [`LanguageServer::release_file`].
    pub(crate) fn open_file_pinned(&self, relative_path: &str) -> Result<()> {
        let absolute = self.absolute_path(relative_path)?;

        let mut buffers = self.buffers.lock();
        if let Some(buffer) = buffers.get_mut(relative_path) {
            buffer.ref_count += 1;
            return Ok(());
        }

        let bytes = std::fs::read(&absolute)?;
        let contents = self.config.encoding.decode(bytes)?;
        let uri = codenav_uri::path_to_uri(&absolute).map_err(Error::Transport)?;
        let language_id = self.language_id_for(relative_path);

        let session = self.session()?;
        session.notify(
            methods::TEXT_DOCUMENT_DID_OPEN,
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": 0,
                    "text": contents,
                }
            }),
        )?;

        buffers.insert(
            relative_path.to_string(),
            FileBuffer { uri, contents, version: 0, ref_count: 1 },
        );
        Ok(())
    }

    /// Decrement a file's ref-count, closing it on the wire at zero.
    pub(crate) fn release_file(&self, relative_path: &str) {
        let mut buffers = self.buffers.lock();
        let Some(buffer) = buffers.get_mut(relative_path) else {
            return;
        };
        buffer.ref_count -= 1;
        if buffer.ref_count > 0 {
            return;
        }
        let uri = buffer.uri.clone();
        buffers.remove(relative_path);
        drop(buffers);

        if let Ok(session) = self.session() {
            let _ = session.notify(
                methods::TEXT_DOCUMENT_DID_CLOSE,
                json!({ "textDocument": { "uri": uri } }),
            );
        }
    }

    /// Replace a file's buffered contents, bump its version, and send a
    /// full-text `didChange`. Symbol caches invalidate via the content
    /// hash. The file must currently be open.
    pub fn notify_file_changed(&self, relative_path: &str, new_text: &str) -> Result<()> {
        let (uri, version) = {
            let mut buffers = self.buffers.lock();
            let buffer = buffers
                .get_mut(relative_path)
                .ok_or_else(|| Error::Transport(format!("file not open: {}", relative_path)))?;
            buffer.version += 1;
            buffer.contents = new_text.to_string();
            (buffer.uri.clone(), buffer.version)
        };
        let session = self.session()?;
        session.notify(
            methods::TEXT_DOCUMENT_DID_CHANGE,
            json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": [{ "text": new_text }],
            }),
        )
    }

    /// Current contents: the live buffer when the file is open, the disk
    /// contents otherwise.
    pub fn file_content(&self, relative_path: &str) -> Result<String> {
        if let Some(buffer) = self.buffers.lock().get(relative_path) {
            return Ok(buffer.contents.clone());
        }
        let absolute = self.absolute_path(relative_path)?;
        let bytes = std::fs::read(&absolute)?;
        self.config.encoding.decode(bytes)
    }

    fn uri_for(&self, relative_path: &str) -> Result<String> {
        if let Some(buffer) = self.buffers.lock().get(relative_path) {
            return Ok(buffer.uri.clone());
        }
        let absolute = self.absolute_path(relative_path)?;
        codenav_uri::path_to_uri(&absolute).map_err(Error::Transport)
    }

    /// Number of files currently held open (diagnostics).
    pub fn open_file_count(&self) -> usize {
        self.buffers.lock().len()
    }

    // -------------------------------------------------------------------
    // Document symbols and the symbol cache
    // -------------------------------------------------------------------

    /// Document symbols for one file: `(flat depth-first list, roots)`.
    ///
    /// Results are cached by content hash; an identical request against
    /// unchanged contents answers from the cache without an RPC. With
    /// `include_body` each returned symbol carries the verbatim buffer
    /// text of its range.
    pub fn request_document_symbols(
        &self,
        relative_path: &str,
        include_body: bool,
    ) -> Result<(Vec<Symbol>, Vec<Symbol>)> {
        self.session()?;
        let content = self.file_content(relative_path)?;
        let hash = content_hash(&content);

        let roots = match self.caches.get(CacheFlavor::Processed, relative_path, &hash) {
            Some(roots) => roots,
            None => self.fetch_document_symbols(relative_path, &content, &hash)?,
        };

        let mut roots_out: Vec<Symbol> = roots.as_ref().clone();
        if include_body {
            fill_bodies(&mut roots_out, &content);
        }
        let flat: Vec<Symbol> = roots_out.iter().flat_map(Symbol::flatten).cloned().collect();
        Ok((flat, roots_out))
    }

    fn fetch_document_symbols(
        &self,
        relative_path: &str,
        content: &str,
        hash: &str,
    ) -> Result<Arc<Vec<Symbol>>> {
        let scope = self.open_file(relative_path)?;
        let session = self.session()?;
        let uri = self.uri_for(scope.path())?;
        let response = session.request(
            methods::TEXT_DOCUMENT_DOCUMENT_SYMBOL,
            json!({ "textDocument": { "uri": uri } }),
        )?;
        drop(scope);

        let raw_roots = parse_document_symbols(&response, relative_path);
        self.caches.put(CacheFlavor::Raw, relative_path, hash, Arc::new(raw_roots.clone()));

        let mut processed = raw_roots;
        normalize_names(&mut processed, self.policy.as_ref());
        self.policy.postprocess_symbols(&mut processed, content);
        let processed = Arc::new(processed);
        self.caches.put(CacheFlavor::Processed, relative_path, hash, Arc::clone(&processed));
        Ok(processed)
    }

    /// Top-level symbols under a file or directory (repository root when
    /// `within_path` is `None`). Directory aggregation skips ignored and
    /// unclaimed files; per-file failures are logged and skipped.
    pub fn request_full_symbol_tree(
        &self,
        within_path: Option<&str>,
        include_body: bool,
    ) -> Result<Vec<Symbol>> {
        let target = within_path.unwrap_or("");
        let absolute = self.absolute_path(target)?;

        if absolute.is_file() {
            let (_, roots) = self.request_document_symbols(target, include_body)?;
            return Ok(roots);
        }
        if !absolute.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such path in repository: {}", target),
            )));
        }

        let mut aggregated = Vec::new();
        for file in self.enumerate_files(&absolute) {
            match self.request_document_symbols(&file, include_body) {
                Ok((_, roots)) => aggregated.extend(roots),
                Err(e) => warn!(file = %file, error = %e, "skipping file in symbol tree"),
            }
        }
        Ok(aggregated)
    }

    /// Repository-relative paths of non-ignored files this language
    /// claims, under `base`, in deterministic order.
    fn enumerate_files(&self, base: &std::path::Path) -> Vec<String> {
        let ignored_dirs = self.policy.ignored_dirnames();
        let mut files: Vec<String> = WalkDir::new(base)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| ignored_dirs.contains(&name)))
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                codenav_uri::to_repository_relative(&self.config.repository_root, entry.path())
            })
            .filter(|relative| !self.is_ignored_path(relative, true))
            .collect();
        files.sort();
        files
    }

    /// The deepest symbol whose range encloses `(line, character)`.
    pub fn request_containing_symbol(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
        include_body: bool,
    ) -> Result<Option<Symbol>> {
        let (_, roots) = self.request_document_symbols(relative_path, include_body)?;
        let position = Position::new(line, character);
        Ok(codenav_symbols::find_containing(&roots, position).cloned())
    }

    /// Symbols whose qualified name path matches `pattern` (see the
    /// name-path grammar), searched under `within_path`.
    pub fn find(
        &self,
        pattern: &str,
        within_path: Option<&str>,
        substring: bool,
    ) -> Result<Vec<Symbol>> {
        let Some(parsed) = NamePathPattern::parse(pattern) else {
            debug!(pattern, "unparsable name-path pattern");
            return Ok(Vec::new());
        };
        let roots = self.request_full_symbol_tree(within_path, false)?;
        let mut matches = Vec::new();
        let mut chain = Vec::new();
        collect_matches(&roots, &mut chain, &parsed, substring, &mut matches);
        Ok(matches)
    }

    // -------------------------------------------------------------------
    // Cross-file operations
    // -------------------------------------------------------------------

    /// One-time per-session wait before the first cross-file request, for
    /// servers that index lazily.
    fn ensure_cross_file_wait(&self) {
        if self.cross_file_waited.swap(true, Ordering::SeqCst) {
            return;
        }
        let wait = self.policy.cross_file_wait();
        if !wait.is_zero() {
            debug!(language = %self.language, ?wait, "waiting for cross-file indexing");
            std::thread::sleep(wait);
        }
    }

    /// Go-to-definition. In-repository results come back repository-
    /// relative; definitions outside the root (standard libraries) keep
    /// their absolute path. With companions, the highest-priority
    /// companion answers, and multiple candidates reduce to the
    /// policy-preferred one.
    pub fn request_definition(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<SymbolLocation>> {
        if let Some(companions) = &self.companions {
            if let Some(companion) = companions.companion_for(CompanionOperation::Definitions) {
                let _scope = companion.open_file(relative_path)?;
                let definitions = companion.request_definition(relative_path, line, character)?;
                if definitions.len() > 1 {
                    let preferred = self.policy.preferred_definition(&definitions);
                    return Ok(vec![definitions[preferred].clone()]);
                }
                return Ok(definitions);
            }
        }
        self.primary_definition(relative_path, line, character)
    }

    fn primary_definition(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<SymbolLocation>> {
        let scope = self.open_file(relative_path)?;
        let session = self.session()?;
        let uri = self.uri_for(scope.path())?;
        let response = session.request(
            methods::TEXT_DOCUMENT_DEFINITION,
            json!({
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": character },
            }),
        )?;
        drop(scope);

        Ok(parse_locations(&response)
            .into_iter()
            .map(|location| SymbolLocation {
                relative_path: display_path(&location.absolute_path, &self.config.repository_root),
                range: location.range,
            })
            .collect())
    }

    /// Find references. Results are filtered to non-ignored files inside
    /// the repository and returned repository-relative. With companions,
    /// companion references merge with domain-specific ones, deduplicated
    /// by position.
    pub fn request_references(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<SymbolLocation>> {
        self.ensure_cross_file_wait();

        if let Some(companions) = &self.companions {
            let domain_files = self.find_domain_files(companions.domain_extension());
            companions.ensure_domain_files_indexed(&domain_files);

            let companion_refs = match companions.companion_for(CompanionOperation::References) {
                Some(companion) => {
                    let _scope = companion.open_file(relative_path)?;
                    companion.request_references(relative_path, line, character)?
                }
                None => self.primary_references(relative_path, line, character)?,
            };
            let domain_refs = companions.domain_references(relative_path, line, character);
            return Ok(merge_references(companion_refs, domain_refs));
        }

        self.primary_references(relative_path, line, character)
    }

    fn primary_references(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<SymbolLocation>> {
        let scope = self.open_file(relative_path)?;
        let session = self.session()?;
        let uri = self.uri_for(scope.path())?;
        let response = session.request(
            methods::TEXT_DOCUMENT_REFERENCES,
            json!({
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": character },
                "context": { "includeDeclaration": true },
            }),
        )?;
        drop(scope);

        let mut references = Vec::new();
        for location in parse_locations(&response) {
            let Some(relative) = codenav_uri::to_repository_relative(
                &self.config.repository_root,
                &location.absolute_path,
            ) else {
                debug!(path = %location.absolute_path.display(), "reference outside repository skipped");
                continue;
            };
            if self.is_ignored_path(&relative, false) {
                debug!(path = %relative, "ignored reference skipped");
                continue;
            }
            references.push(SymbolLocation { relative_path: relative, range: location.range });
        }
        Ok(merge_references(references, Vec::new()))
    }

    /// For the symbol named by `name_path` in `relative_path`, every
    /// referencing occurrence together with the symbol containing it.
    pub fn request_referencing_symbols(
        &self,
        name_path: &str,
        relative_path: &str,
    ) -> Result<Vec<Reference>> {
        let Some(target) = self.find_in_file(name_path, relative_path)? else {
            return Ok(Vec::new());
        };
        let position = target.selection_range.start;
        let occurrences = self.request_references(relative_path, position.line, position.character)?;

        let mut seen = std::collections::HashSet::new();
        let mut references = Vec::new();
        for occurrence in occurrences {
            if !seen.insert((occurrence.relative_path.clone(), occurrence.range)) {
                continue;
            }
            let containing = self
                .request_containing_symbol(
                    &occurrence.relative_path,
                    occurrence.range.start.line,
                    occurrence.range.start.character,
                    false,
                )
                .unwrap_or_else(|e| {
                    debug!(error = %e, "no containing symbol for reference");
                    None
                });
            references.push(Reference { location: occurrence, containing_symbol: containing });
        }
        Ok(references)
    }

    fn find_in_file(&self, name_path: &str, relative_path: &str) -> Result<Option<Symbol>> {
        let Some(pattern) = NamePathPattern::parse(name_path) else {
            return Ok(None);
        };
        let (_, roots) = self.request_document_symbols(relative_path, false)?;
        let mut matches = Vec::new();
        let mut chain = Vec::new();
        collect_matches(&roots, &mut chain, &pattern, false, &mut matches);
        Ok(matches.into_iter().next())
    }

    /// Rename the symbol at a position. `Ok(None)` when the server does
    /// not support rename or offers no edit.
    pub fn request_rename_symbol_edit(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>> {
        if let Some(companions) = &self.companions {
            if let Some(companion) = companions.companion_for(CompanionOperation::Rename) {
                let _scope = companion.open_file(relative_path)?;
                return companion.request_rename_symbol_edit(
                    relative_path,
                    line,
                    character,
                    new_name,
                );
            }
        }
        self.primary_rename(relative_path, line, character, new_name)
    }

    fn primary_rename(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>> {
        if !capability_enabled(&self.capabilities.lock(), "renameProvider") {
            return Ok(None);
        }
        let scope = self.open_file(relative_path)?;
        let session = self.session()?;
        let uri = self.uri_for(scope.path())?;
        let response = session.request(
            methods::TEXT_DOCUMENT_RENAME,
            json!({
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": character },
                "newName": new_name,
            }),
        )?;
        drop(scope);
        Ok(parse_workspace_edit(&response, &self.config.repository_root))
    }

    /// Hover contents at a position, or `None` when the server has none.
    pub fn request_hover(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<Hover>> {
        let scope = self.open_file(relative_path)?;
        let session = self.session()?;
        let uri = self.uri_for(scope.path())?;
        let response = session.request(
            methods::TEXT_DOCUMENT_HOVER,
            json!({
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": character },
            }),
        )?;
        drop(scope);
        Ok(parse_hover(&response))
    }

    /// Workspace-wide symbol query. Servers that never advertised
    /// `workspaceSymbolProvider` are not asked.
    pub fn request_workspace_symbol(&self, query: &str) -> Result<Vec<Symbol>> {
        if !capability_enabled(&self.capabilities.lock(), "workspaceSymbolProvider") {
            return Err(Error::CapabilityUnsupported("workspace/symbol".to_string()));
        }
        let session = self.session()?;
        let response =
            session.request(methods::WORKSPACE_SYMBOL, json!({ "query": query }))?;
        Ok(parse_workspace_symbols(&response, &self.config.repository_root))
    }

    /// Call hierarchy around the symbol at a position, expanded
    /// breadth-first in `direction` up to `max_depth` levels.
    ///
    /// The result is an index-addressed graph: recursion and mutual calls
    /// come back as edges to already-known nodes rather than repeated
    /// subtrees. Servers without `callHierarchyProvider` fail with
    /// [`Error::CapabilityUnsupported`].
    pub fn request_call_graph(
        &self,
        relative_path: &str,
        line: u32,
        character: u32,
        direction: CallDirection,
        max_depth: u32,
    ) -> Result<CallGraph> {
        if !capability_enabled(&self.capabilities.lock(), "callHierarchyProvider") {
            return Err(Error::CapabilityUnsupported("callHierarchy".to_string()));
        }

        let scope = self.open_file(relative_path)?;
        let session = self.session()?;
        let uri = self.uri_for(scope.path())?;
        let prepared = session.request(
            methods::TEXT_DOCUMENT_PREPARE_CALL_HIERARCHY,
            json!({
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": character },
            }),
        )?;
        drop(scope);

        let Some(root_item) = prepared.as_array().and_then(|items| items.first()).cloned()
        else {
            return Ok(CallGraph::default());
        };
        let Some(root_node) = parse_call_item(&root_item, &self.config.repository_root) else {
            return Ok(CallGraph::default());
        };

        let method = match direction {
            CallDirection::Incoming => methods::CALL_HIERARCHY_INCOMING_CALLS,
            CallDirection::Outgoing => methods::CALL_HIERARCHY_OUTGOING_CALLS,
        };
        let neighbor_key = match direction {
            CallDirection::Incoming => "from",
            CallDirection::Outgoing => "to",
        };

        let mut builder = CallGraphBuilder::new(root_item, root_node, max_depth.max(1));
        while let Some((node_id, item, depth)) = builder.next_pending() {
            let response = session.request(method, json!({ "item": item }))?;
            let Some(entries) = response.as_array() else { continue };
            for entry in entries {
                let Some(neighbor_item) = entry.get(neighbor_key) else { continue };
                let Some(node) = parse_call_item(neighbor_item, &self.config.repository_root)
                else {
                    continue;
                };
                builder.add_neighbor(
                    node_id,
                    depth,
                    node,
                    neighbor_item.clone(),
                    parse_call_sites(entry),
                    direction,
                );
            }
        }
        Ok(builder.finish())
    }

    /// Domain files (by extension) for companion indexing.
    fn find_domain_files(&self, extension: &str) -> Vec<String> {
        let suffix = format!(".{}", extension);
        let ignored_dirs = self.policy.ignored_dirnames();
        let mut files: Vec<String> = WalkDir::new(&self.config.repository_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| ignored_dirs.contains(&name)))
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry.file_name().to_str().is_some_and(|name| name.ends_with(&suffix))
            })
            .filter_map(|entry| {
                codenav_uri::to_repository_relative(&self.config.repository_root, entry.path())
            })
            .filter(|relative| !self.is_ignored_path(relative, false))
            .collect();
        files.sort();
        files
    }

    fn language_id_for(&self, relative_path: &str) -> String {
        let extension = relative_path.rsplit('.').next().unwrap_or("");
        language_id_for_extension(extension)
            .map(str::to_string)
            .unwrap_or_else(|| self.language.id().to_string())
    }

    // -------------------------------------------------------------------
    // Cache persistence
    // -------------------------------------------------------------------

    /// Version stamp for cache files: tool version, server identity, and
    /// schema version. Any component changing invalidates persisted trees.
    pub fn cache_version(&self) -> String {
        let identity = self
            .session
            .read()
            .as_ref()
            .and_then(|s| s.server_info())
            .map(|(name, version)| {
                format!("{}@{}", name, version.unwrap_or_else(|| "unknown".to_string()))
            })
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "codenav-{}:{}:schema-{}",
            env!("CARGO_PKG_VERSION"),
            identity,
            self.config.cache_schema_version
        )
    }

    /// Write both symbol caches synchronously.
    pub fn save_caches(&self) -> std::io::Result<()> {
        self.caches.save_all(&self.cache_version())
    }

    /// Schedule modified caches on the async persister. The write
    /// callbacks are self-contained snapshots and never touch the live
    /// cache.
    pub fn schedule_cache_writes(&self, persister: &AsyncCachePersister) {
        for flavor in [CacheFlavor::Raw, CacheFlavor::Processed] {
            if !self.caches.is_modified(flavor) {
                continue;
            }
            let key = format!("{}_{}", self.language.id(), flavor.name());
            let snapshot = self.caches.snapshot(flavor);
            let version = self.cache_version();
            let path = self.caches.file_path(flavor);
            let modified = self.caches.modified_handle(flavor);
            persister.schedule_write(key, move || {
                save_cache(&path, &version, &snapshot)?;
                modified.store(false, Ordering::SeqCst);
                Ok(())
            });
        }
    }

    /// Statistics for one cache flavor.
    pub fn cache_stats(&self, flavor: CacheFlavor) -> CacheStats {
        self.caches.stats(flavor)
    }
}

/// Standard client capabilities advertised on `initialize`.
fn client_capabilities() -> Value {
    json!({
        "general": { "positionEncodings": ["utf-16"] },
        "textDocument": {
            "documentSymbol": { "hierarchicalDocumentSymbolSupport": true },
            "definition": { "linkSupport": true },
            "references": {},
            "rename": {},
            "hover": { "contentFormat": ["markdown", "plaintext"] },
        },
        "workspace": { "symbol": {} },
    })
}

/// MD5 of the file contents, hex-encoded. Cheap enough per request and
/// stable across platforms.
fn content_hash(content: &str) -> String {
    format!("{:x}", md5::compute(content.as_bytes()))
}

fn capability_enabled(capabilities: &Value, name: &str) -> bool {
    match capabilities.get(name) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(_) => true,
    }
}

fn normalize_names(symbols: &mut [Symbol], policy: &dyn LanguagePolicy) {
    for symbol in symbols {
        if let std::borrow::Cow::Owned(normalized) =
            policy.normalize_symbol_name(&symbol.name)
        {
            symbol.name = normalized;
        }
        normalize_names(&mut symbol.children, policy);
    }
}

fn fill_bodies(symbols: &mut [Symbol], content: &str) {
    for symbol in symbols {
        symbol.body = extract_range(content, &symbol.range).map(str::to_string);
        fill_bodies(&mut symbol.children, content);
    }
}

/// Depth-first walk assigning overload indices per sibling group and
/// collecting pattern matches.
fn collect_matches(
    symbols: &[Symbol],
    chain: &mut Vec<NamePathComponent>,
    pattern: &NamePathPattern,
    substring: bool,
    out: &mut Vec<Symbol>,
) {
    let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
    let components = assign_overload_indices(&names);
    for (symbol, component) in symbols.iter().zip(components) {
        chain.push(component);
        if pattern.matches(chain, substring) {
            out.push(symbol.clone());
        }
        collect_matches(&symbol.children, chain, pattern, substring, out);
        chain.pop();
    }
}
