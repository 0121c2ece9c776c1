//! Multi-server management for codenav.
//!
//! A [`LanguageServerManager`] owns one facade per language for a single
//! repository: parallel startup with aggregated failure, path-based
//! routing with health-checked reuse, dynamic add/remove/restart, and
//! repository-wide shutdown that flushes pending cache writes first.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use codenav_cache::AsyncCachePersister;
use codenav_error::{Error, Result};
use codenav_server::{Language, LanguageServer};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Creates facades for languages on demand (startup, restart, add).
pub trait LanguageServerFactory: Send + Sync {
    /// Build a facade for `language`, not yet started.
    fn create(&self, language: &Language) -> Result<LanguageServer>;
}

/// Manager-level tunables.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Whether cache writes run on the background persister.
    pub async_cache_enabled: bool,
    /// Debounce interval for scheduled cache writes.
    pub async_cache_debounce: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self { async_cache_enabled: true, async_cache_debounce: Duration::from_secs(5) }
    }
}

/// Manages one or more language servers for a repository.
///
/// The first configured language is the default routing target for paths
/// no server claims.
pub struct LanguageServerManager {
    servers: RwLock<Vec<(Language, Arc<LanguageServer>)>>,
    factory: Option<Arc<dyn LanguageServerFactory>>,
    persister: AsyncCachePersister,
}

impl LanguageServerManager {
    /// Start servers for all `languages` in parallel threads. On any
    /// failure every successfully started server is stopped again and the
    /// per-language errors are aggregated into
    /// [`Error::StartupFailed`].
    pub fn from_languages(
        languages: Vec<Language>,
        factory: Arc<dyn LanguageServerFactory>,
        options: ManagerOptions,
    ) -> Result<Self> {
        if languages.is_empty() {
            return Err(Error::StartupFailed {
                failures: vec![("<none>".to_string(), "no languages configured".to_string())],
            });
        }

        type StartResult = (Language, std::result::Result<Arc<LanguageServer>, String>);
        let results: Arc<Mutex<Vec<StartResult>>> = Arc::new(Mutex::new(Vec::new()));

        thread::scope(|scope| {
            for language in &languages {
                let factory = Arc::clone(&factory);
                let thread_results = Arc::clone(&results);
                let worker_language = language.clone();
                let name = format!("start-ls-{}", language.id());
                let builder = thread::Builder::new().name(name);
                let spawned = builder.spawn_scoped(scope, move || {
                    let outcome = start_one(&*factory, &worker_language);
                    thread_results.lock().push((worker_language, outcome));
                });
                if let Err(e) = spawned {
                    results.lock().push((
                        language.clone(),
                        Err(format!("failed to spawn startup thread: {}", e)),
                    ));
                }
            }
        });

        let mut started: Vec<(Language, Arc<LanguageServer>)> = Vec::new();
        let mut failures: Vec<(String, String)> = Vec::new();
        let mut outcomes = results.lock();
        // Preserve the configured language order; it decides the default.
        for language in &languages {
            let Some(index) = outcomes.iter().position(|(l, _)| l == language) else {
                continue;
            };
            let (language, outcome) = outcomes.swap_remove(index);
            match outcome {
                Ok(server) => started.push((language, server)),
                Err(message) => failures.push((language.id().to_string(), message)),
            }
        }
        drop(outcomes);

        if !failures.is_empty() {
            for (language, server) in &started {
                warn!(language = %language, "stopping server after startup failure elsewhere");
                server.stop(Duration::from_secs(2), false);
            }
            return Err(Error::StartupFailed { failures });
        }

        info!(count = started.len(), "all language servers started");
        Ok(Self {
            servers: RwLock::new(started),
            factory: Some(factory),
            persister: AsyncCachePersister::new(
                options.async_cache_debounce,
                options.async_cache_enabled,
            ),
        })
    }

    /// Wrap already-started servers. Without a factory, dead servers
    /// cannot be restarted.
    pub fn from_servers(
        servers: Vec<(Language, Arc<LanguageServer>)>,
        factory: Option<Arc<dyn LanguageServerFactory>>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            servers: RwLock::new(servers),
            factory,
            persister: AsyncCachePersister::new(
                options.async_cache_debounce,
                options.async_cache_enabled,
            ),
        }
    }

    /// Languages currently managed, in routing order.
    pub fn active_languages(&self) -> Vec<Language> {
        self.servers.read().iter().map(|(l, _)| l.clone()).collect()
    }

    /// The server managed for `language`.
    pub fn server_for_language(&self, language: &Language) -> Result<Arc<LanguageServer>> {
        let server = self
            .servers
            .read()
            .iter()
            .find(|(l, _)| l == language)
            .map(|(_, s)| Arc::clone(s))
            .ok_or_else(|| Error::NoSuchLanguage(language.id().to_string()))?;
        self.ensure_functional(language, server)
    }

    /// Route a repository-relative path to a server: the single managed
    /// one, else the first that does not ignore the path (unsupported
    /// files count as ignored), else the default. The chosen server is
    /// health-checked and restarted through the factory when dead.
    pub fn server_for_path(&self, relative_path: &str) -> Result<Arc<LanguageServer>> {
        let (language, server) = {
            let servers = self.servers.read();
            let Some(default) = servers.first() else {
                return Err(Error::NoSuchLanguage("<none>".to_string()));
            };
            let chosen = if servers.len() > 1 {
                servers
                    .iter()
                    .find(|(_, s)| !s.is_ignored_path(relative_path, true))
                    .unwrap_or(default)
            } else {
                default
            };
            (chosen.0.clone(), Arc::clone(&chosen.1))
        };
        self.ensure_functional(&language, server)
    }

    fn ensure_functional(
        &self,
        language: &Language,
        server: Arc<LanguageServer>,
    ) -> Result<Arc<LanguageServer>> {
        if server.is_running() {
            return Ok(server);
        }
        warn!(language = %language, "language server not running; restarting");
        self.restart_language(language)
    }

    /// Recreate and restart the server for `language`, replacing the dead
    /// session transparently.
    pub fn restart_language(&self, language: &Language) -> Result<Arc<LanguageServer>> {
        if !self.servers.read().iter().any(|(l, _)| l == language) {
            return Err(Error::NoSuchLanguage(language.id().to_string()));
        }
        let factory = self.factory.as_ref().ok_or_else(|| {
            Error::FactoryUnavailable(format!(
                "cannot restart language server for {}",
                language.id()
            ))
        })?;

        let server = Arc::new(factory.create(language)?);
        server.start()?;

        let mut servers = self.servers.write();
        if let Some(slot) = servers.iter_mut().find(|(l, _)| l == language) {
            slot.1 = Arc::clone(&server);
        }
        Ok(server)
    }

    /// Dynamically add a server for a new language.
    pub fn add_language(&self, language: Language) -> Result<Arc<LanguageServer>> {
        if self.servers.read().iter().any(|(l, _)| l == &language) {
            return Err(Error::StartupFailed {
                failures: vec![(
                    language.id().to_string(),
                    "language server already present".to_string(),
                )],
            });
        }
        let factory = self.factory.as_ref().ok_or_else(|| {
            Error::FactoryUnavailable(format!("cannot add language server for {}", language.id()))
        })?;

        let server = Arc::new(factory.create(&language)?);
        server.start()?;
        self.servers.write().push((language, Arc::clone(&server)));
        Ok(server)
    }

    /// Remove and stop the server for `language`.
    pub fn remove_language(&self, language: &Language, save_cache: bool) -> Result<()> {
        let removed = {
            let mut servers = self.servers.write();
            let index = servers
                .iter()
                .position(|(l, _)| l == language)
                .ok_or_else(|| Error::NoSuchLanguage(language.id().to_string()))?;
            servers.remove(index)
        };
        removed.1.stop(Duration::from_secs(2), save_cache);
        Ok(())
    }

    /// Save the caches of every running server synchronously.
    pub fn save_all_caches(&self) {
        for (language, server) in self.servers.read().iter() {
            if !server.is_running() {
                continue;
            }
            if let Err(e) = server.save_caches() {
                warn!(language = %language, error = %e, "failed to save caches");
            }
        }
    }

    /// Schedule debounced background writes for every modified cache.
    /// Returns immediately; the persister does the serialization and disk
    /// I/O later.
    pub fn schedule_async_cache_writes(&self) {
        for (_, server) in self.servers.read().iter() {
            if server.is_running() {
                server.schedule_cache_writes(&self.persister);
            }
        }
    }

    /// Stop everything: flush pending cache writes within a bounded
    /// window, stop each server with the per-server timeout, then shut
    /// the persister down.
    pub fn stop_all(&self, save_cache: bool, timeout: Duration) {
        if save_cache {
            debug!("flushing pending cache writes before shutdown");
            self.persister.flush_all(Duration::from_secs(10));
        }
        for (language, server) in self.servers.read().iter() {
            debug!(language = %language, "stopping language server");
            server.stop(timeout, save_cache);
        }
        self.persister.shutdown(Duration::from_secs(5));
    }

    /// Pending background cache writes (diagnostics).
    pub fn pending_cache_writes(&self) -> usize {
        self.persister.pending_count()
    }
}

fn start_one(
    factory: &dyn LanguageServerFactory,
    language: &Language,
) -> std::result::Result<Arc<LanguageServer>, String> {
    info!(language = %language, "starting language server");
    let server = factory.create(language).map_err(|e| e.to_string())?;
    server.start().map_err(|e| e.to_string())?;
    if !server.is_running() {
        return Err("language server did not come up".to_string());
    }
    Ok(Arc::new(server))
}
