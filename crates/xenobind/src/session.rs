//! # Session
//!
//! Binds the registry, the reflection cache and the proxies to one running
//! foreign runtime.
//!
//! Most embedders go through [`start`], which launches the runtime and
//! installs the session process-wide. At most one runtime runs per process,
//! matching the foreign side's own restriction. [`Session::new`] builds a
//! session over a runtime the caller already holds, without touching global
//! state.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use xenoabi::ForeignRuntime;
use xenoabi::Launcher;

use crate::config::StartConfig;
use crate::error::Error;
use crate::error::Result;
use crate::handles::HandleRegistry;
use crate::proxy::ProxyClass;
use crate::reflect::ClassDescriptor;
use crate::reflect::ReflectionCache;

static RUNNING: Lazy<Mutex<Option<Session>>> = Lazy::new(|| Mutex::new(None));

/// Launches the foreign runtime and installs it as this process's session.
pub fn start(launcher: &dyn Launcher, config: &StartConfig) -> Result<Session> {
    let mut running = RUNNING.lock();
    if running.is_some() {
        return Err(Error::Startup("a foreign runtime is already running in this process".to_string()));
    }

    let runtime = launcher
        .launch(config.library(), config.options())
        .map_err(|e| Error::Startup(e.to_string()))?;
    let session = Session::new(runtime);
    *running = Some(session.clone());

    tracing::info!(library = %config.library().display(), options = config.options().len(), "foreign runtime started");
    Ok(session)
}

/// The session installed by [`start`].
pub fn session() -> Result<Session> {
    RUNNING
        .lock()
        .clone()
        .ok_or_else(|| Error::Startup("no foreign runtime has been started".to_string()))
}

struct SessionInner {
    runtime: Arc<dyn ForeignRuntime>,
    registry: Arc<HandleRegistry>,
    cache: ReflectionCache,
}

/// Cheap to clone; clones share the registry and the cache.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(runtime: Arc<dyn ForeignRuntime>) -> Self {
        let registry = HandleRegistry::new(Arc::clone(&runtime));
        let cache = ReflectionCache::new(Arc::clone(&runtime), Arc::clone(&registry));
        Self {
            inner: Arc::new(SessionInner { runtime, registry, cache }),
        }
    }

    /// Proxy for a foreign class, by dotted or slashed name.
    pub fn get_class(&self, name: &str) -> Result<ProxyClass> {
        let class = self.describe(name)?;
        let handle = Arc::clone(class.handle());
        Ok(ProxyClass::new(self.clone(), handle, class))
    }

    pub fn describe(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        self.inner.cache.describe(name)
    }

    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.inner.runtime
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.inner.registry
    }

    pub fn cache(&self) -> &ReflectionCache {
        &self.inner.cache
    }

    /// Attaches the calling thread until the guard drops. A thread that was
    /// already attached stays attached afterwards.
    pub fn attach_current_thread(&self) -> Result<AttachGuard> {
        let attached_here = self.inner.runtime.attach_current_thread()?;
        Ok(AttachGuard {
            runtime: Arc::clone(&self.inner.runtime),
            attached_here,
        })
    }
}

/// Keeps the current thread attached to the foreign runtime.
#[must_use = "the thread detaches when the guard is dropped"]
pub struct AttachGuard {
    runtime: Arc<dyn ForeignRuntime>,
    attached_here: bool,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if !self.attached_here {
            return;
        }
        if let Err(e) = self.runtime.detach_current_thread() {
            tracing::warn!(error = %e, "failed to detach thread from foreign runtime");
        }
    }
}
