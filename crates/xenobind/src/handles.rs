//! # Handle Registry
//!
//! Owns every foreign reference the bridge holds. The registry keeps an arena
//! of `HandleKey -> (RawRef, HandleKind)`; the rest of the crate only ever
//! holds [`Handle`]s naming a key.
//!
//! ## Invariants
//!
//! - Each key is released exactly once. Removal from the arena is the
//!   linearization point, so a release racing another release or a drop
//!   loses cleanly with [`Error::Identity`].
//! - Release is legal from any thread; the foreign runtime permits reference
//!   deletion without attachment.
//! - `wrap` never deduplicates. Two handles to one object are two keys, and
//!   only [`HandleRegistry::identity_equal`] can tell they name the same thing.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use xenoabi::ForeignRuntime;
use xenoabi::RawRef;

use crate::error::Error;
use crate::error::Result;

/// Opaque local identity of a foreign reference.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct HandleKey(pub u64);

impl std::fmt::Display for HandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Object,
    Class,
    /// A reflected method or constructor.
    Method,
    /// A reflected field.
    Field,
}

pub struct HandleRegistry {
    runtime: Arc<dyn ForeignRuntime>,
    slots: DashMap<HandleKey, (RawRef, HandleKind)>,
    next_key: AtomicU64,
}

impl HandleRegistry {
    pub fn new(runtime: Arc<dyn ForeignRuntime>) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            slots: DashMap::new(),
            next_key: AtomicU64::new(1),
        })
    }

    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.runtime
    }

    /// Takes ownership of a reference the runtime just returned.
    pub fn wrap(self: &Arc<Self>, raw: RawRef, kind: HandleKind) -> Handle {
        let key = HandleKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        self.slots.insert(key, (raw, kind));
        Handle {
            key,
            kind,
            registry: Arc::clone(self),
            armed: true,
        }
    }

    pub fn raw(&self, handle: &Handle) -> Result<RawRef> {
        self.slots.get(&handle.key).map(|slot| slot.0).ok_or(Error::Identity(handle.key))
    }

    /// Releases the foreign reference now instead of on drop.
    pub fn release(&self, mut handle: Handle) -> Result<()> {
        handle.armed = false;
        self.release_key(handle.key)
    }

    fn release_key(&self, key: HandleKey) -> Result<()> {
        let (_, (raw, kind)) = self.slots.remove(&key).ok_or(Error::Identity(key))?;
        self.runtime.delete_ref(raw).map_err(|e| {
            tracing::debug!(%key, %raw, ?kind, error = %e, "foreign reference release failed");
            Error::from(e)
        })
    }

    /// Whether two handles name the same foreign object, as the runtime sees it.
    pub fn identity_equal(&self, a: &Handle, b: &Handle) -> Result<bool> {
        let (a, b) = (self.raw(a)?, self.raw(b)?);
        Ok(self.runtime.is_same_object(a, b)?)
    }

    /// Number of live keys.
    pub fn live(&self) -> usize {
        self.slots.len()
    }

    fn retag(&self, key: HandleKey, kind: HandleKind) {
        if let Some(mut slot) = self.slots.get_mut(&key) {
            slot.1 = kind;
        }
    }
}

/// An owned foreign reference. Dropping it releases the reference.
pub struct Handle {
    key: HandleKey,
    kind: HandleKind,
    registry: Arc<HandleRegistry>,
    armed: bool,
}

impl Handle {
    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn raw(&self) -> Result<RawRef> {
        self.registry.raw(self)
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Records what the reference turned out to be once the runtime said so.
    pub(crate) fn retag(mut self, kind: HandleKind) -> Handle {
        self.registry.retag(self.key, kind);
        self.kind = kind;
        self
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({}, {:?})", self.key, self.kind)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.registry.release_key(self.key) {
                tracing::warn!(key = %self.key, error = %e, "failed to release foreign handle");
            }
        }
    }
}

/// Temporaries acquired during one operation, released together when the
/// scope drops, whichever way the operation exits.
pub struct Scope {
    registry: Arc<HandleRegistry>,
    handles: Vec<Handle>,
}

impl Scope {
    pub fn new(registry: &Arc<HandleRegistry>) -> Self {
        Self {
            registry: Arc::clone(registry),
            handles: Vec::new(),
        }
    }

    /// Wraps `raw` so it is released with the scope, and hands it back for use.
    pub fn adopt(&mut self, raw: RawRef, kind: HandleKind) -> RawRef {
        self.handles.push(self.registry.wrap(raw, kind));
        raw
    }

    pub fn adopt_all(&mut self, raws: Vec<RawRef>, kind: HandleKind) -> Vec<RawRef> {
        raws.into_iter().map(|raw| self.adopt(raw, kind)).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use xenoabi::ForeignRuntime;
    use xenovm::Vm;

    fn setup() -> (Arc<Vm>, Arc<HandleRegistry>, RawRef) {
        let vm = Arc::new(Vm::new().expect("vm"));
        let runtime: Arc<dyn ForeignRuntime> = vm.clone();
        let registry = HandleRegistry::new(runtime);
        let class = vm.find_class("java.lang.Object").expect("lookup").expect("class");
        (vm, registry, class)
    }

    #[test]
    fn test_drop_releases_once() {
        let (vm, registry, raw) = setup();
        let base = vm.live_refs();
        let handle = registry.wrap(raw, HandleKind::Class);
        assert_eq!(registry.live(), 1);
        assert_eq!(handle.raw().expect("raw"), raw);

        drop(handle);
        assert_eq!(registry.live(), 0);
        assert_eq!(vm.live_refs(), base - 1);
    }

    #[test]
    fn test_explicit_release_disarms_drop() {
        let (vm, registry, raw) = setup();
        let base = vm.live_refs();
        let handle = registry.wrap(raw, HandleKind::Class);
        registry.release(handle).expect("release");
        assert_eq!(registry.live(), 0);
        assert_eq!(vm.live_refs(), base - 1);
    }

    #[test]
    fn test_release_of_dead_key_is_identity_error() {
        let (_vm, registry, raw) = setup();
        let handle = registry.wrap(raw, HandleKind::Class);
        let key = handle.key();
        registry.release_key(key).expect("first release");

        let err = registry.raw(&handle).unwrap_err();
        match err {
            Error::Identity(k) => assert_eq!(k, key),
            _ => panic!("Expected Identity, got {:?}", err),
        }
        let err = registry.release(handle).unwrap_err();
        assert!(matches!(err, Error::Identity(_)), "got {:?}", err);
    }

    #[test]
    fn test_double_wrap_is_two_keys_one_object() {
        let (vm, registry, raw) = setup();
        let copy = vm.new_ref(raw).expect("new_ref");
        let a = registry.wrap(raw, HandleKind::Class);
        let b = registry.wrap(copy, HandleKind::Class);
        assert_ne!(a.key(), b.key());
        assert!(registry.identity_equal(&a, &b).expect("identity"));

        let string = vm.find_class("java.lang.String").expect("lookup").expect("class");
        let c = registry.wrap(string, HandleKind::Class);
        assert!(!registry.identity_equal(&a, &c).expect("identity"));
    }

    #[test]
    fn test_scope_releases_everything() {
        let (vm, registry, raw) = setup();
        let base = vm.live_refs();
        {
            let mut scope = Scope::new(&registry);
            let methods = vm.declared_methods(raw).expect("methods");
            let count = methods.len();
            scope.adopt_all(methods, HandleKind::Method);
            assert_eq!(scope.len(), count);
            assert_eq!(vm.live_refs(), base + count);
        }
        assert_eq!(registry.live(), 0);
        assert_eq!(vm.live_refs(), base);
    }

    #[test]
    fn test_release_from_another_thread() {
        let (vm, registry, raw) = setup();
        let base = vm.live_refs();
        let handle = registry.wrap(raw, HandleKind::Class);
        std::thread::spawn(move || drop(handle)).join().expect("thread");
        assert_eq!(vm.live_refs(), base - 1);
    }
}
