//! Lazily constructed process-wide lifecycle hooks.
//!
//! [`LifecycleGuard`] builds a shared object at most once no matter how many
//! worker threads race for it. The process-wide instance holds a
//! [`Lifecycle`]: callbacks run around a worker's whole run, each poll cycle
//! and each job.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Double-checked, resettable lazy singleton.
pub struct LifecycleGuard<T> {
    constructed: AtomicBool,
    cache: RwLock<Option<Arc<T>>>,
    init: Mutex<()>,
}

impl<T> Default for LifecycleGuard<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LifecycleGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("constructed", &self.constructed.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> LifecycleGuard<T> {
    pub fn new() -> Self {
        Self {
            constructed: AtomicBool::new(false),
            cache: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// The cached object, building it with `factory` if absent.
    ///
    /// `factory` runs at most once between two [`reset`](Self::reset) calls.
    pub fn instance(&self, factory: impl FnOnce() -> T) -> Arc<T> {
        if let Some(cached) = self.try_instance() {
            return cached;
        }

        let _init = self.init.lock();
        if let Some(cached) = self.cache.read().clone() {
            return cached;
        }
        let built = Arc::new(factory());
        *self.cache.write() = Some(Arc::clone(&built));
        self.constructed.store(true, Ordering::Release);
        built
    }

    /// The cached object, without building it.
    pub fn try_instance(&self) -> Option<Arc<T>> {
        if !self.constructed.load(Ordering::Acquire) {
            return None;
        }
        self.cache.read().clone()
    }

    /// Whether an object is cached.
    pub fn is_constructed(&self) -> bool {
        self.constructed.load(Ordering::Acquire)
    }

    /// Drop the cached object; the next [`instance`](Self::instance) rebuilds.
    pub fn reset(&self) {
        let _init = self.init.lock();
        self.constructed.store(false, Ordering::Release);
        self.cache.write().take();
    }
}

impl<T: Default> LifecycleGuard<T> {
    /// [`instance`](Self::instance) with `T::default` as the factory.
    pub fn get(&self) -> Arc<T> {
        self.instance(T::default)
    }
}

/// Points in a worker's life that callbacks can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The worker's whole run.
    Execute,
    /// One poll cycle.
    Loop,
    /// One job.
    Perform,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Execute => "execute",
            Self::Loop => "loop",
            Self::Perform => "perform",
        };
        f.write_str(name)
    }
}

/// Callback receiving the worker's name.
pub type Hook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default, Clone)]
struct Hooks {
    before: Vec<Hook>,
    after: Vec<Hook>,
}

/// Before/after callbacks per [`LifecycleEvent`].
#[derive(Default)]
pub struct Lifecycle {
    hooks: RwLock<HashMap<LifecycleEvent, Hooks>>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read();
        let mut out = f.debug_struct("Lifecycle");
        for (event, h) in hooks.iter() {
            out.field(&event.to_string(), &(h.before.len(), h.after.len()));
        }
        out.finish()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` before every `event`.
    pub fn before(&self, event: LifecycleEvent, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.hooks.write().entry(event).or_default().before.push(Arc::new(hook));
    }

    /// Run `hook` after every `event`.
    pub fn after(&self, event: LifecycleEvent, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.hooks.write().entry(event).or_default().after.push(Arc::new(hook));
    }

    /// Run `f` wrapped in the callbacks registered for `event`.
    ///
    /// Callbacks are snapshotted first, so a callback may register others
    /// without deadlocking; those take effect on the next run.
    pub fn run<R>(&self, event: LifecycleEvent, worker: &str, f: impl FnOnce() -> R) -> R {
        let hooks = self.hooks.read().get(&event).cloned().unwrap_or_default();
        for hook in &hooks.before {
            hook(worker);
        }
        let result = f();
        for hook in &hooks.after {
            hook(worker);
        }
        result
    }

    /// Remove every callback.
    pub fn clear(&self) {
        self.hooks.write().clear();
    }
}

static GLOBAL: LazyLock<LifecycleGuard<Lifecycle>> = LazyLock::new(LifecycleGuard::new);

/// The process-wide lifecycle, built on first use.
pub fn global() -> Arc<Lifecycle> {
    GLOBAL.instance(|| {
        debug!("initializing worker lifecycle");
        Lifecycle::new()
    })
}

/// Discard the process-wide lifecycle and its callbacks.
pub fn reset_global() {
    GLOBAL.reset();
}
