//! Before-run / after-run lifecycle hooks.
//!
//! Registering a hook hands back a [`HookRegistration`]; the hook stays
//! registered exactly as long as that guard lives, whichever way the owning
//! scope is left. Firing works on a snapshot of the list, so a hook may drop
//! its own registration (or register new hooks) while being called.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::action::ActionDescriptor;

type HookFn = dyn Fn(&ActionDescriptor) -> anyhow::Result<()> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    BeforeRun,
    AfterRun,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::BeforeRun => f.write_str("before-run"),
            HookPhase::AfterRun => f.write_str("after-run"),
        }
    }
}

/// A hook that returned an error or panicked. Reported next to the action
/// outcome, never folded into it.
#[derive(Debug, Clone, PartialEq)]
pub struct HookFailure {
    pub phase: HookPhase,
    pub error: String,
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hook failed: {}", self.phase, self.error)
    }
}

#[derive(Default)]
struct HookList {
    entries: Mutex<Vec<(u64, Arc<HookFn>)>>,
}

impl HookList {
    fn remove(&self, id: u64) {
        self.entries.lock().retain(|(entry_id, _)| *entry_id != id);
    }

    fn snapshot(&self) -> Vec<Arc<HookFn>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect()
    }
}

/// The two ordered hook lists. Cloning shares the same lists.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    before_run: Arc<HookList>,
    after_run: Arc<HookList>,
    next_id: Arc<AtomicU64>,
}

static GLOBAL: OnceLock<LifecycleHooks> = OnceLock::new();

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide hook lists, for instrumentation that cannot be handed an
    /// explicit instance.
    pub fn global() -> &'static LifecycleHooks {
        GLOBAL.get_or_init(LifecycleHooks::new)
    }

    pub fn before_run<F>(&self, hook: F) -> HookRegistration
    where
        F: Fn(&ActionDescriptor) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(HookPhase::BeforeRun, Arc::new(hook))
    }

    pub fn after_run<F>(&self, hook: F) -> HookRegistration
    where
        F: Fn(&ActionDescriptor) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(HookPhase::AfterRun, Arc::new(hook))
    }

    fn list(&self, phase: HookPhase) -> &Arc<HookList> {
        match phase {
            HookPhase::BeforeRun => &self.before_run,
            HookPhase::AfterRun => &self.after_run,
        }
    }

    fn register(&self, phase: HookPhase, hook: Arc<HookFn>) -> HookRegistration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let list = self.list(phase);
        list.entries.lock().push((id, hook));
        debug!("Registered {phase} hook #{id}");
        HookRegistration {
            list: Arc::downgrade(list),
            id,
            phase,
        }
    }

    /// Number of hooks currently registered for `phase`.
    pub fn len(&self, phase: HookPhase) -> usize {
        self.list(phase).entries.lock().len()
    }

    /// Calls every hook of `phase` in registration order.
    pub(crate) fn fire(&self, phase: HookPhase, descriptor: &ActionDescriptor) -> Vec<HookFailure> {
        let mut failures = Vec::new();
        for hook in self.list(phase).snapshot() {
            let error = match catch_unwind(AssertUnwindSafe(|| hook(descriptor))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => format!("hook panicked: {}", panic_message(panic.as_ref())),
            };
            warn!("{phase} hook failed for '{}': {error}", descriptor.name());
            failures.push(HookFailure { phase, error });
        }
        failures
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("before_run", &self.len(HookPhase::BeforeRun))
            .field("after_run", &self.len(HookPhase::AfterRun))
            .finish()
    }
}

/// Keeps a hook registered; dropping it unregisters the hook.
#[must_use = "the hook is unregistered as soon as the registration is dropped"]
pub struct HookRegistration {
    list: Weak<HookList>,
    id: u64,
    phase: HookPhase,
}

impl HookRegistration {
    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    /// Unregisters now instead of at the end of the scope.
    pub fn unregister(self) {}
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
            debug!("Unregistered {} hook #{}", self.phase, self.id);
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
