//! The application profile: the ordered lifecycle of a module set.
//!
//! A [`Profile`] is authored as an XML file (see
//! [`profile_reader`](crate::io::profile_reader)) naming the modules to
//! activate and start. Running one goes through three phases:
//!
//! 1. [`start`](Profile::start): applies every [`Activator`] in order,
//!    validates every enabled extension of every enabled module, then applies
//!    every [`Starter`] in order. Each module start pushes a [`Stopper`] and an
//!    [`Initializer`], so the dynamic lists mirror the real start order,
//!    transitive starts included.
//! 2. [`run`](Profile::run): invokes the host-supplied callback, or the
//!    default which runs [`setup`](Profile::setup) then
//!    [`cleanup`](Profile::cleanup) and returns `0`. The result is the
//!    process exit code.
//! 3. [`stop`](Profile::stop): applies the accumulated stoppers in reverse
//!    push order, so for `A depends on B`, `B` starts first and stops last.

mod actions;

pub use actions::{Activator, Initializer, Starter, Stopper, Uninitializer};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::error;

use lattice_core::{RuntimeError, RuntimeResult, Version};

use crate::extension::Validity;
use crate::runtime::Runtime;

/// Signature of a host-supplied [`Profile::run`] callback.
pub type RunCallback = Box<dyn Fn(&Runtime, &Profile) -> i32 + Send + Sync>;

/// An ordered sequence of lifecycle actions driving the runtime.
#[derive(Default)]
pub struct Profile {
    name: RwLock<String>,
    version: RwLock<Version>,
    file_path: RwLock<PathBuf>,
    check_single_instance: AtomicBool,
    activators: RwLock<Vec<Activator>>,
    starters: RwLock<Vec<Starter>>,
    initializers: RwLock<Vec<Initializer>>,
    stoppers: RwLock<Vec<Stopper>>,
    uninitializers: RwLock<Vec<Uninitializer>>,
    run_callback: RwLock<Option<RunCallback>>,
}

impl Profile {
    /// Creates an empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Metadata ────────────────────────────────────────────────────────────

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn version(&self) -> Version {
        *self.version.read()
    }

    pub fn set_version(&self, version: Version) {
        *self.version.write() = version;
    }

    pub fn file_path(&self) -> PathBuf {
        self.file_path.read().clone()
    }

    pub fn set_file_path(&self, path: impl Into<PathBuf>) {
        *self.file_path.write() = path.into();
    }

    /// Whether the host should refuse to run a second instance.
    ///
    /// Stored and surfaced; enforcement is host policy.
    pub fn check_single_instance(&self) -> bool {
        self.check_single_instance.load(Ordering::SeqCst)
    }

    pub fn set_check_single_instance(&self, check: bool) {
        self.check_single_instance.store(check, Ordering::SeqCst);
    }

    // ─── Action registration ─────────────────────────────────────────────────

    pub fn add_activator(&self, activator: Activator) {
        self.activators.write().push(activator);
    }

    pub fn add_starter(&self, starter: Starter) {
        self.starters.write().push(starter);
    }

    /// Pushed by every module start; drained in reverse by
    /// [`stop`](Profile::stop).
    pub fn push_stopper(&self, stopper: Stopper) {
        self.stoppers.write().push(stopper);
    }

    /// Pushed after every plugin start; drained in order by
    /// [`setup`](Profile::setup).
    pub fn push_initializer(&self, initializer: Initializer) {
        self.initializers.write().push(initializer);
    }

    /// Pushed by every module initialization; drained in reverse by
    /// [`cleanup`](Profile::cleanup).
    pub fn push_uninitializer(&self, uninitializer: Uninitializer) {
        self.uninitializers.write().push(uninitializer);
    }

    /// Replaces the default [`run`](Profile::run) behavior.
    pub fn set_run_callback(&self, callback: RunCallback) {
        *self.run_callback.write() = Some(callback);
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Activates, validates, and starts the configured module set.
    ///
    /// The profile installs itself as the runtime's current profile so that
    /// transitive module starts register their stoppers and initializers
    /// here. Any extension of an enabled module that fails validation aborts
    /// the start with [`RuntimeError::InvalidExtension`].
    pub fn start(self: &Arc<Self>, runtime: &Runtime) -> RuntimeResult<()> {
        runtime.set_current_profile(Some(Arc::clone(self)));

        for activator in self.activators.read().iter() {
            activator.apply(runtime)?;
        }

        for extension in runtime.extensions() {
            let Some(module) = extension.module() else {
                continue;
            };
            if !module.is_enabled() || !extension.is_enabled() {
                continue;
            }
            if extension.validate(runtime)? == Validity::Invalid {
                return Err(RuntimeError::InvalidExtension {
                    module: module.identifier().to_string(),
                    extension: extension.identifier().to_string(),
                    log: extension.validation_log(),
                });
            }
        }

        for starter in self.starters.read().iter() {
            starter.apply(runtime)?;
        }
        Ok(())
    }

    /// Runs the application and returns the process exit code.
    pub fn run(&self, runtime: &Runtime) -> i32 {
        let callback = self.run_callback.read();
        match callback.as_ref() {
            Some(callback) => callback(runtime, self),
            None => self.default_run(runtime),
        }
    }

    fn default_run(&self, runtime: &Runtime) -> i32 {
        if let Err(e) = self.setup(runtime) {
            error!(error = %e, "Profile setup failed");
            return 1;
        }
        self.cleanup(runtime);
        0
    }

    /// Initializes every started module, in start order.
    ///
    /// Initialization may start further modules, which enqueue more
    /// initializers; the drain loops until the queue is empty.
    pub fn setup(&self, runtime: &Runtime) -> RuntimeResult<()> {
        loop {
            let batch = std::mem::take(&mut *self.initializers.write());
            if batch.is_empty() {
                return Ok(());
            }
            for initializer in batch {
                initializer.apply(runtime)?;
            }
        }
    }

    /// Uninitializes modules in reverse initialization order.
    pub fn cleanup(&self, runtime: &Runtime) {
        loop {
            let Some(uninitializer) = self.uninitializers.write().pop() else {
                return;
            };
            uninitializer.apply(runtime);
        }
    }

    /// Stops modules in reverse start order and releases the current-profile
    /// slot.
    pub fn stop(&self, runtime: &Runtime) {
        loop {
            let Some(stopper) = self.stoppers.write().pop() else {
                break;
            };
            stopper.apply(runtime);
        }
        runtime.set_current_profile(None);
    }
}

/// Loads a profile file and installs it as the runtime's current profile.
///
/// Convenience for hosts: combines
/// [`profile_reader::create_profile`](crate::io::profile_reader::create_profile)
/// with the current-profile bookkeeping that [`Profile::start`] performs
/// anyway.
pub fn load_profile(runtime: &Runtime, path: &Path) -> RuntimeResult<Arc<Profile>> {
    let profile = crate::io::profile_reader::create_profile(path)?;
    runtime.set_current_profile(Some(Arc::clone(&profile)));
    Ok(profile)
}
