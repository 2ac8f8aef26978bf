//! The module aggregate and its lifecycle.
//!
//! A module is the unit of discovery, dependency resolution, and loading. It
//! is materialized from a `plugin.xml` descriptor, registered with the
//! [`Runtime`], and driven through `start` → `initialize` → `uninitialize` →
//! `stop` by the profile.
//!
//! # Start algorithm
//!
//! `start` is a no-op for a started module and fails for a disabled one.
//! Otherwise it transitively starts every declared requirement (enabling it
//! first when needed), loads the native library when one is attached, and
//! constructs the plugin: the declared plugin class is instantiated through
//! the factory registry, or the empty-plugin sentinel is used when the module
//! declares none. A stopper is registered with the current profile *before*
//! the plugin starts and an initializer right after, so that stop and
//! uninitialize order naturally inverse start order, transitive starts
//! included.
//!
//! A requirement chain that loops back onto a module that is already starting
//! is detected through an in-flight flag and reported as a cycle.

use std::path::{Path, PathBuf};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use lattice_core::{
    EmptyPlugin, ExecutableFactory, FactoryRegistrar, ModuleRef, Plugin,
    REGISTER_MODULE_SYMBOL, RegisterModuleFn, RuntimeError, RuntimeResult, Version,
};

use crate::dl;
use crate::extension::Extension;
use crate::extension_point::ExtensionPoint;
use crate::profile::{Initializer, Stopper};
use crate::runtime::Runtime;

/// Rewrites the last `share` path segment to `lib`.
///
/// This is the single rule deriving a module's native library directory from
/// its resources directory.
pub(crate) fn rewrite_share_to_lib(path: &Path) -> PathBuf {
    let components: Vec<_> = path.components().collect();
    let Some(position) = components
        .iter()
        .rposition(|c| c.as_os_str() == "share")
    else {
        return path.to_path_buf();
    };

    let mut rewritten = PathBuf::new();
    for (index, component) in components.iter().enumerate() {
        if index == position {
            rewritten.push("lib");
        } else {
            rewritten.push(component);
        }
    }
    rewritten
}

/// A discovered module: identity, declared contributions, and lifecycle state.
pub struct Module {
    identifier: String,
    raw_identifier: String,
    version: Version,
    priority: i32,
    resources_location: PathBuf,
    library_location: PathBuf,
    plugin_class: String,
    library: Option<Mutex<dl::Library>>,
    requirements: RwLock<Vec<String>>,
    parameters: RwLock<HashMap<String, String>>,
    factories: RwLock<Vec<Arc<dyn ExecutableFactory>>>,
    extensions: RwLock<Vec<Arc<Extension>>>,
    extension_points: RwLock<Vec<Arc<ExtensionPoint>>>,
    plugin: Mutex<Option<Box<dyn Plugin>>>,
    enabled: AtomicBool,
    started: AtomicBool,
    initialized: AtomicBool,
    starting: AtomicBool,
}

impl Module {
    pub(crate) fn new(
        location: &Path,
        raw_identifier: impl Into<String>,
        version: Version,
        plugin_class: impl Into<String>,
        priority: i32,
    ) -> Module {
        let raw_identifier = raw_identifier.into();
        let identifier = Runtime::filter_id(&raw_identifier).to_string();
        Module {
            identifier,
            raw_identifier,
            version,
            priority,
            resources_location: location.to_path_buf(),
            library_location: rewrite_share_to_lib(location),
            plugin_class: plugin_class.into(),
            library: None,
            requirements: RwLock::new(Vec::new()),
            parameters: RwLock::new(HashMap::new()),
            factories: RwLock::new(Vec::new()),
            extensions: RwLock::new(Vec::new()),
            extension_points: RwLock::new(Vec::new()),
            plugin: Mutex::new(None),
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            starting: AtomicBool::new(false),
        }
    }

    /// Attaches the module's native library and points it at the library
    /// directory.
    pub(crate) fn set_library(&mut self, mut library: dl::Library) {
        library.set_search_path(&self.library_location);
        self.library = Some(Mutex::new(library));
    }

    // ─── Identity ────────────────────────────────────────────────────────────

    /// The module's unique identifier, normalized by stripping leading `:`
    /// characters.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The identifier as written in the descriptor, before normalization.
    pub fn raw_identifier(&self) -> &str {
        &self.raw_identifier
    }

    /// Absolute directory holding the descriptor and the module's data files.
    pub fn resources_location(&self) -> &Path {
        &self.resources_location
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn library_location(&self) -> &Path {
        &self.library_location
    }

    /// The factory type name of the module's plugin; empty when the module
    /// carries no plugin code.
    pub fn plugin_class(&self) -> &str {
        &self.plugin_class
    }

    // ─── Contributions ───────────────────────────────────────────────────────

    pub(crate) fn add_requirement(&self, requirement: impl Into<String>) {
        let requirement = requirement.into();
        let mut requirements = self.requirements.write();
        if !requirements.contains(&requirement) {
            requirements.push(requirement);
        }
    }

    /// Identifiers of the modules that must start before this one.
    pub fn requirements(&self) -> Vec<String> {
        self.requirements.read().clone()
    }

    pub(crate) fn add_extension(&self, extension: Arc<Extension>) {
        self.extensions.write().push(extension);
    }

    pub fn extensions(&self) -> Vec<Arc<Extension>> {
        self.extensions.read().clone()
    }

    pub fn has_extension(&self, identifier: &str) -> bool {
        self.extensions.read().iter().any(|e| e.identifier() == identifier)
    }

    /// Enables or disables one of this module's extensions; absent
    /// identifiers are ignored.
    pub fn set_enable_extension(&self, identifier: &str, enable: bool) {
        if let Some(extension) =
            self.extensions.read().iter().find(|e| e.identifier() == identifier)
        {
            extension.set_enable(enable);
        }
    }

    pub(crate) fn add_extension_point(&self, point: Arc<ExtensionPoint>) {
        self.extension_points.write().push(point);
    }

    pub fn extension_points(&self) -> Vec<Arc<ExtensionPoint>> {
        self.extension_points.read().clone()
    }

    pub fn has_extension_point(&self, identifier: &str) -> bool {
        self.extension_points.read().iter().any(|p| p.identifier() == identifier)
    }

    pub fn set_enable_extension_point(&self, identifier: &str, enable: bool) {
        if let Some(point) =
            self.extension_points.read().iter().find(|p| p.identifier() == identifier)
        {
            point.set_enable(enable);
        }
    }

    /// Adopts an executable factory, wiring its owning-module back-reference.
    pub fn add_executable_factory(self: &Arc<Self>, factory: Arc<dyn ExecutableFactory>) {
        let module_ref: Arc<dyn ModuleRef> = self.clone();
        let weak: Weak<dyn ModuleRef> = Arc::downgrade(&module_ref);
        factory.set_module(weak);
        self.factories.write().push(factory);
    }

    pub fn executable_factories(&self) -> Vec<Arc<dyn ExecutableFactory>> {
        self.factories.read().clone()
    }

    /// This module's factory for the given type, when it declares one.
    pub fn find_executable_factory(&self, type_name: &str) -> Option<Arc<dyn ExecutableFactory>> {
        self.factories.read().iter().find(|f| f.type_name() == type_name).cloned()
    }

    // ─── Parameters ──────────────────────────────────────────────────────────

    /// Sets a parameter, as profile activators do.
    pub fn add_parameter(&self, identifier: impl Into<String>, value: impl Into<String>) {
        self.parameters.write().insert(identifier.into(), value.into());
    }

    pub fn parameter_value(&self, identifier: &str) -> Option<String> {
        self.parameters.read().get(identifier).cloned()
    }

    pub fn has_parameter(&self, identifier: &str) -> bool {
        self.parameters.read().contains_key(identifier)
    }

    // ─── State flags ─────────────────────────────────────────────────────────

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enable(&self, enable: bool) {
        self.enabled.store(enable, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Starts the module: requirements first, then the native library, then
    /// the plugin. No-op when already started.
    pub fn start(self: &Arc<Self>, runtime: &Runtime) -> RuntimeResult<()> {
        if self.is_started() {
            return Ok(());
        }
        if !self.is_enabled() {
            return Err(RuntimeError::ModuleDisabled { module: self.identifier.clone() });
        }
        if self.starting.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::RequirementCycle { module: self.identifier.clone() });
        }

        let result = self.start_inner(runtime);
        self.starting.store(false, Ordering::SeqCst);
        result
    }

    fn start_inner(self: &Arc<Self>, runtime: &Runtime) -> RuntimeResult<()> {
        self.load_requirements(runtime)?;
        self.load_library(runtime)?;
        self.start_plugin(runtime)?;
        info!(module = %self.identifier, "Module started");
        Ok(())
    }

    fn load_requirements(self: &Arc<Self>, runtime: &Runtime) -> RuntimeResult<()> {
        let wrap = |source: RuntimeError| RuntimeError::RequirementLoad {
            module: self.identifier.clone(),
            source: Box::new(source),
        };

        for requirement in self.requirements() {
            let module = runtime.find_module(&requirement).ok_or_else(|| {
                wrap(RuntimeError::MissingRequirement {
                    module: self.identifier.clone(),
                    requirement: requirement.clone(),
                })
            })?;
            if !module.is_enabled() {
                module.set_enable(true);
            }
            if !module.is_started() {
                module.start(runtime).map_err(wrap)?;
            }
        }
        Ok(())
    }

    /// Loads the attached native library, if any, and lets it contribute
    /// executable factories through its registration symbol.
    fn load_library(self: &Arc<Self>, runtime: &Runtime) -> RuntimeResult<()> {
        let Some(library) = &self.library else {
            return Ok(());
        };

        let factories = {
            let mut library = library.lock();
            if library.is_loaded() {
                return Ok(());
            }
            library.load().map_err(|e| RuntimeError::LibraryLoad {
                module: self.identifier.clone(),
                detail: e.to_string(),
            })?;

            let mut registrar = FactoryRegistrar::new();
            // The registration symbol is optional; a library without it
            // contributes no factories.
            let register = unsafe { library.get::<RegisterModuleFn>(REGISTER_MODULE_SYMBOL) };
            if let Ok(register) = register {
                register(&mut registrar);
            }
            registrar.into_factories()
        };

        for factory in factories {
            self.add_executable_factory(Arc::clone(&factory));
            runtime.add_executable_factory(factory)?;
        }
        Ok(())
    }

    fn start_plugin(self: &Arc<Self>, runtime: &Runtime) -> RuntimeResult<()> {
        let mut plugin: Box<dyn Plugin> = if self.plugin_class.is_empty() {
            Box::new(EmptyPlugin::default())
        } else {
            let executable = runtime.create_executable_instance(&self.plugin_class)?;
            executable.into_plugin().map_err(|_| RuntimeError::ExecutableInstantiation {
                type_name: self.plugin_class.clone(),
                detail: "executable is not a plugin".into(),
            })?
        };
        let module_ref: Arc<dyn ModuleRef> = self.clone();
        let weak: Weak<dyn ModuleRef> = Arc::downgrade(&module_ref);
        plugin.set_module(weak);

        // The stopper is registered before the plugin runs so that stop order
        // inverses start order even across transitive starts.
        if let Some(profile) = runtime.current_profile() {
            profile.push_stopper(Stopper::new(&self.identifier, self.version));
        }

        {
            let mut slot = self.plugin.lock();
            let plugin = slot.insert(plugin);
            plugin.start().map_err(|e| RuntimeError::PluginStart {
                module: self.identifier.clone(),
                detail: e.to_string(),
            })?;
        }

        if let Some(profile) = runtime.current_profile() {
            profile.push_initializer(Initializer::new(&self.identifier, self.version));
        }

        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops the plugin and unregisters the module's contributions from the
    /// runtime. The module itself stays registered. No-op when not started.
    pub fn stop(self: &Arc<Self>, runtime: &Runtime) -> RuntimeResult<()> {
        if !self.is_started() {
            return Ok(());
        }
        if self.is_initialized() {
            return Err(RuntimeError::PluginStop {
                module: self.identifier.clone(),
                detail: "module is still initialized, uninitialize it first".into(),
            });
        }

        {
            let mut slot = self.plugin.lock();
            if let Some(plugin) = slot.as_mut() {
                plugin.stop().map_err(|e| RuntimeError::PluginStop {
                    module: self.identifier.clone(),
                    detail: e.to_string(),
                })?;
            }
            *slot = None;
        }
        self.started.store(false, Ordering::SeqCst);

        runtime.unregister_contributions(self);
        info!(module = %self.identifier, "Module stopped");
        Ok(())
    }

    /// Runs the plugin's post-start hook. Initializing twice is an error.
    pub fn initialize(&self) -> RuntimeResult<()> {
        if !self.is_started() {
            return Err(RuntimeError::PluginInit {
                module: self.identifier.clone(),
                detail: "module is not started".into(),
            });
        }
        if self.is_initialized() {
            return Err(RuntimeError::PluginInit {
                module: self.identifier.clone(),
                detail: "module is already initialized".into(),
            });
        }

        let mut slot = self.plugin.lock();
        if let Some(plugin) = slot.as_mut() {
            plugin.initialize().map_err(|e| RuntimeError::PluginInit {
                module: self.identifier.clone(),
                detail: e.to_string(),
            })?;
        }
        self.initialized.store(true, Ordering::SeqCst);
        debug!(module = %self.identifier, "Module initialized");
        Ok(())
    }

    /// Inverse of [`initialize`](Module::initialize).
    pub fn uninitialize(&self) -> RuntimeResult<()> {
        if !self.is_initialized() {
            return Err(RuntimeError::PluginInit {
                module: self.identifier.clone(),
                detail: "module is not initialized".into(),
            });
        }

        let mut slot = self.plugin.lock();
        if let Some(plugin) = slot.as_mut() {
            plugin.uninitialize().map_err(|e| RuntimeError::PluginInit {
                module: self.identifier.clone(),
                detail: e.to_string(),
            })?;
        }
        self.initialized.store(false, Ordering::SeqCst);
        debug!(module = %self.identifier, "Module uninitialized");
        Ok(())
    }

    /// Runs `f` with a symbol resolved from the module's loaded native
    /// library.
    ///
    /// The symbol only lives for the duration of the call, which keeps it
    /// from outliving the library handle.
    ///
    /// # Safety
    ///
    /// The caller must supply the symbol's true type `T`, as with
    /// [`dl::Library::get`].
    pub unsafe fn with_symbol<T, R>(
        &self,
        name: &[u8],
        f: impl FnOnce(libloading::Symbol<'_, T>) -> R,
    ) -> RuntimeResult<R> {
        let symbol_name = || String::from_utf8_lossy(name).into_owned();
        let Some(library) = &self.library else {
            return Err(RuntimeError::SymbolLookup {
                symbol: symbol_name(),
                detail: format!("module '{}' has no native library", self.identifier),
            });
        };
        let library = library.lock();
        let symbol = unsafe {
            library.get::<T>(name).map_err(|e| RuntimeError::SymbolLookup {
                symbol: symbol_name(),
                detail: e.to_string(),
            })?
        };
        Ok(f(symbol))
    }
}

impl ModuleRef for Module {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn resources_location(&self) -> &Path {
        &self.resources_location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_segment_is_rewritten_to_lib() {
        assert_eq!(
            rewrite_share_to_lib(Path::new("/opt/app/share/demo")),
            PathBuf::from("/opt/app/lib/demo")
        );
        // The last share segment wins.
        assert_eq!(
            rewrite_share_to_lib(Path::new("/share/app/share/demo")),
            PathBuf::from("/share/app/lib/demo")
        );
        // Paths without a share segment are left alone.
        assert_eq!(
            rewrite_share_to_lib(Path::new("/opt/app/data/demo")),
            PathBuf::from("/opt/app/data/demo")
        );
    }

    #[test]
    fn identifier_is_normalized_but_retained() {
        let module = Module::new(
            Path::new("/tmp/share/demo"),
            "::demo",
            Version::none(),
            "",
            0,
        );
        assert_eq!(module.identifier(), "demo");
        assert_eq!(module.raw_identifier(), "::demo");
    }

    #[test]
    fn requirements_are_deduplicated() {
        let module = Module::new(Path::new("/tmp/share/demo"), "demo", Version::none(), "", 0);
        module.add_requirement("base");
        module.add_requirement("base");
        module.add_requirement("io");
        assert_eq!(module.requirements(), ["base", "io"]);
    }

    #[test]
    fn parameters_round_trip() {
        let module = Module::new(Path::new("/tmp/share/demo"), "demo", Version::none(), "", 0);
        assert!(!module.has_parameter("theme"));
        module.add_parameter("theme", "dark");
        assert!(module.has_parameter("theme"));
        assert_eq!(module.parameter_value("theme").as_deref(), Some("dark"));
        assert_eq!(module.parameter_value("absent"), None);
    }
}
