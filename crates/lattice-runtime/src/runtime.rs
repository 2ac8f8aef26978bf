//! The process-wide module registry.
//!
//! A [`Runtime`] owns the four registries (modules, executable factories,
//! extensions, extension points) and enforces identifier uniqueness at
//! registration time. It is an explicit value threaded into the APIs that
//! need it; [`Runtime::global`] provides the process-wide instance for hosts
//! that want the classic singleton shape.
//!
//! Lifecycle operations (discovery, start, stop) are driven from one thread;
//! the internal locks only keep concurrent `find_*` readers consistent.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tracing::debug;

use lattice_core::{
    ConfigElement, Executable, ExecutableFactory, ModuleRef, RuntimeError, RuntimeResult,
};

use crate::extension::Extension;
use crate::extension_point::ExtensionPoint;
use crate::io::descriptor_reader;
use crate::module::{Module, rewrite_share_to_lib};
use crate::profile::Profile;

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

/// Registries and discovery entry points for one application.
#[derive(Default)]
pub struct Runtime {
    modules: RwLock<Vec<Arc<Module>>>,
    factories: RwLock<Vec<Arc<dyn ExecutableFactory>>>,
    extensions: RwLock<Vec<Arc<Extension>>>,
    extension_points: RwLock<Vec<Arc<ExtensionPoint>>>,
    /// `(library directory, resources directory)` pairs already discovered.
    repositories: RwLock<Vec<(PathBuf, PathBuf)>>,
    current_profile: RwLock<Option<Arc<Profile>>>,
}

impl Runtime {
    /// Creates an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide runtime instance.
    pub fn global() -> &'static Runtime {
        GLOBAL.get_or_init(Runtime::new)
    }

    /// Normalizes an identifier by stripping leading `:` characters.
    pub fn filter_id(identifier: &str) -> &str {
        identifier.trim_start_matches(':')
    }

    // ─── Discovery ───────────────────────────────────────────────────────────

    /// Discovers and registers every module found under `repository`.
    ///
    /// A repository (or its lib-equivalent) that was already added is skipped
    /// silently; duplicate module identifiers inside the repository are
    /// skipped by the reader.
    pub fn add_modules(&self, repository: &Path) -> RuntimeResult<()> {
        let resources = repository
            .canonicalize()
            .unwrap_or_else(|_| repository.to_path_buf());
        let library = rewrite_share_to_lib(&resources);

        {
            let repositories = self.repositories.read();
            if repositories
                .iter()
                .any(|(lib, res)| *res == resources || *lib == library)
            {
                debug!(repository = %resources.display(), "Repository already added, skipping");
                return Ok(());
            }
        }

        let modules = descriptor_reader::create_modules(&resources, self)?;
        for module in modules {
            self.register_module(module)?;
        }
        self.repositories.write().push((library, resources));
        Ok(())
    }

    /// Registers a module and cross-registers its factories, extensions, and
    /// extension points.
    ///
    /// Duplicate identifiers in any of the registries are programming errors
    /// and raise [`RuntimeError::DuplicateIdentifier`].
    pub fn register_module(&self, module: Arc<Module>) -> RuntimeResult<()> {
        if self.find_module(module.identifier()).is_some() {
            return Err(RuntimeError::DuplicateIdentifier {
                kind: "module",
                identifier: module.identifier().to_string(),
            });
        }

        for extension in module.extensions() {
            self.add_extension(extension)?;
        }
        for point in module.extension_points() {
            self.add_extension_point(point)?;
        }
        for factory in module.executable_factories() {
            self.add_executable_factory(factory)?;
        }

        debug!(module = %module.identifier(), "Module registered");
        self.modules.write().push(module);
        Ok(())
    }

    /// Removes a stopped module's factories, extensions, and extension points
    /// from the registries. The module itself stays registered.
    pub(crate) fn unregister_contributions(&self, module: &Arc<Module>) {
        {
            let own = module.executable_factories();
            self.factories
                .write()
                .retain(|f| !own.iter().any(|o| Arc::ptr_eq(o, f)));
        }
        {
            let own = module.extensions();
            self.extensions
                .write()
                .retain(|e| !own.iter().any(|o| Arc::ptr_eq(o, e)));
        }
        {
            let own = module.extension_points();
            self.extension_points
                .write()
                .retain(|p| !own.iter().any(|o| Arc::ptr_eq(o, p)));
        }
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers an executable factory, enforcing type-name uniqueness among
    /// enabled factories.
    pub fn add_executable_factory(
        &self,
        factory: Arc<dyn ExecutableFactory>,
    ) -> RuntimeResult<()> {
        if factory.is_enabled() && self.find_executable_factory(factory.type_name()).is_some() {
            return Err(RuntimeError::DuplicateIdentifier {
                kind: "executable factory",
                identifier: factory.type_name().to_string(),
            });
        }
        self.factories.write().push(factory);
        Ok(())
    }

    fn add_extension(&self, extension: Arc<Extension>) -> RuntimeResult<()> {
        let identifier = Self::filter_id(extension.identifier());
        if !identifier.is_empty() && self.find_extension(identifier).is_some() {
            return Err(RuntimeError::DuplicateIdentifier {
                kind: "extension",
                identifier: identifier.to_string(),
            });
        }
        self.extensions.write().push(extension);
        Ok(())
    }

    fn add_extension_point(&self, point: Arc<ExtensionPoint>) -> RuntimeResult<()> {
        let identifier = Self::filter_id(point.identifier());
        if self.find_extension_point(identifier).is_some() {
            return Err(RuntimeError::DuplicateIdentifier {
                kind: "extension point",
                identifier: identifier.to_string(),
            });
        }
        self.extension_points.write().push(point);
        Ok(())
    }

    // ─── Lookups ─────────────────────────────────────────────────────────────

    /// The registered module with the given identifier, if any.
    pub fn find_module(&self, identifier: &str) -> Option<Arc<Module>> {
        let identifier = Self::filter_id(identifier);
        self.modules
            .read()
            .iter()
            .find(|m| m.identifier() == identifier)
            .cloned()
    }

    /// Like [`find_module`](Runtime::find_module), but only yields enabled
    /// modules.
    pub fn find_enabled_module(&self, identifier: &str) -> Option<Arc<Module>> {
        self.find_module(identifier).filter(|m| m.is_enabled())
    }

    /// The first enabled extension with the given identifier.
    pub fn find_extension(&self, identifier: &str) -> Option<Arc<Extension>> {
        let identifier = Self::filter_id(identifier);
        self.extensions
            .read()
            .iter()
            .find(|e| e.identifier() == identifier && e.is_enabled())
            .cloned()
    }

    /// The first enabled extension point with the given identifier.
    pub fn find_extension_point(&self, identifier: &str) -> Option<Arc<ExtensionPoint>> {
        let identifier = Self::filter_id(identifier);
        self.extension_points
            .read()
            .iter()
            .find(|p| p.identifier() == identifier && p.is_enabled())
            .cloned()
    }

    /// The first enabled factory producing the given type.
    pub fn find_executable_factory(&self, type_name: &str) -> Option<Arc<dyn ExecutableFactory>> {
        let type_name = Self::filter_id(type_name);
        self.factories
            .read()
            .iter()
            .find(|f| f.type_name() == type_name && f.is_enabled())
            .cloned()
    }

    /// Snapshot of every registered module.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.modules.read().clone()
    }

    /// Snapshot of every registered extension, in registration order.
    pub fn extensions(&self) -> Vec<Arc<Extension>> {
        self.extensions.read().clone()
    }

    // ─── Executable creation ─────────────────────────────────────────────────

    /// Instantiates an executable of the given type through its registered
    /// factory and wires its owning-module back-reference.
    pub fn create_executable_instance(&self, type_name: &str) -> RuntimeResult<Box<dyn Executable>> {
        let factory = self.find_executable_factory(type_name).ok_or_else(|| {
            RuntimeError::ExecutableFactoryMissing { type_name: type_name.to_string() }
        })?;
        self.instantiate(&factory, type_name)
    }

    /// Instantiates an executable for a configuration element.
    ///
    /// When no factory is registered for the type, the configuration's owning
    /// module is started first (which registers its factories) and the lookup
    /// retried once. The factory's owning module is started before creation,
    /// and the executable receives the configuration as initialization data.
    pub fn create_executable_instance_with_config(
        &self,
        type_name: &str,
        config: &Arc<ConfigElement>,
    ) -> RuntimeResult<Box<dyn Executable>> {
        let mut factory = self.find_executable_factory(type_name);
        if factory.is_none() {
            if let Some(owner) = config.module().and_then(|m| downcast_module(&m)) {
                owner.start(self)?;
                factory = self.find_executable_factory(type_name);
            }
        }
        let factory = factory.ok_or_else(|| RuntimeError::ExecutableFactoryMissing {
            type_name: type_name.to_string(),
        })?;

        if let Some(owner) = factory.module().and_then(|m| downcast_module(&m)) {
            owner.start(self)?;
        }

        let mut executable = self.instantiate(&factory, type_name)?;
        executable.set_initialization_data(Arc::clone(config));
        Ok(executable)
    }

    fn instantiate(
        &self,
        factory: &Arc<dyn ExecutableFactory>,
        type_name: &str,
    ) -> RuntimeResult<Box<dyn Executable>> {
        let mut executable =
            factory.create().map_err(|e| RuntimeError::ExecutableInstantiation {
                type_name: type_name.to_string(),
                detail: e.to_string(),
            })?;
        if let Some(module) = factory.module() {
            let weak: Weak<dyn ModuleRef> = Arc::downgrade(&module);
            executable.set_module(weak);
        }
        Ok(executable)
    }

    // ─── Current profile ─────────────────────────────────────────────────────

    /// The profile currently driving the lifecycle, when one is running.
    pub fn current_profile(&self) -> Option<Arc<Profile>> {
        self.current_profile.read().clone()
    }

    pub(crate) fn set_current_profile(&self, profile: Option<Arc<Profile>>) {
        *self.current_profile.write() = profile;
    }
}

/// Recovers the concrete module behind a foundation-layer back-reference.
pub(crate) fn downcast_module(module: &Arc<dyn ModuleRef>) -> Option<Arc<Module>> {
    let any: Arc<dyn std::any::Any + Send + Sync> = Arc::clone(module) as Arc<dyn std::any::Any + Send + Sync>;
    any.downcast::<Module>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use lattice_core::{GenericExecutableFactory, Plugin, Version};

    use crate::extension::Extension;
    use crate::extension_point::ExtensionPoint;

    fn plain_module(runtime: &Runtime, identifier: &str) -> Arc<Module> {
        let location = std::env::temp_dir().join("lattice-runtime-tests").join(identifier);
        let module = Arc::new(Module::new(&location, identifier, Version::none(), "", 0));
        runtime.register_module(Arc::clone(&module)).unwrap();
        module
    }

    #[test]
    fn duplicate_module_identifier_raises() {
        let runtime = Runtime::new();
        plain_module(&runtime, "demo");
        let location = std::env::temp_dir().join("lattice-runtime-tests").join("demo2");
        let clone = Arc::new(Module::new(&location, "demo", Version::none(), "", 0));
        let result = runtime.register_module(clone);
        assert!(matches!(result, Err(RuntimeError::DuplicateIdentifier { kind: "module", .. })));
    }

    #[test]
    fn duplicate_factory_type_raises() {
        let runtime = Runtime::new();
        runtime
            .add_executable_factory(Arc::new(
                GenericExecutableFactory::<lattice_core::EmptyPlugin>::new("demo::Plugin"),
            ))
            .unwrap();
        let result = runtime.add_executable_factory(Arc::new(
            GenericExecutableFactory::<lattice_core::EmptyPlugin>::new("demo::Plugin"),
        ));
        assert!(matches!(
            result,
            Err(RuntimeError::DuplicateIdentifier { kind: "executable factory", .. })
        ));
    }

    #[test]
    fn duplicate_extension_point_identifier_raises() {
        let runtime = Runtime::new();
        let first = plain_module(&runtime, "first");
        first.add_extension_point(ExtensionPoint::new(&first, "shared.point", None));
        // Points added after registration reach the registry on re-registration
        // of another module carrying the same id.
        runtime
            .add_extension_point(first.extension_points()[0].clone())
            .unwrap();

        let location = std::env::temp_dir().join("lattice-runtime-tests").join("second");
        let second = Arc::new(Module::new(&location, "second", Version::none(), "", 0));
        second.add_extension_point(ExtensionPoint::new(&second, "shared.point", None));
        let result = runtime.register_module(second);
        assert!(matches!(
            result,
            Err(RuntimeError::DuplicateIdentifier { kind: "extension point", .. })
        ));
    }

    #[test]
    fn find_enabled_module_filters_disabled_modules() {
        let runtime = Runtime::new();
        let module = plain_module(&runtime, "demo");
        assert!(runtime.find_enabled_module("demo").is_some());
        module.set_enable(false);
        assert!(runtime.find_enabled_module("demo").is_none());
        assert!(runtime.find_module("demo").is_some());
    }

    #[test]
    fn lookups_filter_leading_colons() {
        let runtime = Runtime::new();
        plain_module(&runtime, "viz::scene");
        assert!(runtime.find_module("::viz::scene").is_some());
    }

    #[test]
    fn disabled_extension_is_not_found() {
        let runtime = Runtime::new();
        let location = std::env::temp_dir().join("lattice-runtime-tests").join("ext");
        let module = Arc::new(Module::new(&location, "ext", Version::none(), "", 0));
        module.add_extension(Extension::new(
            &module,
            "ext.contribution",
            "some.point",
            "<extension implements=\"some.point\"/>".into(),
            ConfigElement::new("extension"),
        ));
        runtime.register_module(Arc::clone(&module)).unwrap();

        assert!(runtime.find_extension("ext.contribution").is_some());
        module.set_enable_extension("ext.contribution", false);
        assert!(runtime.find_extension("ext.contribution").is_none());
    }

    #[test]
    fn repository_is_added_only_once() {
        let repo = tempfile::tempdir().unwrap();
        let dir = repo.path().join("mod");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("plugin.xml"), r#"<plugin id="mod"/>"#).unwrap();

        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();
        // A second pass over the same repository is skipped, not an error.
        runtime.add_modules(repo.path()).unwrap();
        assert_eq!(runtime.modules().len(), 1);
    }

    #[test]
    fn created_executable_carries_the_owning_module() {
        let runtime = Runtime::new();
        let module = plain_module(&runtime, "owner");
        let factory =
            Arc::new(GenericExecutableFactory::<lattice_core::EmptyPlugin>::new("owner::Plugin"));
        let factory_concrete = Arc::clone(&factory);
        let factory_ref: Arc<dyn ExecutableFactory> = factory_concrete;
        module.add_executable_factory(factory_ref);
        let factory_ref: Arc<dyn ExecutableFactory> = factory;
        runtime.add_executable_factory(factory_ref).unwrap();

        let executable = runtime.create_executable_instance("owner::Plugin").unwrap();
        let owner = executable.module().expect("owning module should be set");
        assert_eq!(owner.identifier(), "owner");

        let mut plugin = executable
            .into_plugin()
            .unwrap_or_else(|_| panic!("EmptyPlugin converts"));
        assert!(plugin.start().is_ok());
    }

    #[test]
    fn extension_point_collects_valid_contributions() {
        let runtime = Runtime::new();
        let host = plain_module(&runtime, "host");
        let point = ExtensionPoint::new(&host, "host.widgets", None);
        host.add_extension_point(Arc::clone(&point));
        runtime.add_extension_point(Arc::clone(&point)).unwrap();

        let location = std::env::temp_dir().join("lattice-runtime-tests").join("contrib");
        let contributor = Arc::new(Module::new(&location, "contrib", Version::none(), "", 0));
        let config = ConfigElement::new("extension");
        config.add_child(ConfigElement::new("widget"));
        config.add_child(ConfigElement::new("widget"));
        contributor.add_extension(Extension::new(
            &contributor,
            "contrib.widgets",
            "host.widgets",
            "<extension implements=\"host.widgets\"><widget/><widget/></extension>".into(),
            config,
        ));
        runtime.register_module(Arc::clone(&contributor)).unwrap();

        let extensions = point.all_extensions(&runtime);
        assert_eq!(extensions.len(), 1);
        let elements = point.all_config_elements(&runtime);
        assert_eq!(elements.len(), 2);
        assert!(elements.iter().all(|e| e.name() == "widget"));
    }
}
