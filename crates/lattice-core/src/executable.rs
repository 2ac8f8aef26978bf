//! Executables, plugins, and their factories.
//!
//! An [`Executable`] is a polymorphic object a module declares and the runtime
//! instantiates by type name through a registered [`ExecutableFactory`]. A
//! [`Plugin`] is the specialization that serves as a module's entry point and
//! receives the lifecycle callbacks.
//!
//! The capability set is closed: executables know their owning module and can
//! receive initialization data; plugins additionally start, stop, initialize,
//! and uninitialize. Conversion from an executable to a plugin goes through
//! [`Executable::into_plugin`] rather than open-ended downcasting.

use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::config::ConfigElement;
use crate::module_ref::ModuleRef;

/// Boxed error type carried by plugin and factory callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for plugin lifecycle callbacks.
pub type PluginResult<T> = Result<T, BoxError>;

// ─── Executable ───────────────────────────────────────────────────────────────

/// An instance produced on demand by an [`ExecutableFactory`].
pub trait Executable: Any + Send + Sync {
    /// The module this instance belongs to, if it is still alive.
    fn module(&self) -> Option<Arc<dyn ModuleRef>>;

    /// Attaches the owning-module back-reference. Called by the runtime right
    /// after construction.
    fn set_module(&mut self, module: Weak<dyn ModuleRef>);

    /// Hands the instance the configuration element it was created for.
    fn set_initialization_data(&mut self, config: Arc<ConfigElement>);

    /// Converts this executable into a plugin.
    ///
    /// Plugin implementations return `Ok(self)`; everything else returns
    /// `Err(self)` to give the instance back to the caller.
    fn into_plugin(self: Box<Self>) -> Result<Box<dyn Plugin>, Box<dyn Executable>>;
}

/// Reusable state backing an [`Executable`] implementation.
///
/// Embed one of these and delegate the module and initialization-data
/// accessors to it.
#[derive(Default)]
pub struct ExecutableSupport {
    module: Option<Weak<dyn ModuleRef>>,
    init_data: Option<Arc<ConfigElement>>,
}

impl ExecutableSupport {
    /// The owning module, if set and still alive.
    pub fn module(&self) -> Option<Arc<dyn ModuleRef>> {
        self.module.as_ref().and_then(Weak::upgrade)
    }

    /// Stores the owning-module back-reference.
    pub fn set_module(&mut self, module: Weak<dyn ModuleRef>) {
        self.module = Some(module);
    }

    /// The configuration element supplied at creation, when any.
    pub fn initialization_data(&self) -> Option<Arc<ConfigElement>> {
        self.init_data.clone()
    }

    /// Stores the initialization data.
    pub fn set_initialization_data(&mut self, config: Arc<ConfigElement>) {
        self.init_data = Some(config);
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A module's entry-point object.
///
/// `start` and `stop` frame the module's active life; `initialize` and
/// `uninitialize` are the optional post-start/pre-stop hooks driven by the
/// profile. The default hooks do nothing.
pub trait Plugin: Executable {
    /// Called when the owning module starts.
    fn start(&mut self) -> PluginResult<()>;

    /// Called when the owning module stops.
    fn stop(&mut self) -> PluginResult<()>;

    /// Post-start hook, applied by the profile once every starter has run.
    fn initialize(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Inverse of [`initialize`](Plugin::initialize).
    fn uninitialize(&mut self) -> PluginResult<()> {
        Ok(())
    }
}

/// Sentinel plugin used by modules that declare no plugin class.
#[derive(Default)]
pub struct EmptyPlugin {
    support: ExecutableSupport,
}

impl Executable for EmptyPlugin {
    fn module(&self) -> Option<Arc<dyn ModuleRef>> {
        self.support.module()
    }

    fn set_module(&mut self, module: Weak<dyn ModuleRef>) {
        self.support.set_module(module);
    }

    fn set_initialization_data(&mut self, config: Arc<ConfigElement>) {
        self.support.set_initialization_data(config);
    }

    fn into_plugin(self: Box<Self>) -> Result<Box<dyn Plugin>, Box<dyn Executable>> {
        Ok(self)
    }
}

impl Plugin for EmptyPlugin {
    fn start(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> PluginResult<()> {
        Ok(())
    }
}

// ─── ExecutableFactory ────────────────────────────────────────────────────────

/// A named producer of [`Executable`] instances, owned by a module and
/// registered globally by type name.
pub trait ExecutableFactory: Send + Sync {
    /// The type name this factory produces, unique among enabled factories.
    fn type_name(&self) -> &str;

    /// Whether the factory participates in lookups.
    fn is_enabled(&self) -> bool {
        true
    }

    /// The module that owns this factory, if set and still alive.
    fn module(&self) -> Option<Arc<dyn ModuleRef>>;

    /// Attaches the owning-module back-reference. Called once when the factory
    /// is adopted by a module.
    fn set_module(&self, module: Weak<dyn ModuleRef>);

    /// Produces a fresh instance.
    fn create(&self) -> Result<Box<dyn Executable>, BoxError>;
}

/// Factory producing default-constructed instances of a concrete type.
pub struct GenericExecutableFactory<T> {
    type_name: String,
    module: RwLock<Option<Weak<dyn ModuleRef>>>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> GenericExecutableFactory<T> {
    /// Creates a factory registered under the given type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        GenericExecutableFactory {
            type_name: type_name.into(),
            module: RwLock::new(None),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Executable + Default + 'static> ExecutableFactory for GenericExecutableFactory<T> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn module(&self) -> Option<Arc<dyn ModuleRef>> {
        self.module.read().as_ref().and_then(Weak::upgrade)
    }

    fn set_module(&self, module: Weak<dyn ModuleRef>) {
        *self.module.write() = Some(module);
    }

    fn create(&self) -> Result<Box<dyn Executable>, BoxError> {
        Ok(Box::new(T::default()))
    }
}

// ─── Library registration surface ─────────────────────────────────────────────

/// Name of the symbol a module's native library may export to contribute
/// executable factories.
///
/// The symbol must have the [`RegisterModuleFn`] signature; the runtime
/// resolves it right after loading the library and invokes it with a fresh
/// [`FactoryRegistrar`]. A library without the symbol simply contributes no
/// factories.
pub const REGISTER_MODULE_SYMBOL: &[u8] = b"lattice_register_module";

/// Signature of the [`REGISTER_MODULE_SYMBOL`] entry point.
pub type RegisterModuleFn = extern "Rust" fn(&mut FactoryRegistrar);

/// Collector handed to a library's registration entry point.
#[derive(Default)]
pub struct FactoryRegistrar {
    factories: Vec<Arc<dyn ExecutableFactory>>,
}

impl FactoryRegistrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Contributes one factory.
    pub fn register(&mut self, factory: Arc<dyn ExecutableFactory>) {
        self.factories.push(factory);
    }

    /// Consumes the registrar, yielding the contributed factories.
    pub fn into_factories(self) -> Vec<Arc<dyn ExecutableFactory>> {
        self.factories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        support: ExecutableSupport,
    }

    impl Executable for Probe {
        fn module(&self) -> Option<Arc<dyn ModuleRef>> {
            self.support.module()
        }

        fn set_module(&mut self, module: Weak<dyn ModuleRef>) {
            self.support.set_module(module);
        }

        fn set_initialization_data(&mut self, config: Arc<ConfigElement>) {
            self.support.set_initialization_data(config);
        }

        fn into_plugin(self: Box<Self>) -> Result<Box<dyn Plugin>, Box<dyn Executable>> {
            Err(self)
        }
    }

    #[test]
    fn generic_factory_produces_instances() {
        let factory = GenericExecutableFactory::<Probe>::new("test::probe");
        assert_eq!(factory.type_name(), "test::probe");
        assert!(factory.is_enabled());
        assert!(factory.create().is_ok());
    }

    #[test]
    fn non_plugin_executable_is_given_back() {
        let exe: Box<dyn Executable> = Box::new(Probe::default());
        assert!(exe.into_plugin().is_err());
    }

    #[test]
    fn empty_plugin_converts_and_runs() {
        let exe: Box<dyn Executable> = Box::new(EmptyPlugin::default());
        let mut plugin = exe.into_plugin().unwrap_or_else(|_| panic!("EmptyPlugin is a plugin"));
        assert!(plugin.start().is_ok());
        assert!(plugin.initialize().is_ok());
        assert!(plugin.uninitialize().is_ok());
        assert!(plugin.stop().is_ok());
    }

    #[test]
    fn registrar_collects_factories() {
        let mut registrar = FactoryRegistrar::new();
        registrar.register(Arc::new(GenericExecutableFactory::<Probe>::new("a")));
        registrar.register(Arc::new(GenericExecutableFactory::<Probe>::new("b")));
        assert_eq!(registrar.into_factories().len(), 2);
    }
}
