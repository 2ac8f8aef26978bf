//! # Lattice Core
//!
//! Foundation types for the Lattice module runtime.
//!
//! This crate holds the pieces the runtime layer builds on:
//!
//! - **Version**: the `major.minor.patch` triple carried by modules and
//!   profiles ([`Version`]).
//! - **Configuration trees**: the in-memory form of descriptor XML fragments
//!   ([`ConfigElement`]), queried by services at run time.
//! - **Executables**: the polymorphic objects modules declare ([`Executable`],
//!   [`Plugin`]) and the factories that produce them ([`ExecutableFactory`],
//!   [`GenericExecutableFactory`]).
//! - **Errors**: the single [`RuntimeError`] taxonomy every fallible runtime
//!   operation maps to.
//!
//! Ownership follows one rule throughout: owners hold strong references
//! downward, members hold weak back-references upward (through
//! [`ModuleRef`]), so nothing in the module graph can form a cycle.

pub mod config;
pub mod error;
pub mod executable;
pub mod module_ref;
pub mod version;

pub use config::ConfigElement;
pub use error::{RuntimeError, RuntimeResult};
pub use executable::{
    BoxError, EmptyPlugin, Executable, ExecutableFactory, ExecutableSupport, FactoryRegistrar,
    GenericExecutableFactory, Plugin, PluginResult, REGISTER_MODULE_SYMBOL, RegisterModuleFn,
};
pub use module_ref::ModuleRef;
pub use version::Version;
