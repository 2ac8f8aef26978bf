//! # Lattice
//!
//! A modular application runtime: applications are assembled from
//! self-describing modules discovered on disk and driven through a
//! deterministic lifecycle by an XML profile.
//!
//! ## Overview
//!
//! Every module lives in its own directory under the application's `share/`
//! tree and carries a `plugin.xml` descriptor declaring:
//!
//! - **requirements**: modules that must start first;
//! - **extension points**: named contracts, optionally guarded by an XML
//!   schema;
//! - **extensions**: typed contributions to other modules' points, carrying
//!   an arbitrary configuration subtree;
//! - whether the module holds a **native library** with plugin code.
//!
//! The [`Runtime`](prelude::Runtime) registry cross-registers all of this and
//! resolves dependencies transitively when a module starts. The
//! [`Profile`](prelude::Profile), parsed from `profile.xml`, activates and
//! starts the configured module set, and tears everything down in exact
//! reverse order.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lattice::prelude::*;
//!
//! fn main() -> lattice::RuntimeResult<()> {
//!     lattice_runtime::logging::init();
//!
//!     let runtime = Runtime::global();
//!     runtime.add_modules("share".as_ref())?;
//!
//!     let profile = lattice_runtime::io::profile_reader::create_profile(
//!         "profile.xml".as_ref(),
//!     )?;
//!     profile.start(runtime)?;
//!     let code = profile.run(runtime);
//!     profile.stop(runtime);
//!     std::process::exit(code);
//! }
//! ```
//!
//! ## Writing a plugin
//!
//! A module with `library="true"` exports a registration symbol that
//! contributes its executable factories, among them the plugin class derived
//! from the module identifier:
//!
//! ```rust,ignore
//! use lattice::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct ScenePlugin { support: ExecutableSupport }
//!
//! // ... impl Executable and Plugin for ScenePlugin ...
//!
//! #[unsafe(no_mangle)]
//! extern "Rust" fn lattice_register_module(registrar: &mut FactoryRegistrar) {
//!     registrar.register(Arc::new(
//!         GenericExecutableFactory::<ScenePlugin>::new("viz::scene::Plugin"),
//!     ));
//! }
//! ```

// Foundation types
pub use lattice_core::*;

// Runtime
pub use lattice_runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lattice::prelude::*;
/// ```
pub mod prelude {
    // Runtime and profile - the host-facing entry points
    pub use lattice_runtime::io::profile_reader::create_profile;
    pub use lattice_runtime::{Profile, Runtime};

    // Module graph types
    pub use lattice_runtime::{Extension, ExtensionPoint, Module, Validity};

    // Executable surface - for writing plugins and factories
    pub use lattice_core::{
        BoxError, ConfigElement, EmptyPlugin, Executable, ExecutableFactory, ExecutableSupport,
        FactoryRegistrar, GenericExecutableFactory, ModuleRef, Plugin, PluginResult,
    };

    // Core value types
    pub use lattice_core::{RuntimeError, RuntimeResult, Version};
}
