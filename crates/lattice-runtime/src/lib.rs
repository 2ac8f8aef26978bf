//! # Lattice Runtime
//!
//! Module discovery, registries, and lifecycle orchestration.
//!
//! A Lattice application is assembled from *modules*: self-describing units
//! discovered on disk through their `plugin.xml` descriptors. The runtime
//! registers each module's contributions (executable factories, extensions,
//! extension points), and an XML *profile* drives the whole set through a
//! deterministic lifecycle.
//!
//! ```text
//! ┌──────────┐  add_modules   ┌───────────┐  start/stop   ┌─────────┐
//! │ share/.. │───────────────▶│  Runtime  │◀──────────────│ Profile │
//! │ plugin   │  (descriptor   │ registries│   activators, │         │
//! │ .xml     │    reader)     │           │   starters    │         │
//! └──────────┘                └───────────┘               └─────────┘
//! ```
//!
//! # Startup sequence
//!
//! ```rust,ignore
//! use lattice_runtime::{Runtime, io::profile_reader};
//!
//! let runtime = Runtime::global();
//! runtime.add_modules("share".as_ref())?;
//!
//! let profile = profile_reader::create_profile("profile.xml".as_ref())?;
//! profile.start(runtime)?;
//! let code = profile.run(runtime);
//! profile.stop(runtime);
//! std::process::exit(code);
//! ```
//!
//! Lifecycle operations are single-threaded by contract: drive discovery,
//! start, and stop from one thread. Concurrent `find_*` lookups from other
//! threads are safe while no lifecycle operation is in flight.

pub mod dl;
pub mod extension;
pub mod extension_point;
pub mod io;
pub mod logging;
pub mod module;
pub mod operations;
pub mod profile;
pub mod runtime;

pub use extension::{Extension, Validity};
pub use extension_point::ExtensionPoint;
pub use module::Module;
pub use profile::{Activator, Initializer, Profile, Starter, Stopper, Uninitializer};
pub use runtime::Runtime;
