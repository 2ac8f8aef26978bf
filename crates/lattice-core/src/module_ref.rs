//! Identity interface for module back-references.

use std::any::Any;
use std::path::Path;

/// Identity surface of a registered module, as seen from the foundation layer.
///
/// Configuration elements, executables, and factories hold `Weak<dyn ModuleRef>`
/// back-references to the module that owns them. Owners hold the strong side,
/// so a back-reference becomes observably empty once its module is dropped.
/// The runtime layer implements this trait on its concrete module type and
/// recovers it by downcasting when it needs more than identity.
pub trait ModuleRef: Any + Send + Sync {
    /// The module's unique, normalized identifier.
    fn identifier(&self) -> &str;

    /// Absolute directory holding the module's descriptor and data files.
    fn resources_location(&self) -> &Path;
}
