//! Unified error types for the Lattice runtime.
//!
//! Every fallible public entry point of the runtime maps to one of these
//! variants. Discovery-time errors (`DescriptorNotFound`, `DescriptorSchema`,
//! `DescriptorParse`) are local to one module directory and are skipped with a
//! debug log; lifecycle errors are fatal to the operation that raised them and
//! carry the identifier of the module they were raised for.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the Lattice runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A module repository path is not a directory.
    #[error("'{path}': not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A candidate module directory has no `plugin.xml`.
    #[error("'plugin.xml': file not found in '{location}'")]
    DescriptorNotFound {
        /// The module directory that was scanned.
        location: PathBuf,
    },

    /// A module descriptor failed XML schema validation.
    #[error("invalid module descriptor '{location}': {log}")]
    DescriptorSchema {
        /// Path of the rejected descriptor.
        location: PathBuf,
        /// The validator's accumulated error log.
        log: String,
    },

    /// A descriptor or profile document could not be parsed (malformed XML,
    /// unexpected root element, XInclude failure, deprecated construct).
    #[error("unable to read '{location}': {detail}")]
    DescriptorParse {
        /// Path of the offending document.
        location: PathBuf,
        /// Parser diagnostic.
        detail: String,
    },

    /// An identifier is already taken in one of the runtime registries.
    ///
    /// Raised at registration time; this is a programming error, not a
    /// recoverable condition.
    #[error("{identifier}: identifier already used by a registered {kind}")]
    DuplicateIdentifier {
        /// Which registry rejected the identifier.
        kind: &'static str,
        /// The duplicated identifier.
        identifier: String,
    },

    /// A module named by a profile action or a lookup does not exist.
    #[error("module '{identifier}' not found")]
    ModuleNotFound {
        /// The missing module identifier.
        identifier: String,
    },

    /// A declared requirement is not registered with the runtime.
    #[error("module '{module}': required module '{requirement}' not found")]
    MissingRequirement {
        /// The module whose start failed.
        module: String,
        /// The missing requirement identifier.
        requirement: String,
    },

    /// Starting a module's requirements failed.
    #[error("module '{module}' was not able to load its requirements")]
    RequirementLoad {
        /// The module whose start failed.
        module: String,
        /// The underlying failure.
        #[source]
        source: Box<RuntimeError>,
    },

    /// A requirement chain loops back onto a module that is already starting.
    #[error("module '{module}': requirement cycle detected")]
    RequirementCycle {
        /// The module that was re-entered while starting.
        module: String,
    },

    /// An operation needs an enabled module but the module is disabled.
    #[error("module '{module}' is not enabled")]
    ModuleDisabled {
        /// The disabled module identifier.
        module: String,
    },

    /// A native library could not be located or loaded.
    #[error("module '{module}': unable to load library: {detail}")]
    LibraryLoad {
        /// The module owning the library.
        module: String,
        /// Loader diagnostic.
        detail: String,
    },

    /// A symbol lookup in a loaded library failed.
    #[error("symbol '{symbol}' retrieval failed: {detail}")]
    SymbolLookup {
        /// The symbol that was requested.
        symbol: String,
        /// Loader diagnostic.
        detail: String,
    },

    /// A plugin's `start` callback failed.
    #[error("module '{module}': start plugin error: {detail}")]
    PluginStart {
        /// The module whose plugin failed.
        module: String,
        /// The plugin's own diagnostic.
        detail: String,
    },

    /// A plugin's `stop` callback failed, or a stop precondition was violated.
    #[error("module '{module}': stop plugin error: {detail}")]
    PluginStop {
        /// The module whose plugin failed.
        module: String,
        /// The plugin's own diagnostic.
        detail: String,
    },

    /// A plugin's `initialize`/`uninitialize` callback failed, or a module was
    /// initialized twice.
    #[error("module '{module}': initialize plugin error: {detail}")]
    PluginInit {
        /// The module whose plugin failed.
        module: String,
        /// The plugin's own diagnostic.
        detail: String,
    },

    /// No enabled executable factory is registered for a type name.
    #[error("{type_name}: no executable factory found for that type")]
    ExecutableFactoryMissing {
        /// The requested factory type name.
        type_name: String,
    },

    /// An executable factory failed to produce an instance.
    #[error("unable to create an executable instance of '{type_name}': {detail}")]
    ExecutableInstantiation {
        /// The factory type name.
        type_name: String,
        /// The factory's own diagnostic.
        detail: String,
    },

    /// An extension references an extension point that is not registered.
    #[error("{point}: invalid extension point reference")]
    InvalidPointReference {
        /// The unresolved extension point identifier.
        point: String,
    },

    /// An extension failed its extension point's schema validation.
    #[error("extension '{extension}' of module '{module}' is invalid: {log}")]
    InvalidExtension {
        /// The owning module identifier.
        module: String,
        /// The offending extension identifier.
        extension: String,
        /// The validator's accumulated error log.
        log: String,
    },

    /// `existing_attribute_value` was called for an absent attribute.
    #[error("no such attribute: '{name}'")]
    NoSuchAttribute {
        /// The requested attribute name.
        name: String,
    },

    /// A file does not carry the filename extension an operation requires.
    #[error("'{path}': unexpected filename extension")]
    BadExtension {
        /// The rejected path.
        path: PathBuf,
    },

    /// A required element or attribute is absent from a serialized document.
    #[error("missing information: {detail}")]
    MissingInformation {
        /// What is missing and where.
        detail: String,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
