//! Profile actions: the ordered steps a profile applies to the runtime.
//!
//! Activators and starters are authored in the profile file; stoppers,
//! initializers, and uninitializers are pushed dynamically while modules
//! start, which is what makes teardown order the exact inverse of startup
//! order.

use tracing::{error, info, warn};

use lattice_core::{RuntimeError, RuntimeResult, Version};

use crate::runtime::Runtime;

/// Enables a module and configures it before anything starts.
pub struct Activator {
    identifier: String,
    version: Version,
    parameters: Vec<(String, String)>,
    disable_extension_points: Vec<String>,
    disable_extensions: Vec<String>,
}

impl Activator {
    pub fn new(identifier: impl Into<String>, version: Version) -> Self {
        Activator {
            identifier: identifier.into(),
            version,
            parameters: Vec::new(),
            disable_extension_points: Vec::new(),
            disable_extensions: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Records a parameter to copy into the module.
    pub fn add_parameter(&mut self, identifier: impl Into<String>, value: impl Into<String>) {
        self.parameters.push((identifier.into(), value.into()));
    }

    /// Records an extension point to disable on the module.
    pub fn add_disable_extension_point(&mut self, identifier: impl Into<String>) {
        self.disable_extension_points.push(identifier.into());
    }

    /// Records an extension to disable on the module.
    pub fn add_disable_extension(&mut self, identifier: impl Into<String>) {
        self.disable_extensions.push(identifier.into());
    }

    /// Enables the named module, copies the parameters, and applies the
    /// disable lists. A module that does not exist is fatal; an absent
    /// extension or point only warns.
    pub fn apply(&self, runtime: &Runtime) -> RuntimeResult<()> {
        let module = runtime.find_module(&self.identifier).ok_or_else(|| {
            RuntimeError::ModuleNotFound { identifier: self.identifier.clone() }
        })?;

        module.set_enable(true);

        for (identifier, value) in &self.parameters {
            module.add_parameter(identifier.clone(), value.clone());
        }

        for identifier in &self.disable_extension_points {
            if module.has_extension_point(identifier) {
                module.set_enable_extension_point(identifier, false);
            } else {
                warn!(
                    module = %self.identifier,
                    point = %identifier,
                    "Unable to disable extension point, not found in module"
                );
            }
        }

        for identifier in &self.disable_extensions {
            if module.has_extension(identifier) {
                module.set_enable_extension(identifier, false);
            } else {
                warn!(
                    module = %self.identifier,
                    extension = %identifier,
                    "Unable to disable extension, not found in module"
                );
            }
        }

        Ok(())
    }
}

/// Starts one module, transitively.
pub struct Starter {
    identifier: String,
    #[allow(dead_code)]
    version: Version,
}

impl Starter {
    pub fn new(identifier: impl Into<String>, version: Version) -> Self {
        Starter { identifier: identifier.into(), version }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Starts the named module; skips with a warning when it is already
    /// started (a transitive start may have beaten this starter to it).
    pub fn apply(&self, runtime: &Runtime) -> RuntimeResult<()> {
        let module = runtime.find_enabled_module(&self.identifier).ok_or_else(|| {
            RuntimeError::ModuleNotFound { identifier: self.identifier.clone() }
        })?;

        if module.is_started() {
            warn!(module = %self.identifier, "Module already started");
            return Ok(());
        }
        module.start(runtime)
    }
}

/// Stops one module; pushed when the module starts.
pub struct Stopper {
    identifier: String,
    version: Version,
}

impl Stopper {
    pub fn new(identifier: impl Into<String>, version: Version) -> Self {
        Stopper { identifier: identifier.into(), version }
    }

    /// Stops the named module. Teardown keeps going on failure, so errors are
    /// reported rather than propagated.
    pub fn apply(&self, runtime: &Runtime) {
        let Some(module) = runtime.find_enabled_module(&self.identifier) else {
            error!(
                module = %self.identifier,
                version = %self.version,
                "Unable to stop module, not found"
            );
            return;
        };
        info!(module = %self.identifier, "Stopping module");
        if let Err(e) = module.stop(runtime) {
            error!(module = %self.identifier, error = %e, "Unable to stop module");
        }
    }
}

/// Initializes one module; pushed right after its plugin starts.
pub struct Initializer {
    identifier: String,
    version: Version,
}

impl Initializer {
    pub fn new(identifier: impl Into<String>, version: Version) -> Self {
        Initializer { identifier: identifier.into(), version }
    }

    /// Initializes the named module and pushes the matching uninitializer to
    /// the current profile.
    pub fn apply(&self, runtime: &Runtime) -> RuntimeResult<()> {
        let module = runtime.find_enabled_module(&self.identifier).ok_or_else(|| {
            RuntimeError::ModuleNotFound { identifier: self.identifier.clone() }
        })?;

        if !module.is_initialized() {
            module.initialize()?;
            if let Some(profile) = runtime.current_profile() {
                profile.push_uninitializer(Uninitializer::new(&self.identifier, self.version));
            }
        }
        Ok(())
    }
}

/// Uninitializes one module; pushed when the module initializes.
pub struct Uninitializer {
    identifier: String,
    version: Version,
}

impl Uninitializer {
    pub fn new(identifier: impl Into<String>, version: Version) -> Self {
        Uninitializer { identifier: identifier.into(), version }
    }

    /// Uninitializes the named module, reporting failures without stopping
    /// the teardown.
    pub fn apply(&self, runtime: &Runtime) {
        let Some(module) = runtime.find_enabled_module(&self.identifier) else {
            error!(
                module = %self.identifier,
                version = %self.version,
                "Unable to uninitialize module, not found"
            );
            return;
        };
        if let Err(e) = module.uninitialize() {
            error!(module = %self.identifier, error = %e, "Unable to uninitialize module");
        }
    }
}
