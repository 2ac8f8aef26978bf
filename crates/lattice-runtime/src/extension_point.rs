//! Extension points: named contracts accepting contributions.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use lattice_core::{ConfigElement, RuntimeError, RuntimeResult};

use crate::extension::{Extension, Validity};
use crate::io::validator::Validator;
use crate::module::Module;
use crate::runtime::Runtime;

/// A named contract published by a module, optionally guarded by an XML
/// schema that contributions must conform to.
///
/// The validator is built lazily from `schema_path` (resolved against the
/// owning module's resources directory) on first use and cached for the
/// point's lifetime.
pub struct ExtensionPoint {
    identifier: String,
    module: Weak<Module>,
    schema_path: Option<PathBuf>,
    validator: Mutex<Option<Arc<Validator>>>,
    enabled: AtomicBool,
}

impl ExtensionPoint {
    pub(crate) fn new(
        module: &Arc<Module>,
        identifier: impl Into<String>,
        schema_path: Option<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(ExtensionPoint {
            identifier: identifier.into(),
            module: Arc::downgrade(module),
            schema_path,
            validator: Mutex::new(None),
            enabled: AtomicBool::new(true),
        })
    }

    /// The point's unique identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The module that declared this point, if it is still alive.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// The schema path relative to the owning module's resources directory,
    /// when the point declares one.
    pub fn schema_path(&self) -> Option<&Path> {
        self.schema_path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enable(&self, enable: bool) {
        self.enabled.store(enable, Ordering::SeqCst);
    }

    /// The point's contribution validator, built and cached on first use.
    ///
    /// Returns `None` for points without a schema, which accept anything.
    pub fn validator(&self) -> RuntimeResult<Option<Arc<Validator>>> {
        let Some(schema_path) = &self.schema_path else {
            return Ok(None);
        };

        let mut cached = self.validator.lock();
        if cached.is_none() {
            let module = self.module.upgrade().ok_or_else(|| RuntimeError::MissingInformation {
                detail: format!(
                    "extension point '{}': owning module is gone, schema cannot be resolved",
                    self.identifier
                ),
            })?;
            let location = module.resources_location().join(schema_path);
            *cached = Some(Arc::new(Validator::from_file(&location)?));
        }
        Ok(cached.clone())
    }

    /// All enabled, valid extensions contributed to this point, in
    /// registration order.
    pub fn all_extensions(&self, runtime: &Runtime) -> Vec<Arc<Extension>> {
        runtime
            .extensions()
            .into_iter()
            .filter(|extension| {
                extension.point() == self.identifier
                    && extension.is_enabled()
                    && extension.validate(runtime).is_ok_and(|v| v == Validity::Valid)
            })
            .collect()
    }

    /// The configuration elements carried by every enabled, valid
    /// contribution to this point, flattened in registration order.
    pub fn all_config_elements(&self, runtime: &Runtime) -> Vec<Arc<ConfigElement>> {
        self.all_extensions(runtime)
            .iter()
            .flat_map(|extension| extension.config().children())
            .collect()
    }
}
