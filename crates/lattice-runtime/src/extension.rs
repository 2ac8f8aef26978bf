//! Extensions: typed contributions to extension points.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::error;

use lattice_core::{ConfigElement, RuntimeError, RuntimeResult};

use crate::module::Module;
use crate::runtime::Runtime;

/// Validation verdict of an extension, memoized after the first run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Not validated yet.
    Unknown,
    /// The contribution conforms to its point's schema (or the point has none).
    Valid,
    /// The contribution was rejected by its point's schema.
    Invalid,
}

/// A contribution of one module to a named extension point.
///
/// The contribution's XML subtree is retained verbatim in `payload` for
/// schema validation; `config` is the same subtree materialized as a
/// [`ConfigElement`] tree for consumers.
pub struct Extension {
    identifier: String,
    point: String,
    module: Weak<Module>,
    payload: String,
    config: Arc<ConfigElement>,
    validity: RwLock<Validity>,
    validation_log: RwLock<String>,
    enabled: AtomicBool,
}

impl Extension {
    pub(crate) fn new(
        module: &Arc<Module>,
        identifier: impl Into<String>,
        point: impl Into<String>,
        payload: String,
        config: Arc<ConfigElement>,
    ) -> Arc<Self> {
        Arc::new(Extension {
            identifier: identifier.into(),
            point: point.into(),
            module: Arc::downgrade(module),
            payload,
            config,
            validity: RwLock::new(Validity::Unknown),
            validation_log: RwLock::new(String::new()),
            enabled: AtomicBool::new(true),
        })
    }

    /// The extension's identifier; may be empty for anonymous contributions.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The identifier of the extension point this contribution targets.
    pub fn point(&self) -> &str {
        &self.point
    }

    /// The module that declared this extension, if it is still alive.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// The contribution's XML subtree, as retained for validation.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The materialized configuration tree; its children are the
    /// contribution's elements.
    pub fn config(&self) -> &Arc<ConfigElement> {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enable(&self, enable: bool) {
        self.enabled.store(enable, Ordering::SeqCst);
    }

    /// The memoized verdict, without triggering validation.
    pub fn validity(&self) -> Validity {
        *self.validity.read()
    }

    /// Diagnostics recorded by the last failed validation.
    pub fn validation_log(&self) -> String {
        self.validation_log.read().clone()
    }

    /// Validates the contribution against its point's schema.
    ///
    /// The verdict is memoized; later calls return it without re-running. A
    /// point that declares no schema accepts every contribution. A point that
    /// cannot be found raises [`RuntimeError::InvalidPointReference`].
    pub fn validate(&self, runtime: &Runtime) -> RuntimeResult<Validity> {
        {
            let verdict = self.validity.read();
            if *verdict != Validity::Unknown {
                return Ok(*verdict);
            }
        }

        let point = runtime
            .find_extension_point(&self.point)
            .ok_or_else(|| RuntimeError::InvalidPointReference { point: self.point.clone() })?;

        let Some(validator) = point.validator()? else {
            *self.validity.write() = Validity::Valid;
            return Ok(Validity::Valid);
        };

        validator.clear_error_log();
        let verdict = if validator.validate_str(&self.payload) {
            Validity::Valid
        } else {
            let log = validator.error_log();
            let module = self.module().map(|m| m.identifier().to_string()).unwrap_or_default();
            error!(
                module = %module,
                extension = %self.identifier,
                point = %self.point,
                log = %log,
                "Extension failed schema validation"
            );
            *self.validation_log.write() = log;
            Validity::Invalid
        };
        *self.validity.write() = verdict;
        Ok(verdict)
    }
}
