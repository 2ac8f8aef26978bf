//! Convenience operations over the runtime registries.
//!
//! Free functions wrapping the [`Runtime`] lookups that services reach for
//! most often: resolving module resource paths, collecting the configuration
//! contributed to an extension point, and starting modules or whole profiles
//! in one call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lattice_core::{ConfigElement, RuntimeError, RuntimeResult};

use crate::extension::Extension;
use crate::module::Module;
use crate::profile::Profile;
use crate::runtime::Runtime;

/// All configuration elements contributed by enabled, valid extensions to the
/// named extension point, flattened in registration order.
pub fn get_all_config_elements_for_point(
    runtime: &Runtime,
    identifier: &str,
) -> RuntimeResult<Vec<Arc<ConfigElement>>> {
    let point = runtime
        .find_extension_point(identifier)
        .ok_or_else(|| RuntimeError::InvalidPointReference { point: identifier.to_string() })?;
    Ok(point.all_config_elements(runtime))
}

/// The first enabled extension with the given identifier.
pub fn find_extension(runtime: &Runtime, identifier: &str) -> Option<Arc<Extension>> {
    runtime.find_extension(identifier)
}

/// Searches the named extension's configuration for the first element with a
/// matching `name`, at any depth.
pub fn find_config_element(
    runtime: &Runtime,
    extension_identifier: &str,
    element_name: &str,
) -> Option<Arc<ConfigElement>> {
    let extension = runtime.find_extension(extension_identifier)?;
    extension.config().find(element_name, "", "", -1).into_iter().next()
}

/// Absolute path of the named module's resources directory.
pub fn get_module_resource_path(runtime: &Runtime, identifier: &str) -> Option<PathBuf> {
    runtime
        .find_module(identifier)
        .map(|module| module.resources_location().to_path_buf())
}

/// Absolute path of a file inside the named module's resources directory.
pub fn get_module_resource_file_path(
    runtime: &Runtime,
    identifier: &str,
    path: &Path,
) -> Option<PathBuf> {
    get_module_resource_path(runtime, identifier).map(|resources| resources.join(path))
}

/// Enables and starts the named module.
pub fn start_module(runtime: &Runtime, identifier: &str) -> RuntimeResult<Arc<Module>> {
    let module = runtime
        .find_module(identifier)
        .ok_or_else(|| RuntimeError::ModuleNotFound { identifier: identifier.to_string() })?;
    module.set_enable(true);
    module.start(runtime)?;
    Ok(module)
}

/// Reads a profile file, installs it as the current profile, and starts it.
pub fn start_profile(runtime: &Runtime, path: &Path) -> RuntimeResult<Arc<Profile>> {
    let profile = crate::io::profile_reader::create_profile(path)?;
    profile.start(runtime)?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use lattice_core::Version;

    use crate::extension_point::ExtensionPoint;

    #[test]
    fn resource_paths_resolve_against_the_module() {
        let runtime = Runtime::new();
        let location = std::env::temp_dir().join("lattice-operations-tests").join("res");
        let module = Arc::new(Module::new(&location, "res", Version::none(), "", 0));
        runtime.register_module(module).unwrap();

        assert_eq!(get_module_resource_path(&runtime, "res"), Some(location.clone()));
        assert_eq!(
            get_module_resource_file_path(&runtime, "res", Path::new("icons/app.svg")),
            Some(location.join("icons/app.svg"))
        );
        assert_eq!(get_module_resource_path(&runtime, "ghost"), None);
    }

    #[test]
    fn point_configuration_is_collected() {
        let runtime = Runtime::new();
        let location = std::env::temp_dir().join("lattice-operations-tests").join("host");
        let host = Arc::new(Module::new(&location, "host", Version::none(), "", 0));
        host.add_extension_point(ExtensionPoint::new(&host, "host.items", None));

        let config = ConfigElement::new("extension");
        let item = ConfigElement::new("item");
        item.set_attribute_value("label", "Open");
        config.add_child(item);
        host.add_extension(Extension::new(
            &host,
            "host.items.default",
            "host.items",
            "<extension implements=\"host.items\"><item label=\"Open\"/></extension>".into(),
            config,
        ));
        runtime.register_module(host).unwrap();

        let elements = get_all_config_elements_for_point(&runtime, "host.items").unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].attribute_value("label"), "Open");

        let found = find_config_element(&runtime, "host.items.default", "item").unwrap();
        assert_eq!(found.attribute_value("label"), "Open");

        assert!(matches!(
            get_all_config_elements_for_point(&runtime, "missing.point"),
            Err(RuntimeError::InvalidPointReference { .. })
        ));
    }

    #[test]
    fn start_module_enables_first() {
        let runtime = Runtime::new();
        let location = std::env::temp_dir().join("lattice-operations-tests").join("calc");
        let module = Arc::new(Module::new(&location, "calc", Version::none(), "", 0));
        module.set_enable(false);
        runtime.register_module(module).unwrap();

        let started = start_module(&runtime, "calc").unwrap();
        assert!(started.is_enabled());
        assert!(started.is_started());
    }

    #[test]
    fn start_profile_reads_and_applies_the_file() {
        let runtime = Runtime::new();
        let location = std::env::temp_dir().join("lattice-operations-tests").join("app");
        let module = Arc::new(Module::new(&location, "app", Version::none(), "", 0));
        runtime.register_module(Arc::clone(&module)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.xml");
        fs::write(
            &path,
            r#"<profile name="demo" version="0.1"><start id="app"/></profile>"#,
        )
        .unwrap();

        let profile = start_profile(&runtime, &path).unwrap();
        assert_eq!(profile.name(), "demo");
        assert!(module.is_started());
        profile.stop(&runtime);
        assert!(!module.is_started());
    }
}
