//! Module descriptor reading.
//!
//! Walks a repository directory and materializes a [`Module`] from every
//! first-level subdirectory carrying a `plugin.xml`. Descriptors are
//! validated against the bundled schema before parsing, and XInclude
//! references are resolved once at parse time.
//!
//! Discovery errors are local: a directory whose descriptor is missing,
//! malformed, or invalid is skipped with a debug log and does not poison the
//! other candidates.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use roxmltree::{Document, Node};
use tracing::{debug, info, warn};

use lattice_core::{ConfigElement, ModuleRef, RuntimeError, RuntimeResult, Version};

use crate::dl;
use crate::extension::Extension;
use crate::extension_point::ExtensionPoint;
use crate::io::convert;
use crate::io::validator::Validator;
use crate::module::Module;
use crate::runtime::Runtime;

const PLUGIN_SCHEMA: &str = include_str!("../../resources/plugin.xsd");
const XINCLUDE_NS: &str = "http://www.w3.org/2001/XInclude";
const DESCRIPTOR_NAME: &str = "plugin.xml";

fn parse_error(location: &Path, detail: impl Into<String>) -> RuntimeError {
    RuntimeError::DescriptorParse { location: location.to_path_buf(), detail: detail.into() }
}

/// Materializes a module from every first-level directory of `location`.
///
/// Modules are returned ordered by ascending priority (directory order
/// breaking ties); directories that fail to produce a module are skipped.
pub fn create_modules(location: &Path, runtime: &Runtime) -> RuntimeResult<Vec<Arc<Module>>> {
    let normalized = location
        .canonicalize()
        .map_err(|_| RuntimeError::NotADirectory { path: location.to_path_buf() })?;
    if !normalized.is_dir() {
        return Err(RuntimeError::NotADirectory { path: normalized });
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(&normalized)
        .map_err(|_| RuntimeError::NotADirectory { path: normalized.clone() })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    entries.sort();

    let mut modules = Vec::new();
    for entry in entries {
        match create_module(&entry, runtime) {
            Ok(Some(module)) => modules.push(module),
            Ok(None) => {}
            Err(e) => {
                debug!(directory = %entry.display(), error = %e, "Module directory skipped");
            }
        }
    }

    modules.sort_by_key(|m| m.priority());
    Ok(modules)
}

/// Materializes the module described by `location/plugin.xml`.
///
/// Returns `Ok(None)` when the runtime already has a module with the same
/// identifier; discovering a module twice is not an error.
pub fn create_module(location: &Path, runtime: &Runtime) -> RuntimeResult<Option<Arc<Module>>> {
    let location = location
        .canonicalize()
        .map_err(|_| RuntimeError::NotADirectory { path: location.to_path_buf() })?;
    let descriptor = location.join(DESCRIPTOR_NAME);
    if !descriptor.exists() {
        return Err(RuntimeError::DescriptorNotFound { location: location.clone() });
    }

    let validator = Validator::from_schema_str(PLUGIN_SCHEMA, "plugin.xsd")?;
    if !validator.validate_file(&descriptor) {
        return Err(RuntimeError::DescriptorSchema {
            location: descriptor,
            log: validator.error_log(),
        });
    }

    let text = std::fs::read_to_string(&descriptor)
        .map_err(|e| parse_error(&descriptor, e.to_string()))?;
    let document =
        Document::parse(&text).map_err(|e| parse_error(&descriptor, e.to_string()))?;
    let root = document.root_element();
    if root.tag_name().name() != "plugin" {
        return Err(parse_error(&descriptor, "unexpected root element"));
    }

    process_plugin(root, &location, runtime)
}

fn process_plugin(
    node: Node<'_, '_>,
    location: &Path,
    runtime: &Runtime,
) -> RuntimeResult<Option<Arc<Module>>> {
    let raw_identifier = node.attribute("id").unwrap_or_default();
    let identifier = Runtime::filter_id(raw_identifier);
    if identifier.is_empty() {
        return Err(parse_error(location, "module identifier is empty"));
    }
    if runtime.find_module(identifier).is_some() {
        debug!(module = %identifier, "Module already registered, descriptor ignored");
        return Ok(None);
    }

    let create_library = node.attribute("library") == Some("true");
    let priority = match node.attribute("priority") {
        Some(value) => value
            .parse()
            .map_err(|_| parse_error(location, format!("invalid priority '{value}'")))?,
        None => 0,
    };
    let version = match node.attribute("version") {
        Some(value) => value
            .parse()
            .map_err(|_| parse_error(location, format!("invalid version '{value}'")))?,
        None => Version::none(),
    };

    let module = if create_library {
        // A module with native code derives its library name from its
        // identifier and its plugin class from the `<id>::Plugin` convention.
        let library_name = identifier.replace("::", "_");
        let library_name = library_name.trim_start_matches('_');
        info!(module = %identifier, library = %library_name, "Module holds a native library");

        let plugin_class = format!("{identifier}::Plugin");
        let mut module = Module::new(location, raw_identifier, version, plugin_class, priority);
        module.set_library(dl::Library::new(library_name));
        module
    } else {
        Module::new(location, raw_identifier, version, "", priority)
    };

    let module = Arc::new(module);
    for child in node.children().filter(|c| c.is_element()) {
        process_plugin_child(child, &module, location)?;
    }

    Ok(Some(module))
}

fn process_plugin_child(node: Node<'_, '_>, module: &Arc<Module>, base: &Path) -> RuntimeResult<()> {
    if is_include(node) {
        let (text, dir) = load_include(node, base)?;
        let document = Document::parse(&text).map_err(|e| parse_error(base, e.to_string()))?;
        return process_plugin_child(document.root_element(), module, &dir);
    }

    match node.tag_name().name() {
        "extension" => {
            let extension = process_extension(node, module, base)?;
            module.add_extension(extension);
        }
        "extension-point" => {
            let point = process_extension_point(node, module, base)?;
            module.add_extension_point(point);
        }
        "requirement" => {
            let identifier = node.attribute("id").unwrap_or_default();
            if identifier.is_empty() {
                return Err(parse_error(base, "requirement without an id attribute"));
            }
            module.add_requirement(identifier);
        }
        "point" => {
            return Err(parse_error(
                base,
                "the <point> element is deprecated, declare an <extension-point> \
                 and a separate <extension> instead",
            ));
        }
        // Any other element is meaningful only inside an extension.
        _ => {}
    }
    Ok(())
}

fn process_extension(
    node: Node<'_, '_>,
    module: &Arc<Module>,
    base: &Path,
) -> RuntimeResult<Arc<Extension>> {
    let identifier = node.attribute("id").unwrap_or_default();
    let point = node.attribute("implements").unwrap_or_default();
    if point.is_empty() {
        return Err(parse_error(base, "extension without an implements attribute"));
    }

    let config = materialize(node, base, Some(module))?;
    let payload = convert::to_xml_string(&config)?;
    Ok(Extension::new(module, identifier, point, payload, config))
}

fn process_extension_point(
    node: Node<'_, '_>,
    module: &Arc<Module>,
    base: &Path,
) -> RuntimeResult<Arc<ExtensionPoint>> {
    let identifier = node.attribute("id").unwrap_or_default();
    if identifier.is_empty() {
        return Err(parse_error(base, "extension point without an id attribute"));
    }
    if module.has_extension_point(identifier) {
        return Err(parse_error(
            base,
            format!("extension point '{identifier}' is declared twice"),
        ));
    }
    let schema = node.attribute("schema").map(PathBuf::from);
    Ok(ExtensionPoint::new(module, identifier, schema))
}

/// Materializes one XML element (and its subtree) as a configuration tree.
///
/// Attributes map to the attribute map, text and CDATA concatenate into the
/// value in document order, and element children recurse. XInclude references
/// are resolved in place.
pub(crate) fn materialize(
    node: Node<'_, '_>,
    base: &Path,
    module: Option<&Arc<Module>>,
) -> RuntimeResult<Arc<ConfigElement>> {
    let name = node.tag_name().name();
    let element = match module {
        Some(module) => {
            let module_ref: Arc<dyn ModuleRef> = (*module).clone();
            let weak: Weak<dyn ModuleRef> = Arc::downgrade(&module_ref);
            ConfigElement::with_module(name, weak)
        }
        None => ConfigElement::new(name),
    };

    for attribute in node.attributes() {
        element.set_attribute_value(attribute.name(), attribute.value());
    }

    for child in node.children() {
        if child.is_text() {
            let text = child.text().unwrap_or_default();
            if text.trim().is_empty() {
                if text.contains('\n') || text.contains('\t') {
                    warn!(
                        module = %module.map(|m| m.identifier()).unwrap_or("<none>"),
                        node = %name,
                        "Blank text in an XML node can behave unexpectedly, \
                         consider using <![CDATA[ ... ]]>"
                    );
                }
            } else {
                element.set_value(element.value() + text);
            }
            continue;
        }

        if child.is_element() {
            if is_include(child) {
                let (text, dir) = load_include(child, base)?;
                let document =
                    Document::parse(&text).map_err(|e| parse_error(base, e.to_string()))?;
                element.add_child(materialize(document.root_element(), &dir, module)?);
            } else {
                element.add_child(materialize(child, base, module)?);
            }
        }
    }

    Ok(element)
}

fn is_include(node: Node<'_, '_>) -> bool {
    node.tag_name().name() == "include" && node.tag_name().namespace() == Some(XINCLUDE_NS)
}

fn load_include(node: Node<'_, '_>, base: &Path) -> RuntimeResult<(String, PathBuf)> {
    let href = node
        .attribute("href")
        .ok_or_else(|| parse_error(base, "XInclude reference without an href attribute"))?;
    let path = base.join(href);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| parse_error(&path, format!("unable to resolve XInclude: {e}")))?;
    let directory = path.parent().unwrap_or(base).to_path_buf();
    Ok((text, directory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_module(root: &Path, directory: &str, descriptor: &str) {
        let dir = root.join(directory);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_NAME), descriptor).unwrap();
    }

    #[test]
    fn discovers_modules_in_a_repository() {
        let repo = tempfile::tempdir().unwrap();
        write_module(repo.path(), "foo", r#"<plugin id="foo"/>"#);
        write_module(
            repo.path(),
            "bar",
            r#"<plugin id="bar"><requirement id="foo"/></plugin>"#,
        );

        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();

        assert!(runtime.find_module("foo").is_some());
        let bar = runtime.find_module("bar").unwrap();
        assert_eq!(bar.requirements(), ["foo"]);
        assert!(runtime.find_module("baz").is_none());
    }

    #[test]
    fn empty_repository_is_not_an_error() {
        let repo = tempfile::tempdir().unwrap();
        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();
        assert!(runtime.modules().is_empty());
    }

    #[test]
    fn missing_repository_is_an_error() {
        let runtime = Runtime::new();
        let result = runtime.add_modules(Path::new("/nonexistent/lattice/repo"));
        assert!(matches!(result, Err(RuntimeError::NotADirectory { .. })));
    }

    #[test]
    fn broken_descriptor_does_not_poison_the_repository() {
        let repo = tempfile::tempdir().unwrap();
        write_module(repo.path(), "good", r#"<plugin id="good"/>"#);
        write_module(repo.path(), "broken", r#"<plugin id="broken""#);
        fs::create_dir_all(repo.path().join("nodescriptor")).unwrap();

        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();
        assert_eq!(runtime.modules().len(), 1);
        assert!(runtime.find_module("good").is_some());
    }

    #[test]
    fn duplicate_identifier_yields_none() {
        let repo = tempfile::tempdir().unwrap();
        write_module(repo.path(), "first", r#"<plugin id="demo"/>"#);

        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();

        let clone_dir = tempfile::tempdir().unwrap();
        write_module(clone_dir.path(), "second", r#"<plugin id="demo"/>"#);
        let result = create_module(&clone_dir.path().join("second"), &runtime).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn descriptor_without_required_id_is_rejected() {
        let repo = tempfile::tempdir().unwrap();
        write_module(repo.path(), "anon", r#"<plugin library="false"/>"#);
        let runtime = Runtime::new();
        let result = create_module(&repo.path().join("anon"), &runtime);
        assert!(matches!(result, Err(RuntimeError::DescriptorSchema { .. })));
    }

    #[test]
    fn identifier_is_filtered() {
        let repo = tempfile::tempdir().unwrap();
        write_module(repo.path(), "mod", r#"<plugin id="::viz::scene"/>"#);
        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();
        let module = runtime.find_module("viz::scene").unwrap();
        assert_eq!(module.raw_identifier(), "::viz::scene");
    }

    #[test]
    fn library_module_derives_name_and_plugin_class() {
        let repo = tempfile::tempdir().unwrap();
        write_module(
            repo.path(),
            "scene",
            r#"<plugin id="viz::scene" library="true" priority="2" version="1.4.0"/>"#,
        );
        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();

        let module = runtime.find_module("viz::scene").unwrap();
        assert_eq!(module.plugin_class(), "viz::scene::Plugin");
        assert_eq!(module.priority(), 2);
        assert_eq!(module.version(), Version::new(1, 4, 0));
    }

    #[test]
    fn legacy_point_element_is_fatal_for_the_descriptor() {
        let repo = tempfile::tempdir().unwrap();
        write_module(
            repo.path(),
            "old",
            r#"<plugin id="old"><point id="old.point"/></plugin>"#,
        );
        let runtime = Runtime::new();
        let result = create_module(&repo.path().join("old"), &runtime);
        assert!(matches!(result, Err(RuntimeError::DescriptorParse { .. })));
    }

    #[test]
    fn extensions_and_points_are_materialized() {
        let repo = tempfile::tempdir().unwrap();
        write_module(
            repo.path(),
            "ui",
            r#"<plugin id="ui">
                 <extension-point id="ui.menus" schema="menus.xsd"/>
                 <extension id="ui.menus.default" implements="ui.menus">
                   <menu name="File"><item shortcut="q">Quit</item></menu>
                 </extension>
               </plugin>"#,
        );
        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();

        let module = runtime.find_module("ui").unwrap();
        assert!(module.has_extension_point("ui.menus"));
        assert!(module.has_extension("ui.menus.default"));

        let extension = runtime.find_extension("ui.menus.default").unwrap();
        assert_eq!(extension.point(), "ui.menus");
        let menus = extension.config().find("menu", "name", "File", -1);
        assert_eq!(menus.len(), 1);
        let item = &menus[0].children()[0];
        assert_eq!(item.value(), "Quit");
        assert_eq!(item.attribute_value("shortcut"), "q");

        let point = runtime.find_extension_point("ui.menus").unwrap();
        assert_eq!(point.schema_path(), Some(Path::new("menus.xsd")));
    }

    #[test]
    fn cdata_and_text_concatenate_in_document_order() {
        let repo = tempfile::tempdir().unwrap();
        write_module(
            repo.path(),
            "calc",
            r#"<plugin id="calc"><extension implements="calc.exprs"><expr>a<![CDATA[ < ]]>b</expr></extension></plugin>"#,
        );
        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();

        let module = runtime.find_module("calc").unwrap();
        let extension = &module.extensions()[0];
        let expr = &extension.config().children()[0];
        assert_eq!(expr.value(), "a < b");
    }

    #[test]
    fn xinclude_references_are_resolved() {
        let repo = tempfile::tempdir().unwrap();
        let dir = repo.path().join("themed");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("palette.xml"), r#"<palette primary="teal"/>"#).unwrap();
        fs::write(
            dir.join(DESCRIPTOR_NAME),
            r#"<plugin id="themed" xmlns:xi="http://www.w3.org/2001/XInclude">
                 <extension implements="ui.themes">
                   <xi:include href="palette.xml"/>
                 </extension>
               </plugin>"#,
        )
        .unwrap();

        let runtime = Runtime::new();
        runtime.add_modules(repo.path()).unwrap();

        let module = runtime.find_module("themed").unwrap();
        let config = module.extensions()[0].config().clone();
        let palettes = config.find("palette", "primary", "teal", -1);
        assert_eq!(palettes.len(), 1);
    }

    #[test]
    fn modules_are_ordered_by_priority() {
        let repo = tempfile::tempdir().unwrap();
        write_module(repo.path(), "a_late", r#"<plugin id="late" priority="5"/>"#);
        write_module(repo.path(), "b_early", r#"<plugin id="early" priority="-1"/>"#);
        write_module(repo.path(), "c_mid", r#"<plugin id="mid"/>"#);

        let runtime = Runtime::new();
        let modules = create_modules(repo.path(), &runtime).unwrap();
        let order: Vec<_> = modules.iter().map(|m| m.identifier().to_string()).collect();
        assert_eq!(order, ["early", "mid", "late"]);
    }
}
