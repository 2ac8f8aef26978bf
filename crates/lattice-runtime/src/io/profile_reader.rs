//! Application profile reading.

use std::path::Path;
use std::sync::Arc;

use roxmltree::{Document, Node};

use lattice_core::{RuntimeError, RuntimeResult, Version};

use crate::io::validator::Validator;
use crate::profile::{Activator, Profile, Starter};

const PROFILE_SCHEMA: &str = include_str!("../../resources/profile.xsd");

/// Parses and validates a profile file.
pub fn create_profile(path: &Path) -> RuntimeResult<Arc<Profile>> {
    let normalized = path.canonicalize().map_err(|e| RuntimeError::DescriptorParse {
        location: path.to_path_buf(),
        detail: format!("not a readable file: {e}"),
    })?;
    if normalized.is_dir() {
        return Err(RuntimeError::DescriptorParse {
            location: normalized,
            detail: "not a file".into(),
        });
    }
    if normalized.extension().and_then(|e| e.to_str()) != Some("xml") {
        return Err(RuntimeError::BadExtension { path: normalized });
    }

    let validator = Validator::from_schema_str(PROFILE_SCHEMA, "profile.xsd")?;
    if !validator.validate_file(&normalized) {
        return Err(RuntimeError::DescriptorSchema {
            location: normalized,
            log: validator.error_log(),
        });
    }

    let text = std::fs::read_to_string(&normalized).map_err(|e| RuntimeError::DescriptorParse {
        location: normalized.clone(),
        detail: e.to_string(),
    })?;
    let document = Document::parse(&text).map_err(|e| RuntimeError::DescriptorParse {
        location: normalized.clone(),
        detail: e.to_string(),
    })?;
    let root = document.root_element();

    let name = root.attribute("name").ok_or_else(|| RuntimeError::MissingInformation {
        detail: format!("profile '{}' has no name attribute", normalized.display()),
    })?;
    let version: Version = root
        .attribute("version")
        .ok_or_else(|| RuntimeError::MissingInformation {
            detail: format!("profile '{}' has no version attribute", normalized.display()),
        })?
        .parse()?;
    let check_single_instance = root.attribute("check-single-instance") == Some("true");

    let profile = process_profile(root)?;
    profile.set_name(name);
    profile.set_version(version);
    profile.set_file_path(&normalized);
    profile.set_check_single_instance(check_single_instance);
    Ok(profile)
}

fn process_profile(node: Node<'_, '_>) -> RuntimeResult<Arc<Profile>> {
    let profile = Arc::new(Profile::new());
    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "activate" => profile.add_activator(process_activator(child)?),
            "start" => profile.add_starter(process_starter(child)?),
            _ => {}
        }
    }
    Ok(profile)
}

fn read_id_and_version(node: Node<'_, '_>) -> RuntimeResult<(String, Version)> {
    let identifier = node.attribute("id").unwrap_or_default().to_string();
    let version = match node.attribute("version") {
        Some(value) => value.parse()?,
        None => Version::none(),
    };
    Ok((identifier, version))
}

fn process_activator(node: Node<'_, '_>) -> RuntimeResult<Activator> {
    let (identifier, version) = read_id_and_version(node)?;
    let mut activator = Activator::new(identifier, version);

    for child in node.children().filter(|c| c.is_element()) {
        let id = child.attribute("id").unwrap_or_default();
        match child.tag_name().name() {
            "param" => {
                activator.add_parameter(id, child.attribute("value").unwrap_or_default());
            }
            "disable-extension-point" => activator.add_disable_extension_point(id),
            "disable-extension" => activator.add_disable_extension(id),
            _ => {}
        }
    }
    Ok(activator)
}

fn process_starter(node: Node<'_, '_>) -> RuntimeResult<Starter> {
    let (identifier, version) = read_id_and_version(node)?;
    Ok(Starter::new(identifier, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_profile(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.xml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn parses_a_complete_profile() {
        let (_dir, path) = write_profile(
            r#"<profile name="viewer" version="0.3" check-single-instance="true">
                 <activate id="core" version="1.0">
                   <param id="theme" value="dark"/>
                   <disable-extension id="core.ui.classic"/>
                   <disable-extension-point id="core.legacy"/>
                 </activate>
                 <activate id="ui"/>
                 <start id="ui"/>
               </profile>"#,
        );

        let profile = create_profile(&path).unwrap();
        assert_eq!(profile.name(), "viewer");
        assert_eq!(profile.version(), Version::new(0, 3, 0));
        assert!(profile.check_single_instance());
        assert_eq!(profile.file_path(), path.canonicalize().unwrap());
    }

    #[test]
    fn rejects_non_xml_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.txt");
        fs::write(&path, "<profile name='x' version='1'/>").unwrap();
        assert!(matches!(create_profile(&path), Err(RuntimeError::BadExtension { .. })));
    }

    #[test]
    fn rejects_profile_without_name() {
        let (_dir, path) = write_profile(r#"<profile version="1.0"/>"#);
        assert!(matches!(create_profile(&path), Err(RuntimeError::DescriptorSchema { .. })));
    }

    #[test]
    fn rejects_unknown_profile_children() {
        let (_dir, path) = write_profile(
            r#"<profile name="x" version="1.0"><launch id="y"/></profile>"#,
        );
        assert!(matches!(create_profile(&path), Err(RuntimeError::DescriptorSchema { .. })));
    }

    #[test]
    fn missing_profile_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = create_profile(&dir.path().join("absent.xml"));
        assert!(matches!(result, Err(RuntimeError::DescriptorParse { .. })));
    }
}
