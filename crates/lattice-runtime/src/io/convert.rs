//! Configuration tree to XML serialization.
//!
//! The inverse of the descriptor reader's materialization: attributes, text
//! value, and children are written in document order, so that serializing a
//! tree and reparsing it yields a structurally equal tree.

use std::fmt::Display;
use std::sync::Arc;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use lattice_core::{ConfigElement, RuntimeError, RuntimeResult};

fn write_error(e: impl Display) -> RuntimeError {
    RuntimeError::MissingInformation {
        detail: format!("unable to serialize configuration element: {e}"),
    }
}

/// Serializes a configuration tree to an XML string.
pub fn to_xml_string(element: &Arc<ConfigElement>) -> RuntimeResult<String> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, element)?;
    String::from_utf8(writer.into_inner()).map_err(write_error)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Arc<ConfigElement>) -> RuntimeResult<()> {
    let mut start = BytesStart::new(element.name());
    for (name, value) in element.attributes() {
        start.push_attribute((name.as_str(), value.as_str()));
    }

    let value = element.value();
    let children = element.children();
    if value.is_empty() && children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_error)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(write_error)?;
    if !value.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&value))).map_err(write_error)?;
    }
    for child in &children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name())))
        .map_err(write_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::descriptor_reader::materialize;
    use std::path::Path;

    fn parse_tree(xml: &str) -> Arc<ConfigElement> {
        let doc = roxmltree::Document::parse(xml).unwrap();
        materialize(doc.root_element(), Path::new("."), None).unwrap()
    }

    #[test]
    fn serializes_attributes_value_and_children() {
        let root = ConfigElement::new("service");
        root.set_attribute_value("uid", "mesher");
        let child = ConfigElement::new("threshold");
        child.set_value("42");
        root.add_child(child);
        root.add_child(ConfigElement::new("auto"));

        let xml = to_xml_string(&root).unwrap();
        assert_eq!(xml, r#"<service uid="mesher"><threshold>42</threshold><auto/></service>"#);
    }

    #[test]
    fn escapes_reserved_characters() {
        let root = ConfigElement::new("expr");
        root.set_attribute_value("op", "<");
        root.set_value("a < b && b > c");
        let xml = to_xml_string(&root).unwrap();

        let reparsed = parse_tree(&xml);
        assert_eq!(reparsed.attribute_value("op"), "<");
        assert_eq!(reparsed.value(), "a < b && b > c");
    }

    #[test]
    fn serialize_reparse_round_trip_is_structural_identity() {
        let source = r#"<extension id="demo.cfg" implements="demo.configs">
<service uid="viewer" type="render"><in key="image"/><option value="fast"/></service>
<service uid="writer"><![CDATA[a < b]]></service>
</extension>"#;
        let tree = parse_tree(source);
        let serialized = to_xml_string(&tree).unwrap();
        let reparsed = parse_tree(&serialized);
        assert_eq!(&*tree, &*reparsed);
    }
}
