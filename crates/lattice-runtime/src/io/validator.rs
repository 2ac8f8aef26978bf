//! XML schema validation.
//!
//! A [`Validator`] wraps one XML schema and checks documents or sub-trees
//! against it, accumulating diagnostics in an error log that callers inspect
//! after a failed run. Validators are built once per schema and cached by
//! their extension point, so the schema file is parsed at most once.
//!
//! The supported schema subset is the one the descriptor, profile, and
//! extension-point grammars use: global element declarations with inline
//! complex types, `sequence`/`choice` content models with occurrence bounds,
//! `any` wildcards, and attribute declarations with `use="required"` or
//! `anyAttribute`. Simple types are not checked beyond structure.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use lattice_core::{RuntimeError, RuntimeResult};

const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

// ─── Schema model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurs {
    Bounded(u32),
    Unbounded,
}

impl Occurs {
    fn admits(&self, count: u32) -> bool {
        match self {
            Occurs::Bounded(max) => count < *max,
            Occurs::Unbounded => true,
        }
    }
}

#[derive(Debug, Clone)]
struct AttrDecl {
    name: String,
    required: bool,
}

#[derive(Debug, Clone)]
struct ElementDecl {
    attributes: Vec<AttrDecl>,
    any_attributes: bool,
    content: Option<Particle>,
}

#[derive(Debug, Clone)]
enum Particle {
    Element {
        name: String,
        decl: Option<Box<ElementDecl>>,
        min: u32,
        max: Occurs,
    },
    Sequence {
        items: Vec<Particle>,
        min: u32,
        max: Occurs,
    },
    Choice {
        items: Vec<Particle>,
        min: u32,
        max: Occurs,
    },
    Any {
        min: u32,
        max: Occurs,
    },
}

#[derive(Debug)]
struct Schema {
    elements: HashMap<String, ElementDecl>,
}

// ─── Schema parsing ───────────────────────────────────────────────────────────

fn is_xsd(node: roxmltree::Node<'_, '_>, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(XSD_NS)
}

fn parse_occurs(node: roxmltree::Node<'_, '_>) -> RuntimeResult<(u32, Occurs)> {
    let bad = |what: &str, value: &str| RuntimeError::MissingInformation {
        detail: format!("schema: invalid {what} '{value}'"),
    };
    let min = match node.attribute("minOccurs") {
        Some(v) => v.parse().map_err(|_| bad("minOccurs", v))?,
        None => 1,
    };
    let max = match node.attribute("maxOccurs") {
        Some("unbounded") => Occurs::Unbounded,
        Some(v) => Occurs::Bounded(v.parse().map_err(|_| bad("maxOccurs", v))?),
        None => Occurs::Bounded(1),
    };
    Ok((min, max))
}

fn parse_particle(node: roxmltree::Node<'_, '_>) -> RuntimeResult<Option<Particle>> {
    let (min, max) = parse_occurs(node)?;
    if is_xsd(node, "element") {
        let (name, decl) = if let Some(reference) = node.attribute("ref") {
            (reference.to_string(), None)
        } else {
            let name = node.attribute("name").ok_or_else(|| RuntimeError::MissingInformation {
                detail: "schema: element particle without name or ref".into(),
            })?;
            let inline = node
                .children()
                .find(|c| is_xsd(*c, "complexType"))
                .map(parse_complex_type)
                .transpose()?;
            (name.to_string(), inline.map(Box::new))
        };
        return Ok(Some(Particle::Element { name, decl, min, max }));
    }
    if is_xsd(node, "sequence") || is_xsd(node, "choice") {
        let mut items = Vec::new();
        for child in node.children().filter(|c| c.is_element()) {
            if let Some(item) = parse_particle(child)? {
                items.push(item);
            }
        }
        return Ok(Some(if is_xsd(node, "sequence") {
            Particle::Sequence { items, min, max }
        } else {
            Particle::Choice { items, min, max }
        }));
    }
    if is_xsd(node, "any") {
        return Ok(Some(Particle::Any { min, max }));
    }
    Ok(None)
}

fn parse_complex_type(node: roxmltree::Node<'_, '_>) -> RuntimeResult<ElementDecl> {
    let mut attributes = Vec::new();
    let mut any_attributes = false;
    let mut content = None;

    for child in node.children().filter(|c| c.is_element()) {
        if is_xsd(child, "attribute") {
            if let Some(name) = child.attribute("name") {
                attributes.push(AttrDecl {
                    name: name.to_string(),
                    required: child.attribute("use") == Some("required"),
                });
            }
        } else if is_xsd(child, "anyAttribute") {
            any_attributes = true;
        } else if content.is_none() {
            content = parse_particle(child)?;
        }
    }

    Ok(ElementDecl { attributes, any_attributes, content })
}

fn parse_schema(text: &str) -> RuntimeResult<Schema> {
    let doc = roxmltree::Document::parse(text).map_err(|e| RuntimeError::MissingInformation {
        detail: format!("schema is not well-formed XML: {e}"),
    })?;
    let root = doc.root_element();
    if !is_xsd(root, "schema") {
        return Err(RuntimeError::MissingInformation {
            detail: "schema document root is not an XML schema".into(),
        });
    }

    let mut elements = HashMap::new();
    for child in root.children().filter(|c| is_xsd(*c, "element")) {
        let name = child.attribute("name").ok_or_else(|| RuntimeError::MissingInformation {
            detail: "schema: top-level element without a name".into(),
        })?;
        let decl = match child.children().find(|c| is_xsd(*c, "complexType")) {
            Some(complex) => parse_complex_type(complex)?,
            None => ElementDecl { attributes: Vec::new(), any_attributes: false, content: None },
        };
        elements.insert(name.to_string(), decl);
    }

    Ok(Schema { elements })
}

// ─── Validator ────────────────────────────────────────────────────────────────

/// Validates XML documents against one schema, accumulating diagnostics.
pub struct Validator {
    schema: Schema,
    origin: String,
    error_log: Mutex<Vec<String>>,
}

impl Validator {
    /// Builds a validator from a schema file on disk.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RuntimeError::MissingInformation {
            detail: format!("unable to read schema '{}': {e}", path.display()),
        })?;
        Self::from_schema_str(&text, &path.display().to_string())
    }

    /// Builds a validator from an in-memory schema document.
    pub fn from_schema_str(schema_xml: &str, origin: &str) -> RuntimeResult<Self> {
        Ok(Validator {
            schema: parse_schema(schema_xml)?,
            origin: origin.to_string(),
            error_log: Mutex::new(Vec::new()),
        })
    }

    /// The schema location this validator was built from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Validates an XML file; diagnostics accumulate in the error log.
    pub fn validate_file(&self, path: &Path) -> bool {
        match std::fs::read_to_string(path) {
            Ok(text) => self.validate_str(&text),
            Err(e) => {
                self.log(format!("unable to read '{}': {e}", path.display()));
                false
            }
        }
    }

    /// Validates an XML document or sub-tree held in a string.
    pub fn validate_str(&self, xml: &str) -> bool {
        let doc = match roxmltree::Document::parse(xml) {
            Ok(doc) => doc,
            Err(e) => {
                self.log(format!("not well-formed XML: {e}"));
                return false;
            }
        };
        let root = doc.root_element();
        let name = root.tag_name().name();
        let Some(decl) = self.schema.elements.get(name) else {
            self.log(format!("element '{name}' is not declared by the schema"));
            return false;
        };
        let before = self.error_log.lock().len();
        self.validate_element(root, decl);
        self.error_log.lock().len() == before
    }

    /// The accumulated diagnostics, one per line.
    pub fn error_log(&self) -> String {
        self.error_log.lock().join("\n")
    }

    /// Resets the diagnostic accumulator.
    pub fn clear_error_log(&self) {
        self.error_log.lock().clear();
    }

    fn log(&self, message: String) {
        self.error_log.lock().push(message);
    }

    fn validate_element(&self, node: roxmltree::Node<'_, '_>, decl: &ElementDecl) {
        let name = node.tag_name().name();

        for attr in node.attributes() {
            // Namespace declarations are not attributes of the content model.
            if attr.namespace().is_some() {
                continue;
            }
            if !decl.any_attributes && !decl.attributes.iter().any(|a| a.name == attr.name()) {
                self.log(format!("element '{name}': undeclared attribute '{}'", attr.name()));
            }
        }
        for attr in decl.attributes.iter().filter(|a| a.required) {
            if node.attribute(attr.name.as_str()).is_none() {
                self.log(format!("element '{name}': missing required attribute '{}'", attr.name));
            }
        }

        let children: Vec<_> = node.children().filter(|c| c.is_element()).collect();
        match &decl.content {
            None => {
                if let Some(child) = children.first() {
                    self.log(format!(
                        "element '{name}': unexpected child '{}'",
                        child.tag_name().name()
                    ));
                }
            }
            Some(particle) => {
                let consumed = self.match_particle(particle, &children, 0).unwrap_or(0);
                if consumed < children.len() {
                    self.log(format!(
                        "element '{name}': unexpected child '{}'",
                        children[consumed].tag_name().name()
                    ));
                }
            }
        }
    }

    /// Matches `particle` against `children[pos..]`, validating every element
    /// it consumes. Returns the new position, or `None` when the minimum
    /// occurrence bound cannot be met.
    fn match_particle(
        &self,
        particle: &Particle,
        children: &[roxmltree::Node<'_, '_>],
        mut pos: usize,
    ) -> Option<usize> {
        match particle {
            Particle::Element { name, decl, min, max } => {
                let mut count = 0u32;
                while pos < children.len()
                    && children[pos].tag_name().name() == name.as_str()
                    && max.admits(count)
                {
                    let resolved = decl
                        .as_deref()
                        .or_else(|| self.schema.elements.get(name.as_str()));
                    if let Some(resolved) = resolved {
                        self.validate_element(children[pos], resolved);
                    }
                    pos += 1;
                    count += 1;
                }
                (count >= *min).then_some(pos)
            }
            Particle::Sequence { items, min, max } => {
                let mut reps = 0u32;
                while max.admits(reps) {
                    let start = pos;
                    let mut cursor = pos;
                    let mut complete = true;
                    for item in items {
                        match self.match_particle(item, children, cursor) {
                            Some(next) => cursor = next,
                            None => {
                                complete = false;
                                break;
                            }
                        }
                    }
                    if !complete {
                        break;
                    }
                    pos = cursor;
                    reps += 1;
                    if pos == start {
                        break;
                    }
                }
                (reps >= *min).then_some(pos)
            }
            Particle::Choice { items, min, max } => {
                let mut reps = 0u32;
                while max.admits(reps) {
                    let start = pos;
                    let advanced = items.iter().find_map(|item| {
                        self.match_particle(item, children, start).filter(|next| *next > start)
                    });
                    match advanced {
                        Some(next) => {
                            pos = next;
                            reps += 1;
                        }
                        None => break,
                    }
                }
                (reps >= *min).then_some(pos)
            }
            Particle::Any { min, max } => {
                let mut count = 0u32;
                while pos < children.len() && max.admits(count) {
                    pos += 1;
                    count += 1;
                }
                (count >= *min).then_some(pos)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:element name="service">
            <xs:complexType>
              <xs:sequence>
                <xs:element ref="in" minOccurs="0" maxOccurs="unbounded"/>
                <xs:element name="config" minOccurs="0">
                  <xs:complexType>
                    <xs:choice minOccurs="0" maxOccurs="unbounded">
                      <xs:any/>
                    </xs:choice>
                    <xs:anyAttribute/>
                  </xs:complexType>
                </xs:element>
              </xs:sequence>
              <xs:attribute name="uid" use="required"/>
              <xs:attribute name="type"/>
            </xs:complexType>
          </xs:element>
          <xs:element name="in">
            <xs:complexType>
              <xs:attribute name="key" use="required"/>
            </xs:complexType>
          </xs:element>
        </xs:schema>
    "#;

    fn validator() -> Validator {
        Validator::from_schema_str(SCHEMA, "<test>").unwrap()
    }

    #[test]
    fn accepts_a_conforming_document() {
        let v = validator();
        let ok = v.validate_str(
            r#"<service uid="mesher" type="mesh">
                 <in key="image"/>
                 <in key="mask"/>
                 <config><anything deeply="nested"/></config>
               </service>"#,
        );
        assert!(ok, "{}", v.error_log());
        assert!(v.error_log().is_empty());
    }

    #[test]
    fn rejects_missing_required_attribute() {
        let v = validator();
        assert!(!v.validate_str(r#"<service type="mesh"/>"#));
        assert!(v.error_log().contains("missing required attribute 'uid'"));
    }

    #[test]
    fn rejects_undeclared_attribute() {
        let v = validator();
        assert!(!v.validate_str(r#"<service uid="a" bogus="1"/>"#));
        assert!(v.error_log().contains("undeclared attribute 'bogus'"));
    }

    #[test]
    fn rejects_unexpected_child() {
        let v = validator();
        assert!(!v.validate_str(r#"<service uid="a"><out key="mesh"/></service>"#));
        assert!(v.error_log().contains("unexpected child 'out'"));
    }

    #[test]
    fn rejects_undeclared_root() {
        let v = validator();
        assert!(!v.validate_str("<unknown/>"));
    }

    #[test]
    fn validates_referenced_declarations() {
        let v = validator();
        assert!(!v.validate_str(r#"<service uid="a"><in/></service>"#));
        assert!(v.error_log().contains("missing required attribute 'key'"));
    }

    #[test]
    fn error_log_accumulates_and_clears() {
        let v = validator();
        v.validate_str("<unknown/>");
        v.validate_str("<service/>");
        assert!(v.error_log().lines().count() >= 2);
        v.clear_error_log();
        assert!(v.error_log().is_empty());
    }

    #[test]
    fn malformed_xml_is_logged_not_panicked() {
        let v = validator();
        assert!(!v.validate_str("<service uid='a'"));
        assert!(v.error_log().contains("not well-formed"));
    }
}
