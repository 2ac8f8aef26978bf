//! In-memory configuration element tree.
//!
//! A [`ConfigElement`] is the materialized form of one XML element from a
//! module descriptor: tag name, concatenated text/CDATA value, attribute map,
//! and ordered children. Extensions carry such trees as their payload and
//! services query them through [`find`](ConfigElement::find).
//!
//! Ownership is strictly parent-to-child: a node owns its children, and the
//! back-reference to the module that declared it is weak. Trees built
//! programmatically (outside any descriptor) simply have no owning module.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{RuntimeError, RuntimeResult};
use crate::module_ref::ModuleRef;

/// One node of a configuration tree.
#[derive(Debug)]
pub struct ConfigElement {
    name: String,
    value: RwLock<String>,
    attributes: RwLock<BTreeMap<String, String>>,
    children: RwLock<Vec<Arc<ConfigElement>>>,
    module: RwLock<Option<Weak<dyn ModuleRef>>>,
}

impl ConfigElement {
    /// Creates a standalone element with the given tag name.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(ConfigElement {
            name: name.into(),
            value: RwLock::new(String::new()),
            attributes: RwLock::new(BTreeMap::new()),
            children: RwLock::new(Vec::new()),
            module: RwLock::new(None),
        })
    }

    /// Creates an element owned by a module, as the descriptor reader does.
    pub fn with_module(name: impl Into<String>, module: Weak<dyn ModuleRef>) -> Arc<Self> {
        let element = Self::new(name);
        *element.module.write() = Some(module);
        element
    }

    /// The element's tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The concatenated text and CDATA content, in document order.
    pub fn value(&self) -> String {
        self.value.read().clone()
    }

    /// Replaces the element's text value.
    pub fn set_value(&self, value: impl Into<String>) {
        *self.value.write() = value.into();
    }

    /// The attribute's value, or the empty string when absent.
    pub fn attribute_value(&self, name: &str) -> String {
        self.attributes.read().get(name).cloned().unwrap_or_default()
    }

    /// The attribute's value, raising [`RuntimeError::NoSuchAttribute`] when
    /// absent.
    pub fn existing_attribute_value(&self, name: &str) -> RuntimeResult<String> {
        self.attributes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NoSuchAttribute { name: name.to_string() })
    }

    /// Returns `true` when the attribute is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.read().contains_key(name)
    }

    /// Snapshot of the full attribute map.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.attributes.read().clone()
    }

    /// Sets an attribute, replacing any previous value under the same key.
    pub fn set_attribute_value(&self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.write().insert(name.into(), value.into());
    }

    /// Appends a child element, preserving document order.
    pub fn add_child(&self, child: Arc<ConfigElement>) {
        self.children.write().push(child);
    }

    /// Snapshot of the ordered child list.
    pub fn children(&self) -> Vec<Arc<ConfigElement>> {
        self.children.read().clone()
    }

    /// The module in whose descriptor this element was declared, if it is
    /// still alive.
    pub fn module(&self) -> Option<Arc<dyn ModuleRef>> {
        self.module.read().as_ref().and_then(Weak::upgrade)
    }

    /// Attaches the owning-module back-reference.
    pub fn set_module(&self, module: Weak<dyn ModuleRef>) {
        *self.module.write() = Some(module);
    }

    /// Recursively collects every element of the subtree (self included)
    /// matching the given criteria, in depth-first pre-order.
    ///
    /// Empty `name`, `attribute`, and `attribute_value` act as wildcards. A
    /// negative `depth` searches the whole subtree; `0` tests only this node.
    pub fn find(
        self: &Arc<Self>,
        name: &str,
        attribute: &str,
        attribute_value: &str,
        depth: i32,
    ) -> Vec<Arc<ConfigElement>> {
        let mut result = Vec::new();

        let name_ok = name.is_empty() || self.name == name;
        let attribute_ok = attribute.is_empty() || self.has_attribute(attribute);
        let attribute_value_ok = attribute_value.is_empty()
            || (self.has_attribute(attribute) && self.attribute_value(attribute) == attribute_value);
        if name_ok && attribute_ok && attribute_value_ok {
            result.push(Arc::clone(self));
        }

        if depth != 0 {
            for child in self.children.read().iter() {
                result.extend(child.find(name, attribute, attribute_value, depth - 1));
            }
        }

        result
    }

    /// Produces a copy sharing no storage with this tree.
    ///
    /// The owning-module back-reference is carried over as-is.
    pub fn deep_clone(&self) -> Arc<ConfigElement> {
        let clone = Self::new(self.name.clone());
        *clone.value.write() = self.value.read().clone();
        *clone.attributes.write() = self.attributes.read().clone();
        *clone.module.write() = self.module.read().clone();
        let children: Vec<_> = self.children.read().iter().map(|c| c.deep_clone()).collect();
        *clone.children.write() = children;
        clone
    }
}

impl PartialEq for ConfigElement {
    /// Structural equality: name, value, attributes, and children in order.
    /// The owning module is identity, not structure, and is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && *self.value.read() == *other.value.read()
            && *self.attributes.read() == *other.attributes.read()
            && self
                .children
                .read()
                .iter()
                .zip(other.children.read().iter())
                .all(|(a, b)| a == b)
            && self.children.read().len() == other.children.read().len()
    }
}

impl Eq for ConfigElement {}
