//! Property trees
//!
//! A [`Property`] is an ordered list of [`Node`]s. Each node is either a leaf
//! holding one scalar [`Value`] or an interior node holding further nodes.
//! Children are owned by value: [`Property::add_property`] moves a subtree in,
//! and [`Property::get_property_by_name`] hands out a deep copy.
//!
//! ```
//! use dsvdc::{Property, ValueType};
//!
//! let mut button = Property::new();
//! button.add_string("name", "Button").add_uint("buttonID", 3);
//!
//! let mut root = Property::new();
//! root.add_bool("active", true).add_property("button", button);
//!
//! assert_eq!(root.len(), 2);
//! assert_eq!(root.value_type(0).unwrap(), ValueType::Bool);
//! let copy = root.get_property_by_name("button").unwrap();
//! assert_eq!(copy.get_string(0).unwrap(), "Button");
//! ```

pub mod legacy;

use serde::{ser, Deserialize, Serialize, Serializer};

use crate::config::RESERVED_REQUEST_ID;
use crate::error::*;
use crate::message::PropertyElement;

/// A scalar property value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Value {
    #[serde(rename = "v_bool")]
    Bool(bool),
    #[serde(rename = "v_uint64")]
    Uint(u64),
    #[serde(rename = "v_int64")]
    Int(i64),
    /// Must be finite: NaN and infinities have no JSON form and fail to encode.
    #[serde(rename = "v_double", serialize_with = "finite")]
    Double(f64),
    #[serde(rename = "v_string")]
    String(String),
    #[serde(rename = "v_bytes")]
    Bytes(Vec<u8>),
}

pub(crate) fn finite<S: Serializer>(
    v: &f64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if !v.is_finite() {
        return Err(ser::Error::custom(format!("non-finite double {}", v)));
    }
    serializer.serialize_f64(*v)
}

pub(crate) fn finite_option<S: Serializer>(
    v: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match v {
        Some(v) if !v.is_finite() => Err(ser::Error::custom(format!("non-finite double {}", v))),
        _ => v.serialize(serializer),
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Uint(_) => ValueType::Uint,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

/// What a node holds. Check this before calling a typed getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// An interior node with children.
    Nested,
    Bool,
    Uint,
    Int,
    Double,
    String,
    Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Leaf(Value),
    Children(Vec<Node>),
}

/// One named or unnamed element of a property tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: Option<String>,
    content: Content,
}

impl Node {
    pub fn leaf(name: Option<String>, value: Value) -> Self {
        Node {
            name,
            content: Content::Leaf(value),
        }
    }

    pub fn nested(name: Option<String>, children: Vec<Node>) -> Self {
        Node {
            name,
            content: Content::Children(children),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.content {
            Content::Leaf(v) => Some(v),
            Content::Children(_) => None,
        }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.content {
            Content::Leaf(_) => None,
            Content::Children(c) => Some(c),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match &self.content {
            Content::Leaf(v) => v.value_type(),
            Content::Children(_) => ValueType::Nested,
        }
    }
}

impl From<Node> for PropertyElement {
    fn from(node: Node) -> Self {
        match node.content {
            Content::Leaf(value) => PropertyElement {
                name: node.name,
                value: Some(value),
                elements: Vec::new(),
            },
            Content::Children(children) => PropertyElement {
                name: node.name,
                value: None,
                elements: children.into_iter().map(PropertyElement::from).collect(),
            },
        }
    }
}

impl TryFrom<PropertyElement> for Node {
    type Error = Error;

    fn try_from(element: PropertyElement) -> Result<Self> {
        match (element.value, element.elements.is_empty()) {
            (Some(_), false) => Err(ErrorKind::Protocol(format!(
                "property element '{}' carries a value and nested elements",
                element.name.as_deref().unwrap_or("")
            ))
            .into()),
            (Some(value), true) => Ok(Node::leaf(element.name, value)),
            (None, _) => Ok(Node::nested(
                element.name,
                element
                    .elements
                    .into_iter()
                    .map(Node::try_from)
                    .collect::<Result<Vec<_>>>()?,
            )),
        }
    }
}

/// An owned property tree, optionally tagged with the request it answers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Property {
    message_id: u32,
    elements: Vec<Node>,
}

impl Property {
    pub fn new() -> Self {
        Property::default()
    }

    pub(crate) fn for_request(message_id: u32) -> Self {
        Property {
            message_id,
            elements: Vec::new(),
        }
    }

    /// Build a tree from its wire form.
    pub fn from_elements(elements: Vec<PropertyElement>) -> Result<Self> {
        Ok(Property {
            message_id: RESERVED_REQUEST_ID,
            elements: elements
                .into_iter()
                .map(Node::try_from)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn to_elements(&self) -> Vec<PropertyElement> {
        self.elements.iter().cloned().map(PropertyElement::from).collect()
    }

    pub fn into_elements(self) -> Vec<PropertyElement> {
        self.elements.into_iter().map(PropertyElement::from).collect()
    }

    /// Id of the request this tree answers, `0` if none.
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    pub(crate) fn with_message_id(mut self, message_id: u32) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn push(&mut self, node: Node) -> &mut Self {
        self.elements.push(node);
        self
    }

    pub fn add_value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.push(Node::leaf(Some(name.into()), value.into()))
    }

    pub fn add_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.add_value(name, value)
    }

    pub fn add_uint(&mut self, name: &str, value: u64) -> &mut Self {
        self.add_value(name, value)
    }

    pub fn add_int(&mut self, name: &str, value: i64) -> &mut Self {
        self.add_value(name, value)
    }

    pub fn add_double(&mut self, name: &str, value: f64) -> &mut Self {
        self.add_value(name, value)
    }

    pub fn add_string(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.add_value(name, Value::String(value.into()))
    }

    pub fn add_bytes(&mut self, name: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.add_value(name, Value::Bytes(value.into()))
    }

    /// Splice `child` in as a nested element. The child's request tag is dropped.
    pub fn add_property(&mut self, name: &str, child: Property) -> &mut Self {
        self.push(Node::nested(Some(name.into()), child.elements))
    }

    /// Like [`add_property`](Property::add_property) for array-style elements.
    pub fn add_unnamed_property(&mut self, child: Property) -> &mut Self {
        self.push(Node::nested(None, child.elements))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.elements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.elements.iter()
    }

    fn node(&self, index: usize) -> Result<&Node> {
        self.elements
            .get(index)
            .ok_or_else(|| ErrorKind::IndexOutOfRange(index).into())
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        self.elements.iter().find(|n| n.name() == Some(name))
    }

    pub fn name(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.node(index)?.name())
    }

    pub fn value_type(&self, index: usize) -> Result<ValueType> {
        Ok(self.node(index)?.value_type())
    }

    fn mismatch(node: &Node, expected: ValueType) -> Error {
        ErrorKind::TypeMismatch {
            expected,
            found: node.value_type(),
        }
        .into()
    }

    pub fn get_bool(&self, index: usize) -> Result<bool> {
        let node = self.node(index)?;
        match node.value() {
            Some(Value::Bool(v)) => Ok(*v),
            _ => Err(Property::mismatch(node, ValueType::Bool)),
        }
    }

    pub fn get_uint(&self, index: usize) -> Result<u64> {
        let node = self.node(index)?;
        match node.value() {
            Some(Value::Uint(v)) => Ok(*v),
            _ => Err(Property::mismatch(node, ValueType::Uint)),
        }
    }

    pub fn get_int(&self, index: usize) -> Result<i64> {
        let node = self.node(index)?;
        match node.value() {
            Some(Value::Int(v)) => Ok(*v),
            _ => Err(Property::mismatch(node, ValueType::Int)),
        }
    }

    pub fn get_double(&self, index: usize) -> Result<f64> {
        let node = self.node(index)?;
        match node.value() {
            Some(Value::Double(v)) => Ok(*v),
            _ => Err(Property::mismatch(node, ValueType::Double)),
        }
    }

    pub fn get_string(&self, index: usize) -> Result<&str> {
        let node = self.node(index)?;
        match node.value() {
            Some(Value::String(v)) => Ok(v),
            _ => Err(Property::mismatch(node, ValueType::String)),
        }
    }

    /// Always returns an owned copy of the buffer.
    pub fn get_bytes(&self, index: usize) -> Result<Vec<u8>> {
        let node = self.node(index)?;
        match node.value() {
            Some(Value::Bytes(v)) => Ok(v.clone()),
            _ => Err(Property::mismatch(node, ValueType::Bytes)),
        }
    }

    fn subtree(node: &Node) -> Result<Property> {
        match node.children() {
            Some(children) => Ok(Property {
                message_id: RESERVED_REQUEST_ID,
                elements: children.to_vec(),
            }),
            None => Err(Property::mismatch(node, ValueType::Nested)),
        }
    }

    /// Deep copy of the first nested element called `name`.
    pub fn get_property_by_name(&self, name: &str) -> Result<Property> {
        let node = self
            .find(name)
            .ok_or_else(|| Error::from(ErrorKind::NotFound(name.into())))?;
        Property::subtree(node)
    }

    /// Deep copy of the nested element at `index`.
    pub fn get_property_by_index(&self, index: usize) -> Result<Property> {
        Property::subtree(self.node(index)?)
    }
}

impl<'a> IntoIterator for &'a Property {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
