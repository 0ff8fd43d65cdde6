//! Object graphs for serialization.
//!
//! Objects live in an [`ObjectGraph`] arena and refer to each other by
//! [`NodeId`]. The arena index is the node's identity: two objects with equal
//! fields are still distinct nodes, and shared or cyclic references are
//! expressed by reusing an id.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::ShapeError;

/// Identity of an object inside an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A leaf attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "string",
            Scalar::DateTime(_) => "datetime",
            Scalar::Date(_) => "date",
        }
    }

    /// Converts to JSON. Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Number((*i).into()),
            Scalar::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Scalar::Str(s) => Value::String(s.clone()),
            Scalar::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Scalar::Date(date) => Value::String(date.to_string()),
        }
    }
}

macro_rules! impl_scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(value.into())
                }
            }

            impl From<$ty> for Attr {
                fn from(value: $ty) -> Self {
                    Attr::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

impl_scalar_from! {
    bool => Bool,
    i32 => Int,
    u32 => Int,
    i64 => Int,
    f32 => Float,
    f64 => Float,
    &str => Str,
    String => Str,
    DateTime<Utc> => DateTime,
    NaiveDate => Date,
}

/// An attribute value held by an [`Object`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    /// No value. Never emitted by the serializer.
    Absent,
    Scalar(Scalar),
    /// Reference to another node in the same graph.
    Ref(NodeId),
    Seq(Vec<Attr>),
}

impl Attr {
    pub fn is_absent(&self) -> bool {
        matches!(self, Attr::Absent)
    }
}

impl From<Scalar> for Attr {
    fn from(value: Scalar) -> Self {
        Attr::Scalar(value)
    }
}

impl From<NodeId> for Attr {
    fn from(value: NodeId) -> Self {
        Attr::Ref(value)
    }
}

impl From<Vec<Attr>> for Attr {
    fn from(value: Vec<Attr>) -> Self {
        Attr::Seq(value)
    }
}

impl<T: Into<Attr>> From<Option<T>> for Attr {
    fn from(value: Option<T>) -> Self {
        value.map_or(Attr::Absent, Into::into)
    }
}

/// Types that can enumerate their own named attributes.
///
/// References to other objects are expressed as [`NodeId`]s obtained from
/// the graph the object is added to.
pub trait Introspect {
    fn fields(&self) -> Vec<(String, Attr)>;
}

/// An ordered set of named attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    fields: Vec<(String, Attr)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Attr>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets `name`, keeping its original position if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Attr>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter().position(|(existing, _)| *existing == name) {
            Some(index) => self.fields[index].1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attr> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Attr)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Introspect for Object {
    fn fields(&self) -> Vec<(String, Attr)> {
        self.fields.clone()
    }
}

/// Arena owning every object reachable during serialization.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    nodes: Vec<Object>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Object) -> NodeId {
        self.nodes.push(object);
        NodeId(self.nodes.len() - 1)
    }

    /// Adds any [`Introspect`] value as a new node.
    pub fn add<T: Introspect + ?Sized>(&mut self, value: &T) -> NodeId {
        let mut object = Object::new();
        for (name, attr) in value.fields() {
            object.set(name, attr);
        }
        self.insert(object)
    }

    /// Allocates an empty node, so cycles can be wired with [`set_field`].
    ///
    /// [`set_field`]: ObjectGraph::set_field
    pub fn reserve(&mut self) -> NodeId {
        self.insert(Object::new())
    }

    pub fn set_field(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<Attr>,
    ) -> Result<(), ShapeError> {
        let object = self
            .nodes
            .get_mut(id.0)
            .ok_or(ShapeError::UnknownNode { id })?;
        object.set(name, value);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<&Object> {
        self.nodes.get(id.0)
    }

    pub fn object(&self, id: NodeId) -> Result<&Object, ShapeError> {
        self.get(id).ok_or(ShapeError::UnknownNode { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Customer {
        name: String,
        email: Option<String>,
        address: NodeId,
    }

    impl Introspect for Customer {
        fn fields(&self) -> Vec<(String, Attr)> {
            vec![
                ("name".to_string(), self.name.clone().into()),
                ("email".to_string(), self.email.clone().into()),
                ("address".to_string(), self.address.into()),
            ]
        }
    }

    #[test]
    fn test_set_keeps_field_order() {
        let mut object = Object::new().with_field("a", 1).with_field("b", 2);
        object.set("a", 3);

        let names: Vec<&str> = object.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(object.get("a"), Some(&Attr::from(3)));
    }

    #[test]
    fn test_add_introspect_value() {
        let mut graph = ObjectGraph::new();
        let address = graph.insert(Object::new().with_field("city", "Lisbon"));
        let customer = graph.add(&Customer {
            name: "Alice".to_string(),
            email: None,
            address,
        });

        let object = graph.object(customer).unwrap();
        assert_eq!(object.get("email"), Some(&Attr::Absent));
        assert_eq!(object.get("address"), Some(&Attr::Ref(address)));
    }

    #[test]
    fn test_set_field_on_unknown_node() {
        let mut graph = ObjectGraph::new();
        let err = graph.set_field(NodeId::new(4), "x", 1).unwrap_err();
        assert_eq!(err, ShapeError::UnknownNode { id: NodeId::new(4) });
    }

    #[test]
    fn test_scalar_to_json() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Scalar::from(date).to_json(), json!("2024-03-09"));
        assert_eq!(Scalar::from(1.5).to_json(), json!(1.5));
        assert_eq!(Scalar::from(f64::NAN).to_json(), Value::Null);
        assert_eq!(Scalar::from("x").to_json(), json!("x"));
    }
}
