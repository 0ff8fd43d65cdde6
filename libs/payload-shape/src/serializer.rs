use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, info, trace};

use crate::{
    graph::{Attr, NodeId, ObjectGraph},
    path::KeyPath,
    rules::RuleSet,
    ShapeError, DEFAULT_MAX_DEPTH,
};

/// Internal bookkeeping attribute that is never emitted.
pub const BOOKKEEPING_FIELD: &str = "_setattrs";

/// Node ids already emitted during one top-level serialization.
pub type VisitedSet = HashSet<NodeId>;

/// Converts objects of an [`ObjectGraph`] into JSON mappings.
///
/// Every node is emitted at most once per top-level call. A node reached a
/// second time, whether through a cycle or through a shared reference in a
/// sibling branch, is emitted as `null`.
#[derive(Debug, Clone)]
pub struct ObjectSerializer<'g> {
    graph: &'g ObjectGraph,
    excluded: HashSet<String>,
    rules: RuleSet,
    max_depth: usize,
}

impl<'g> ObjectSerializer<'g> {
    pub fn new(graph: &'g ObjectGraph) -> Self {
        Self {
            graph,
            excluded: HashSet::from([BOOKKEEPING_FIELD.to_string()]),
            rules: RuleSet::empty(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Adds attribute names to skip. The bookkeeping field stays excluded.
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn is_excluded(&self, field: &str) -> bool {
        self.excluded.contains(field)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Serializes `root` with a fresh visited set.
    pub fn serialize(&self, root: NodeId) -> Result<Value, ShapeError> {
        let mut visited = VisitedSet::new();
        self.serialize_node(root, &mut visited)
    }

    /// Serializes `root`, sharing `visited` with the caller.
    ///
    /// Returns `null` if `root` is already in `visited`.
    pub fn serialize_node(
        &self,
        root: NodeId,
        visited: &mut VisitedSet,
    ) -> Result<Value, ShapeError> {
        let path = KeyPath::root();
        self.visit_node(root, visited, &path)
    }

    /// Serializes any attribute value. Scalars are returned unchanged and
    /// `Absent` becomes `null`.
    pub fn serialize_attr(
        &self,
        attr: &Attr,
        visited: &mut VisitedSet,
    ) -> Result<Value, ShapeError> {
        let path = KeyPath::root();
        match attr {
            Attr::Absent => Ok(Value::Null),
            Attr::Scalar(scalar) => Ok(scalar.to_json()),
            Attr::Ref(id) => self.visit_node(*id, visited, &path),
            Attr::Seq(items) => Ok(Value::Array(self.visit_sequence(items, visited, &path)?)),
        }
    }

    /// Serializes each root independently, in order.
    ///
    /// Each element gets its own visited set, so the same node listed twice is
    /// emitted twice. Results are not filtered.
    pub fn serialize_all(&self, roots: &[NodeId]) -> Result<Vec<Value>, ShapeError> {
        let values = roots
            .iter()
            .map(|root| self.serialize(*root))
            .collect::<Result<Vec<_>, _>>()?;

        info!(count = values.len(), "Serialized object list");
        Ok(values)
    }

    fn visit_node(
        &self,
        id: NodeId,
        visited: &mut VisitedSet,
        path: &KeyPath<'_>,
    ) -> Result<Value, ShapeError> {
        self.check_depth(path)?;

        if !visited.insert(id) {
            debug!(node = %id, path = %path, "Node already serialized, emitting null");
            return Ok(Value::Null);
        }

        let object = self.graph.object(id)?;
        trace!(node = %id, fields = object.len(), "Serializing node");

        let mut map = Map::new();

        for (name, attr) in object.fields() {
            if self.is_excluded(name) {
                continue;
            }

            let field_path = path.key(name);
            match attr {
                Attr::Seq(items) => {
                    let items = self.visit_sequence(items, visited, &field_path)?;
                    map.insert(name.to_string(), Value::Array(items));
                }
                Attr::Ref(child) => {
                    let value = self.visit_node(*child, visited, &field_path)?;
                    map.insert(name.to_string(), value);
                }
                Attr::Scalar(scalar) => {
                    let value = self.rules.apply(name, scalar.clone())?.to_json();
                    if !value.is_null() {
                        map.insert(name.to_string(), value);
                    }
                }
                Attr::Absent => {}
            }
        }

        Ok(Value::Object(map))
    }

    /// Absent elements are dropped up front. A node element that was already
    /// visited still occupies its slot as `null`.
    fn visit_sequence(
        &self,
        items: &[Attr],
        visited: &mut VisitedSet,
        path: &KeyPath<'_>,
    ) -> Result<Vec<Value>, ShapeError> {
        self.check_depth(path)?;

        let mut values = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let item_path = path.index(index);
            match item {
                Attr::Absent => {}
                Attr::Scalar(scalar) => values.push(scalar.to_json()),
                Attr::Ref(id) => values.push(self.visit_node(*id, visited, &item_path)?),
                Attr::Seq(inner) => {
                    values.push(Value::Array(self.visit_sequence(inner, visited, &item_path)?))
                }
            }
        }

        Ok(values)
    }

    fn check_depth(&self, path: &KeyPath<'_>) -> Result<(), ShapeError> {
        if path.depth() > self.max_depth {
            return Err(ShapeError::MaxDepthExceeded {
                path: path.to_string(),
                limit: self.max_depth,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Object;
    use serde_json::json;

    #[test]
    fn test_bookkeeping_field_is_never_emitted() {
        let mut graph = ObjectGraph::new();
        let root = graph.insert(
            Object::new()
                .with_field("name", "Alice")
                .with_field(BOOKKEEPING_FIELD, "internal"),
        );

        let value = ObjectSerializer::new(&graph).serialize(root).unwrap();
        assert_eq!(value, json!({"name": "Alice"}));
    }

    #[test]
    fn test_absent_attributes_are_skipped() {
        let mut graph = ObjectGraph::new();
        let root = graph.insert(
            Object::new()
                .with_field("name", "Alice")
                .with_field("email", Attr::Absent)
                .with_field("score", f64::INFINITY),
        );

        let value = ObjectSerializer::new(&graph).serialize(root).unwrap();
        assert_eq!(value, json!({"name": "Alice"}));
    }

    #[test]
    fn test_node_without_fields_is_empty_mapping() {
        let mut graph = ObjectGraph::new();
        let root = graph.reserve();

        let value = ObjectSerializer::new(&graph).serialize(root).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_shared_visited_set() {
        let mut graph = ObjectGraph::new();
        let root = graph.insert(Object::new().with_field("id", 1));
        let serializer = ObjectSerializer::new(&graph);

        let mut visited = VisitedSet::new();
        assert_eq!(
            serializer.serialize_node(root, &mut visited).unwrap(),
            json!({"id": 1})
        );
        assert_eq!(
            serializer.serialize_node(root, &mut visited).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_serialize_attr_passes_scalars_through() {
        let graph = ObjectGraph::new();
        let serializer = ObjectSerializer::new(&graph);
        let mut visited = VisitedSet::new();

        assert_eq!(
            serializer
                .serialize_attr(&Attr::from(" raw "), &mut visited)
                .unwrap(),
            json!(" raw ")
        );
        assert_eq!(
            serializer.serialize_attr(&Attr::Absent, &mut visited).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_dangling_reference() {
        let mut graph = ObjectGraph::new();
        let root = graph.insert(Object::new().with_field("parent", NodeId::new(9)));

        let err = ObjectSerializer::new(&graph).serialize(root).unwrap_err();
        assert_eq!(err, ShapeError::UnknownNode { id: NodeId::new(9) });
    }

    #[test]
    fn test_depth_limit() {
        let mut graph = ObjectGraph::new();
        let leaf = graph.insert(Object::new().with_field("v", 1));
        let middle = graph.insert(Object::new().with_field("child", leaf));
        let root = graph.insert(Object::new().with_field("child", middle));

        let err = ObjectSerializer::new(&graph)
            .max_depth(1)
            .serialize(root)
            .unwrap_err();
        assert_eq!(
            err,
            ShapeError::MaxDepthExceeded {
                path: "child.child".to_string(),
                limit: 1
            }
        );
    }
}
