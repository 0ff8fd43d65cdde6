use payload_shape::{Attr, NodeId, Object, ObjectGraph};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use tracing::debug;

// Re-export external crates needed by benches
pub use rand;
pub use serde_json;
pub use tracing_subscriber;

/// Installs a test-friendly subscriber; repeated calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A noisy nested document: roughly a third of the leaves are empty.
pub struct DocumentFixture {
    pub document: Map<String, Value>,
    pub leaves: usize,
}

impl DocumentFixture {
    pub fn new(width: usize, depth: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut leaves = 0;
        let document = build_mapping(&mut rng, width, depth, &mut leaves);
        debug!(width, depth, leaves, "Built document fixture");
        Self { document, leaves }
    }
}

fn build_mapping(
    rng: &mut StdRng,
    width: usize,
    depth: usize,
    leaves: &mut usize,
) -> Map<String, Value> {
    let mut map = Map::new();
    for index in 0..width {
        let key = format!("field_{index}");
        let value = if depth == 0 {
            *leaves += 1;
            random_leaf(rng)
        } else {
            match rng.gen_range(0..4) {
                0 => Value::Array(
                    (0..width)
                        .map(|_| {
                            Value::Object(build_mapping(rng, width / 2 + 1, depth - 1, leaves))
                        })
                        .collect(),
                ),
                1 => {
                    *leaves += 1;
                    random_leaf(rng)
                }
                _ => Value::Object(build_mapping(rng, width, depth - 1, leaves)),
            }
        };
        map.insert(key, value);
    }
    map
}

fn random_leaf(rng: &mut StdRng) -> Value {
    match rng.gen_range(0..9) {
        0 => Value::Null,
        1 => json!(""),
        2 => json!([]),
        3 => json!(0),
        4 => json!(false),
        5 => json!(rng.gen_range(1..10_000)),
        6 => json!(["a", "", null]),
        _ => json!(format!("value-{}", rng.gen::<u32>())),
    }
}

/// A binary tree of objects with back-edges to parents and references into
/// a small pool of shared tag nodes.
pub struct GraphFixture {
    pub graph: ObjectGraph,
    pub roots: Vec<NodeId>,
}

impl GraphFixture {
    pub const TAG_POOL: usize = 8;

    pub fn new(nodes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut graph = ObjectGraph::new();
        let tags: Vec<NodeId> = (0..Self::TAG_POOL)
            .map(|index| graph.insert(Object::new().with_field("label", format!("tag-{index}"))))
            .collect();
        let ids: Vec<NodeId> = (0..nodes).map(|_| graph.reserve()).collect();

        for (index, id) in ids.iter().enumerate() {
            let children: Vec<Attr> = [2 * index + 1, 2 * index + 2]
                .iter()
                .filter_map(|child| ids.get(*child).copied().map(Attr::Ref))
                .collect();
            let parent = index.checked_sub(1).map(|i| ids[i / 2]);
            let fields = [
                ("name", Attr::from(format!("  node {index} "))),
                ("score", Attr::from(rng.gen::<f64>() * 100.0)),
                ("_setattrs", Attr::from("internal")),
                ("secret", Attr::from("s3cr3t")),
                ("parent", parent.into()),
                ("children", Attr::Seq(children)),
                (
                    "tags",
                    Attr::Seq(vec![
                        Attr::Ref(tags[rng.gen_range(0..Self::TAG_POOL)]),
                        Attr::Ref(tags[rng.gen_range(0..Self::TAG_POOL)]),
                        Attr::Absent,
                        Attr::from(index as i64),
                    ]),
                ),
            ];
            for (name, value) in fields {
                graph
                    .set_field(*id, name, value)
                    .expect("reserved node");
            }
        }

        let roots: Vec<NodeId> = ids.iter().step_by(nodes.max(10) / 10).copied().collect();
        debug!(nodes, roots = roots.len(), "Built graph fixture");
        Self { graph, roots }
    }
}

/// A flat list of independent records for list serialization.
pub fn record_list(count: usize) -> (ObjectGraph, Vec<NodeId>) {
    let mut graph = ObjectGraph::new();
    let ids = (0..count)
        .map(|index| {
            graph.insert(
                Object::new()
                    .with_field("id", index as i64)
                    .with_field("email", format!("USER{index}@EXAMPLE.COM"))
                    .with_field("nickname", ""),
            )
        })
        .collect();
    (graph, ids)
}
