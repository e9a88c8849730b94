use crate::{
    error::{AuthzError, Result},
    schema::{CollectionDef, FieldType, ID_FIELD},
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Longest dotted path a rule may reference
pub const MAX_PATH_DEPTH: usize = 6;

#[derive(Debug, Clone)]
struct CollectionNode {
    name: String,
    scalar_fields: BTreeSet<String>,
}

/// A relation field, as an edge from the owning collection to its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEdge {
    pub field: String,
    pub multi: bool,
}

/// One relation hop of a resolved path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub field: String,
    /// Collection name reached by the hop
    pub target: String,
}

/// What the last segment of a path yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The id of the record reached so far
    Id,
    /// Ids referenced by a relation field
    Relation { field: String, target: String },
    /// Value(s) of a scalar field
    Scalar { field: String },
}

/// A traversal path checked against the relation graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub root: String,
    pub hops: Vec<Hop>,
    pub terminal: Terminal,
}

impl ResolvedPath {
    /// Whether evaluating the path needs storage lookups
    pub fn is_traversal(&self) -> bool {
        !self.hops.is_empty()
    }

    /// Collection owning the terminal segment
    pub fn terminal_collection(&self) -> &str {
        self.hops.last().map_or(self.root.as_str(), |hop| hop.target.as_str())
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for hop in &self.hops {
            write!(f, " -{}-> {}", hop.field, hop.target)?;
        }
        match &self.terminal {
            Terminal::Id => write!(f, " .id"),
            Terminal::Relation { field, target } => write!(f, " .{field} ({target} ids)"),
            Terminal::Scalar { field } => write!(f, " .{field}"),
        }
    }
}

/// Directed graph of relation fields between collections
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    graph: DiGraph<CollectionNode, RelationEdge>,
    nodes: HashMap<String, NodeIndex>,
}

impl RelationGraph {
    /// Build the graph from a set of collection definitions
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Config`] when a relation field targets a
    /// collection id that is not part of the set.
    pub fn build(collections: &[CollectionDef]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        let mut by_id = HashMap::new();

        for collection in collections {
            let scalar_fields = collection
                .fields
                .iter()
                .filter(|f| !f.is_relation())
                .map(|f| f.name.clone())
                .collect();
            let index = graph.add_node(CollectionNode {
                name: collection.name.clone(),
                scalar_fields,
            });
            nodes.insert(collection.name.clone(), index);
            by_id.insert(collection.id.as_str(), index);
        }

        for collection in collections {
            let source = nodes[&collection.name];
            for field in &collection.fields {
                let Some(target_id) = field.relation_target() else {
                    continue;
                };
                let target = by_id.get(target_id).copied().ok_or_else(|| {
                    AuthzError::Config(format!(
                        "Relation '{}.{}' targets unknown collection id '{}'",
                        collection.name, field.name, target_id
                    ))
                })?;
                let multi = matches!(
                    field.kind,
                    FieldType::Relation { max_select, .. } if max_select != Some(1)
                );
                graph.add_edge(
                    source,
                    target,
                    RelationEdge {
                        field: field.name.clone(),
                        multi,
                    },
                );
            }
        }

        Ok(Self { graph, nodes })
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.nodes.contains_key(collection)
    }

    /// Outgoing relations of a collection as `(field, target collection)`
    pub fn relations_from(&self, collection: &str) -> Vec<(String, String)> {
        let Some(&index) = self.nodes.get(collection) else {
            return Vec::new();
        };
        let mut relations: Vec<_> = self
            .graph
            .edges(index)
            .map(|edge| (edge.weight().field.clone(), self.graph[edge.target()].name.clone()))
            .collect();
        relations.sort();
        relations
    }

    fn relation(&self, from: NodeIndex, field: &str) -> Option<(NodeIndex, &RelationEdge)> {
        self.graph
            .edges(from)
            .find(|edge| edge.weight().field == field)
            .map(|edge| (edge.target(), edge.weight()))
    }

    /// Resolve a dotted path rooted at `root` against the declared relations
    ///
    /// Every segment but the last must name a relation field; the last may be
    /// a relation field, a scalar field, or `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Config`] for unknown collections or fields, for
    /// traversal past a scalar field, and for paths deeper than
    /// [`MAX_PATH_DEPTH`].
    pub fn resolve_path(&self, root: &str, segments: &[String]) -> Result<ResolvedPath> {
        let path = segments.join(".");
        if segments.is_empty() {
            return Err(AuthzError::Config(format!("Empty field path on '{root}'")));
        }
        if segments.len() > MAX_PATH_DEPTH {
            return Err(AuthzError::Config(format!(
                "Path '{path}' exceeds the maximum depth of {MAX_PATH_DEPTH}"
            )));
        }

        let mut current = *self
            .nodes
            .get(root)
            .ok_or_else(|| AuthzError::Config(format!("Unknown collection '{root}'")))?;
        let mut hops = Vec::new();
        let last = segments.len() - 1;

        for (position, segment) in segments.iter().enumerate() {
            let node = &self.graph[current];
            let relation = self.relation(current, segment);

            if position == last {
                let terminal = if let Some((target, edge)) = relation {
                    Terminal::Relation {
                        field: edge.field.clone(),
                        target: self.graph[target].name.clone(),
                    }
                } else if segment == ID_FIELD {
                    Terminal::Id
                } else if node.scalar_fields.contains(segment) {
                    Terminal::Scalar {
                        field: segment.clone(),
                    }
                } else {
                    return Err(AuthzError::Config(format!(
                        "Unknown field '{}' on '{}' in path '{path}'",
                        segment, node.name
                    )));
                };
                return Ok(ResolvedPath {
                    root: root.to_string(),
                    hops,
                    terminal,
                });
            }

            match relation {
                Some((target, _)) => {
                    hops.push(Hop {
                        field: segment.clone(),
                        target: self.graph[target].name.clone(),
                    });
                    current = target;
                }
                None if segment == ID_FIELD || node.scalar_fields.contains(segment) => {
                    return Err(AuthzError::Config(format!(
                        "Cannot traverse past scalar field '{}.{}' in path '{path}'",
                        node.name, segment
                    )));
                }
                None => {
                    return Err(AuthzError::Config(format!(
                        "Unknown field '{}' on '{}' in path '{path}'",
                        segment, node.name
                    )));
                }
            }
        }

        Err(AuthzError::Config(format!("Unresolvable path '{path}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;

    fn collections() -> Vec<CollectionDef> {
        vec![
            CollectionDef::new("_pb_users_auth_", "users")
                .with_field(FieldDef::select("role_field", "role", &["teacher", "student"])),
            CollectionDef::new("c_groups", "groups")
                .with_field(FieldDef::text("name_field", "name"))
                .with_field(FieldDef::relation("teacher_field", "teacher", "_pb_users_auth_"))
                .with_field(FieldDef::multi_relation("students_field", "students", "_pb_users_auth_")),
            CollectionDef::new("c_assignments", "assignments")
                .with_field(FieldDef::relation("group_field", "group", "c_groups"))
                .with_field(FieldDef::relation("teacher_field", "teacher", "_pb_users_auth_")),
        ]
    }

    fn segments(path: &str) -> Vec<String> {
        path.split('.').map(ToString::to_string).collect()
    }

    #[test]
    fn test_resolve_membership_path() {
        let graph = RelationGraph::build(&collections()).unwrap();
        let resolved = graph.resolve_path("assignments", &segments("group.students.id")).unwrap();

        assert_eq!(resolved.hops.len(), 2);
        assert_eq!(resolved.hops[0].target, "groups");
        assert_eq!(resolved.hops[1].target, "users");
        assert_eq!(resolved.terminal, Terminal::Id);
        assert_eq!(resolved.terminal_collection(), "users");
    }

    #[test]
    fn test_resolve_terminal_kinds() {
        let graph = RelationGraph::build(&collections()).unwrap();

        let relation = graph.resolve_path("assignments", &segments("teacher")).unwrap();
        assert!(!relation.is_traversal());
        assert!(matches!(relation.terminal, Terminal::Relation { ref target, .. } if target == "users"));

        let scalar = graph.resolve_path("assignments", &segments("group.name")).unwrap();
        assert_eq!(scalar.terminal, Terminal::Scalar { field: "name".to_string() });

        let id = graph.resolve_path("assignments", &segments("id")).unwrap();
        assert_eq!(id.terminal, Terminal::Id);
    }

    #[test]
    fn test_invalid_paths_are_config_errors() {
        let graph = RelationGraph::build(&collections()).unwrap();

        let unknown = graph.resolve_path("assignments", &segments("group.members.id"));
        assert!(matches!(unknown, Err(AuthzError::Config(_))));

        let past_scalar = graph.resolve_path("assignments", &segments("group.name.id"));
        assert!(matches!(past_scalar, Err(AuthzError::Config(ref m)) if m.contains("scalar")));

        let too_deep = graph.resolve_path("assignments", &segments("a.b.c.d.e.f.g"));
        assert!(too_deep.is_err());

        assert!(graph.resolve_path("nothing", &segments("id")).is_err());
    }

    #[test]
    fn test_dangling_relation_target() {
        let mut defs = collections();
        defs.push(
            CollectionDef::new("c_progress", "progress")
                .with_field(FieldDef::relation("assignment_field", "assignment", "c_missing")),
        );
        assert!(matches!(RelationGraph::build(&defs), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_relations_from() {
        let graph = RelationGraph::build(&collections()).unwrap();
        assert_eq!(
            graph.relations_from("groups"),
            vec![
                ("students".to_string(), "users".to_string()),
                ("teacher".to_string(), "users".to_string()),
            ]
        );
        assert!(graph.relations_from("users").is_empty());
    }
}
