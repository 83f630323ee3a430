//! Aspect taxonomy and its closure table
//!
//! Aspects form a forest. Each tree is flattened into one [`AspectNode`] per
//! aspect holding the root id and the full ancestor and descendant sets, so
//! "is X below Y" becomes a membership test instead of a tree walk.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AspectTreeError {
    #[error("Aspect {id} appears more than once in tree {root_id}")]
    DuplicateAspect { id: String, root_id: String },
}

/// Storage field names of [`AspectNode`]
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const ROOT_ID: &str = "root_id";
    pub const PARENT_ID: &str = "parent_id";
    pub const CHILD_IDS: &str = "child_ids";
    pub const ANCESTOR_IDS: &str = "ancestor_ids";
    pub const DESCENDANT_IDS: &str = "descendant_ids";
}

/// An aspect as edited in the taxonomy, with its nested sub-aspects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sub_aspects: Vec<Aspect>,
}

impl Aspect {
    pub fn new(id: &str, sub_aspects: Vec<Aspect>) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            sub_aspects,
        }
    }

    /// All ids of this tree in depth-first pre-order
    pub fn ids(&self) -> Vec<String> {
        let mut ids = vec![self.id.clone()];
        for sub in &self.sub_aspects {
            ids.extend(sub.ids());
        }
        ids
    }

    /// Find an aspect anywhere in this tree
    pub fn find(&self, id: &str) -> Option<&Aspect> {
        if self.id == id {
            return Some(self);
        }
        self.sub_aspects.iter().find_map(|sub| sub.find(id))
    }
}

/// Closure-table row of one aspect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AspectNode {
    pub id: String,
    pub name: String,
    /// Top-most ancestor, or the node itself for roots
    pub root_id: String,
    /// Empty for roots
    pub parent_id: String,
    /// Direct sub-aspects, in taxonomy order
    pub child_ids: Vec<String>,
    /// Ancestors, nearest first
    pub ancestor_ids: Vec<String>,
    /// All descendants, depth-first pre-order
    pub descendant_ids: Vec<String>,
}

impl AspectNode {
    pub fn is_root(&self) -> bool {
        self.root_id == self.id
    }

    /// The node id, optionally unioned with its ancestors and/or descendants
    pub fn expand(&self, include_ancestors: bool, include_descendants: bool) -> Vec<String> {
        let mut ids = vec![self.id.clone()];
        if include_ancestors {
            ids.extend(self.ancestor_ids.iter().cloned());
        }
        if include_descendants {
            ids.extend(self.descendant_ids.iter().cloned());
        }
        ids
    }
}

/// Build the closure-table rows of one aspect tree, in pre-order.
///
/// Rows are keyed by aspect id, so a tree naming one aspect twice is rejected.
pub fn build_aspect_nodes(root: &Aspect) -> Result<Vec<AspectNode>, AspectTreeError> {
    let mut seen = HashSet::new();
    for id in root.ids() {
        if !seen.insert(id.clone()) {
            return Err(AspectTreeError::DuplicateAspect {
                id,
                root_id: root.id.clone(),
            });
        }
    }

    let mut nodes = Vec::new();
    let mut ancestors = Vec::new();
    collect(root, &root.id, &mut ancestors, &mut nodes);
    Ok(nodes)
}

/// Appends the subtree of `aspect` and returns its descendant ids
fn collect(
    aspect: &Aspect,
    root_id: &str,
    ancestors: &mut Vec<String>,
    nodes: &mut Vec<AspectNode>,
) -> Vec<String> {
    let position = nodes.len();
    nodes.push(AspectNode {
        id: aspect.id.clone(),
        name: aspect.name.clone(),
        root_id: root_id.to_string(),
        parent_id: ancestors.last().cloned().unwrap_or_default(),
        child_ids: aspect.sub_aspects.iter().map(|a| a.id.clone()).collect(),
        ancestor_ids: ancestors.iter().rev().cloned().collect(),
        descendant_ids: Vec::new(),
    });

    ancestors.push(aspect.id.clone());
    let mut descendants = Vec::new();
    for sub in &aspect.sub_aspects {
        descendants.push(sub.id.clone());
        descendants.extend(collect(sub, root_id, ancestors, nodes));
    }
    ancestors.pop();

    nodes[position].descendant_ids = descendants.clone();
    descendants
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_tree() -> Aspect {
        Aspect::new(
            "air",
            vec![
                Aspect::new(
                    "inside_air",
                    vec![Aspect::new("room_air", vec![]), Aspect::new("car_air", vec![])],
                ),
                Aspect::new("outside_air", vec![]),
            ],
        )
    }

    #[test]
    fn test_closure_rows() {
        let nodes = build_aspect_nodes(&sample_tree()).unwrap();
        let by_id: HashMap<_, _> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        assert_eq!(nodes.len(), 5);

        let root = by_id["air"];
        assert!(root.is_root());
        assert!(root.ancestor_ids.is_empty());
        assert!(root.parent_id.is_empty());
        assert_eq!(root.child_ids, vec!["inside_air", "outside_air"]);
        assert_eq!(
            root.descendant_ids,
            vec!["inside_air", "room_air", "car_air", "outside_air"]
        );

        let room = by_id["room_air"];
        assert_eq!(room.ancestor_ids, vec!["inside_air", "air"]);
        assert_eq!(room.parent_id, "inside_air");
        assert!(room.descendant_ids.is_empty());
    }

    #[test]
    fn test_closure_symmetry_and_root() {
        let nodes = build_aspect_nodes(&sample_tree()).unwrap();
        for a in &nodes {
            assert_eq!(a.root_id, "air");
            for b in &nodes {
                assert_eq!(
                    a.descendant_ids.contains(&b.id),
                    b.ancestor_ids.contains(&a.id),
                    "asymmetric pair {} / {}",
                    a.id,
                    b.id
                );
            }
        }
    }

    #[test]
    fn test_expand() {
        let nodes = build_aspect_nodes(&sample_tree()).unwrap();
        let inside = nodes.iter().find(|n| n.id == "inside_air").unwrap();
        assert_eq!(inside.expand(false, false), vec!["inside_air"]);
        assert_eq!(inside.expand(true, false), vec!["inside_air", "air"]);
        assert_eq!(
            inside.expand(true, true),
            vec!["inside_air", "air", "room_air", "car_air"]
        );
    }

    #[test]
    fn test_duplicate_aspect_is_rejected() {
        let tree = Aspect::new(
            "air",
            vec![
                Aspect::new("inside_air", vec![Aspect::new("room_air", vec![])]),
                Aspect::new("room_air", vec![]),
            ],
        );
        assert_eq!(
            build_aspect_nodes(&tree),
            Err(AspectTreeError::DuplicateAspect {
                id: "room_air".to_string(),
                root_id: "air".to_string(),
            })
        );

        let cyclic_root = Aspect::new("air", vec![Aspect::new("air", vec![])]);
        assert!(build_aspect_nodes(&cyclic_root).is_err());
    }

    #[test]
    fn test_find_and_ids() {
        let tree = sample_tree();
        assert_eq!(tree.ids().len(), 5);
        assert_eq!(tree.find("car_air").map(|a| a.id.as_str()), Some("car_air"));
        assert!(tree.find("water").is_none());
    }
}
