//! Aspect closure-table persistence

use devcat_core::aspect::fields;
use devcat_core::{build_aspect_nodes, Aspect, AspectNode};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::index::IndexConfig;
use crate::store::{Document, DocumentStore, Filter, Predicate, StoreError};

/// Reads and writes [`AspectNode`] documents, keyed by aspect id
#[derive(Clone)]
pub struct AspectRepository {
    store: Arc<dyn DocumentStore>,
    config: Arc<IndexConfig>,
}

impl AspectRepository {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<IndexConfig>) -> Self {
        Self { store, config }
    }

    fn collection(&self) -> &str {
        &self.config.collections.aspect_nodes
    }

    /// Roots of the stored trees holding any aspect of `root`, plus `root`.
    ///
    /// These are the trees a rebuild of `root` rewrites.
    pub async fn affected_roots(&self, root: &Aspect) -> Result<BTreeSet<String>, StoreError> {
        let claimed = self.find(&Filter::new().one_of(fields::ID, root.ids())).await?;
        let mut roots: BTreeSet<String> = claimed.into_iter().map(|n| n.root_id).collect();
        roots.insert(root.id.clone());
        Ok(roots)
    }

    /// Recompute and replace the closure rows of a whole aspect tree.
    ///
    /// `roots` must cover [`Self::affected_roots`]. Every tree listed there is
    /// rewritten in one replacement: the previous version of `root` and trees
    /// rooted at an aspect now inside it disappear, and any other tree that
    /// held an aspect now inside `root` is rebuilt without that aspect's
    /// subtree. Returns the number of nodes written for `root`.
    pub async fn replace_tree(
        &self,
        root: &Aspect,
        roots: &BTreeSet<String>,
    ) -> Result<usize, StoreError> {
        let nodes =
            build_aspect_nodes(root).map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
        let claimed: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        let stale = Filter::new().any(vec![
            Predicate::In(fields::ROOT_ID, roots.iter().cloned().map(Into::into).collect()),
            Predicate::In(fields::ID, claimed.iter().map(|id| (*id).into()).collect()),
        ]);
        let stored = self.find(&stale).await?;

        let mut documents = encode(&nodes)?;
        for donor in roots.iter().filter(|r| !claimed.contains(r.as_str())) {
            let Some(remaining) = restore_tree(donor, &stored, &claimed) else {
                warn!(root = %donor, "Aspect tree root missing from closure table");
                continue;
            };
            let rebuilt = build_aspect_nodes(&remaining)
                .map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
            debug!(root = %donor, nodes = rebuilt.len(), "Rebuilt tree that lost aspects");
            documents.extend(encode(&rebuilt)?);
        }

        self.store
            .replace_where(self.collection(), &stale, documents)
            .await?;
        Ok(nodes.len())
    }

    /// Remove every node of the tree rooted at `root_id`
    pub async fn remove_tree(&self, root_id: &str) -> Result<usize, StoreError> {
        self.store
            .delete_many(self.collection(), &Filter::new().equals(fields::ROOT_ID, root_id))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<AspectNode>, StoreError> {
        self.store
            .get(self.collection(), id)
            .await?
            .map(decode)
            .transpose()
    }

    /// All nodes of one tree, in key order
    pub async fn list_tree(&self, root_id: &str) -> Result<Vec<AspectNode>, StoreError> {
        self.find(&Filter::new().equals(fields::ROOT_ID, root_id)).await
    }

    /// Nodes below `id`, found through the ancestor-set index
    pub async fn descendants_of(&self, id: &str) -> Result<Vec<AspectNode>, StoreError> {
        self.find(&Filter::new().equals(fields::ANCESTOR_IDS, id)).await
    }

    /// Nodes above `id`, found through the descendant-set index
    pub async fn ancestors_of(&self, id: &str) -> Result<Vec<AspectNode>, StoreError> {
        self.find(&Filter::new().equals(fields::DESCENDANT_IDS, id)).await
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<AspectNode>, StoreError> {
        let documents = self.store.find(self.collection(), filter, None).await?;
        documents.into_iter().map(decode).collect()
    }

    /// `aspect_id` plus, optionally, its ancestors and descendants.
    ///
    /// An aspect missing from the closure table expands to itself only.
    pub async fn expand(
        &self,
        aspect_id: &str,
        include_ancestors: bool,
        include_descendants: bool,
    ) -> Result<Vec<String>, StoreError> {
        match self.get(aspect_id).await? {
            Some(node) => Ok(node.expand(include_ancestors, include_descendants)),
            None => {
                warn!(aspect = %aspect_id, "Aspect missing from closure table, using it alone");
                Ok(vec![aspect_id.to_string()])
            }
        }
    }
}

fn encode(nodes: &[AspectNode]) -> Result<Vec<(String, Document)>, StoreError> {
    nodes
        .iter()
        .map(|node| {
            serde_json::to_value(node)
                .map(|doc| (node.id.clone(), doc))
                .map_err(StoreError::Encode)
        })
        .collect()
}

/// Reassemble the stored tree rooted at `root_id`, leaving out the subtrees
/// of `claimed` aspects
fn restore_tree(root_id: &str, stored: &[AspectNode], claimed: &HashSet<&str>) -> Option<Aspect> {
    let by_id: HashMap<&str, &AspectNode> = stored
        .iter()
        .filter(|n| n.root_id == root_id)
        .map(|n| (n.id.as_str(), n))
        .collect();
    let mut visited = HashSet::new();
    restore(root_id, &by_id, claimed, &mut visited)
}

fn restore<'a>(
    id: &'a str,
    by_id: &HashMap<&str, &'a AspectNode>,
    claimed: &HashSet<&str>,
    visited: &mut HashSet<&'a str>,
) -> Option<Aspect> {
    let node = by_id.get(id)?;
    if !visited.insert(id) {
        return None;
    }
    let sub_aspects = node
        .child_ids
        .iter()
        .filter(|child| !claimed.contains(child.as_str()))
        .filter_map(|child| restore(child, by_id, claimed, visited))
        .collect();
    Some(Aspect {
        id: node.id.clone(),
        name: node.name.clone(),
        sub_aspects,
    })
}

fn decode(document: Document) -> Result<AspectNode, StoreError> {
    serde_json::from_value(document).map_err(StoreError::Decode)
}
