//! Scenario files: a base edit and two concurrent branch edits.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use arbor_sdk::{
    CacheConfig, CachingStore, ClientIdGenerator, IdGenerator, InMemoryObjectStore, MergeConfig, ObjectStore,
    Operation, Replica, TreeId,
};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Branch;

/// A scenario as read from JSON.
///
/// ```json
/// {
///   "tree": "demo",
///   "base":  [{"op": "add_new_child", "parent": 1, "role": "items", "index": -1, "child": 10, "concept": null}],
///   "left":  [{"op": "set_property", "node": 10, "role": "name", "value": "left"}],
///   "right": [{"op": "delete_node", "node": 10}]
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default = "default_tree")]
    pub tree: String,
    #[serde(default)]
    pub uses_role_ids: bool,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub base: Vec<Operation>,
    #[serde(default)]
    pub left: Vec<Operation>,
    #[serde(default)]
    pub right: Vec<Operation>,
}

fn default_tree() -> String {
    "scenario".into()
}

/// The three replicas a scenario produces, sharing one cached store.
pub struct Branches {
    /// Backing store, for object and round-trip counts.
    pub store: Arc<InMemoryObjectStore>,
    /// What the replicas read and write through.
    pub cache: Arc<CachingStore>,
    pub base: Replica,
    pub left: Replica,
    pub right: Replica,
}

impl Branches {
    pub fn get(&self, branch: Branch) -> &Replica {
        match branch {
            Branch::Base => &self.base,
            Branch::Left => &self.left,
            Branch::Right => &self.right,
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Commit the base operations, fork twice and commit each branch.
    pub fn build(&self, config: MergeConfig) -> anyhow::Result<Branches> {
        let store = Arc::new(InMemoryObjectStore::new());
        let cache = Arc::new(CachingStore::new(store.clone(), self.cache.clone()));
        let shared: Arc<dyn ObjectStore> = cache.clone();
        let mut base = Replica::init(
            Arc::clone(&shared),
            client(1)?,
            TreeId::new(self.tree.clone()),
            self.uses_role_ids,
        )?
        .with_merge_config(config);
        commit(&mut base, &self.base, Branch::Base)?;

        let mut left = base.fork(client(2)?);
        commit(&mut left, &self.left, Branch::Left)?;
        let mut right = base.fork(client(3)?);
        commit(&mut right, &self.right, Branch::Right)?;

        debug!(objects = store.len(), cached = cache.cached_len(), "scenario built");
        Ok(Branches {
            store,
            cache,
            base,
            left,
            right,
        })
    }
}

fn client(id: u32) -> anyhow::Result<Arc<dyn IdGenerator>> {
    Ok(Arc::new(ClientIdGenerator::new(id)?))
}

fn commit(replica: &mut Replica, ops: &[Operation], branch: Branch) -> anyhow::Result<()> {
    replica
        .edit(|view| {
            for op in ops {
                view.apply(op.clone())?;
            }
            Ok(())
        })
        .with_context(|| format!("applying {} operations", branch.name()))?;
    Ok(())
}
