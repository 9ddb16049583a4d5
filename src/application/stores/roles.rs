use std::collections::{BTreeSet, VecDeque};

use crate::cache::{CacheStore, Database, Index, StoreIndexes};
use crate::domain::entities::{Role, RoleEdge, RoleEdgeEvent, RoleEvent};

#[derive(Debug, Default)]
pub struct RoleIndexes {
    by_name: Index<String>,
}

impl StoreIndexes for RoleIndexes {
    type Object = Role;
    type Event = RoleEvent;

    const NAME: &'static str = "roles";

    fn index(&mut self, role: &Role) {
        self.by_name.insert(role.name.clone(), role.id);
    }

    fn unindex(&mut self, role: &Role) {
        self.by_name.remove(&role.name, role.id);
    }
}

pub type RoleStore<D> = CacheStore<RoleIndexes, D>;

impl<D: Database> CacheStore<RoleIndexes, D> {
    pub fn get_by_name(&self, name: &str) -> Option<Role> {
        self.read(|snapshot| {
            let id = snapshot.indexes().by_name.first(name)?;
            snapshot.get(id).cloned()
        })
    }
}

#[derive(Debug, Default)]
pub struct RoleEdgeIndexes {
    by_role: Index<i64>,
    by_child: Index<i64>,
}

impl StoreIndexes for RoleEdgeIndexes {
    type Object = RoleEdge;
    type Event = RoleEdgeEvent;

    const NAME: &'static str = "role_edges";

    fn index(&mut self, edge: &RoleEdge) {
        self.by_role.insert(edge.role_id, edge.id);
        self.by_child.insert(edge.child_id, edge.id);
    }

    fn unindex(&mut self, edge: &RoleEdge) {
        self.by_role.remove(&edge.role_id, edge.id);
        self.by_child.remove(&edge.child_id, edge.id);
    }
}

pub type RoleEdgeStore<D> = CacheStore<RoleEdgeIndexes, D>;

impl<D: Database> CacheStore<RoleEdgeIndexes, D> {
    /// Edges granting children to `role_id`.
    pub fn find_by_role(&self, role_id: i64) -> Vec<RoleEdge> {
        self.read(|snapshot| snapshot.select(snapshot.indexes().by_role.get(&role_id)))
    }

    /// Edges granting `child_id` to some parent role.
    pub fn find_by_child(&self, child_id: i64) -> Vec<RoleEdge> {
        self.read(|snapshot| snapshot.select(snapshot.indexes().by_child.get(&child_id)))
    }

    /// `roots` plus every role reachable from them through edges.
    pub fn expand(&self, roots: impl IntoIterator<Item = i64>) -> BTreeSet<i64> {
        self.read(|snapshot| {
            let mut seen = BTreeSet::new();
            let mut queue: VecDeque<i64> = roots.into_iter().collect();
            while let Some(role_id) = queue.pop_front() {
                if !seen.insert(role_id) {
                    continue;
                }
                for edge_id in snapshot.indexes().by_role.get(&role_id) {
                    if let Some(edge) = snapshot.get(edge_id) {
                        queue.push_back(edge.child_id);
                    }
                }
            }
            seen
        })
    }
}
