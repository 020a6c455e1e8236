//! Tree engine (spec.md §4.4). Grounded on `weetags/trees/tree.py`'s `Tree`
//! and restructured the way `ArborStorage` turns an imperative Python/SQL
//! call sequence into async methods returning `Result<_, TreeError>`.
//! Every mutation runs inside one `Engine` transaction, committed once at
//! the end, matching `ArborStorage::tree_create`'s `self.pool.begin()`
//! pattern and spec.md §5's "unit of atomicity visible to readers".

use crate::engine::Engine;
use crate::error::{Result, TreeError};
use crate::query::{Conditions, Op, OnConflict, Order, PredicateTerm, QueryCompiler};
use crate::schema::{SqlTable, TreeSchema};
use crate::value::{FieldKind, Record, Value};
use serde_json::Value as Json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Which relative of a matched node `nodes_relation_where` should fetch.
#[derive(Debug, Clone)]
pub enum Relation {
    Parent,
    Children,
    Siblings,
    Ancestors,
    Descendants { max_depth: Option<u32> },
}

/// Construction-time behaviour of a `Tree`.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Whether mutations that can orphan a subtree also sweep and delete
    /// every orphaned branch, matching the original's `self.remove_orphans
    /// = True` default.
    pub reclaim_orphans: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self { reclaim_orphans: true }
    }
}

/// `weetags/trees/tree.py`'s `info` property, supplemented beyond spec.md
/// as a cheap introspection surface the distillation dropped.
#[derive(Debug, Clone)]
pub struct TreeInfo {
    pub name: String,
    pub size: i64,
    pub depth: i64,
    pub model: HashMap<String, FieldKind>,
}

/// A handle to one persisted, synthesized tree.
pub struct Tree {
    engine: Arc<Engine>,
    schema: TreeSchema,
    options: TreeOptions,
}

impl Tree {
    pub fn new(engine: Arc<Engine>, schema: TreeSchema, options: TreeOptions) -> Self {
        Self { engine, schema, options }
    }

    pub fn schema(&self) -> &TreeSchema {
        &self.schema
    }

    fn kinds(&self) -> HashMap<String, FieldKind> {
        let mut map = HashMap::new();
        for f in self.schema.nodes.fields() {
            map.insert(f.name.clone(), f.kind);
        }
        for f in self.schema.metadata.fields() {
            map.insert(f.name.clone(), f.kind);
        }
        for index in self.schema.indexes.values() {
            if let Some(f) = index.field(&index.field_name) {
                map.insert(index.field_name.clone(), f.kind);
            }
        }
        map
    }

    // ---- reads ----------------------------------------------------------

    pub async fn node(&self, id: &str, fields: &[String]) -> Result<Option<Record>> {
        let compiler = QueryCompiler::new(&self.schema);
        let conds = Conditions::new().leaf("id", Op::Eq, id).build();
        let (sql, values) = compiler.compile_select(fields, &conds, None, Some(1))?;
        self.engine.fetch_optional(&sql, &values, &self.kinds()).await
    }

    pub async fn nodes_where(
        &self,
        conds: &[PredicateTerm],
        fields: &[String],
        order: Option<&Order>,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        let compiler = QueryCompiler::new(&self.schema);
        let (sql, values) = compiler.compile_select(fields, conds, order, limit)?;
        self.engine.fetch_all(&sql, &values, &self.kinds()).await
    }

    pub async fn root_id(&self) -> Result<Option<String>> {
        let conds = Conditions::new().leaf("is_root", Op::Eq, true).build();
        let rows = self.nodes_where(&conds, &["id".to_string()], None, Some(1)).await?;
        Ok(rows.into_iter().next().and_then(|r| text_field(&r, "id")))
    }

    pub async fn parent(&self, id: &str, fields: &[String]) -> Result<Option<Record>> {
        let node = self
            .node(id, &["id".to_string(), "parent".to_string()])
            .await?
            .ok_or_else(|| TreeError::not_found(id))?;
        match text_field(&node, "parent") {
            Some(pid) => self.node(&pid, fields).await,
            None => Ok(None),
        }
    }

    pub async fn children(&self, id: &str, fields: &[String]) -> Result<Vec<Record>> {
        let node = self
            .node(id, &["id".to_string(), "children".to_string()])
            .await?
            .ok_or_else(|| TreeError::not_found(id))?;
        let mut out = Vec::new();
        for cid in child_ids(&node)? {
            if let Some(n) = self.node(&cid, fields).await? {
                out.push(n);
            }
        }
        Ok(out)
    }

    pub async fn siblings(&self, id: &str, fields: &[String]) -> Result<Vec<Record>> {
        let node = self
            .node(id, &["id".to_string(), "parent".to_string()])
            .await?
            .ok_or_else(|| TreeError::not_found(id))?;
        let Some(parent_id) = text_field(&node, "parent") else {
            return Ok(Vec::new());
        };
        let parent_node = self
            .node(&parent_id, &["id".to_string(), "children".to_string()])
            .await?
            .ok_or_else(|| TreeError::not_found(parent_id.clone()))?;
        let mut out = Vec::new();
        for cid in child_ids(&parent_node)? {
            if cid == id {
                continue;
            }
            if let Some(n) = self.node(&cid, fields).await? {
                out.push(n);
            }
        }
        Ok(out)
    }

    pub async fn ancestors(&self, id: &str, fields: &[String]) -> Result<Vec<Record>> {
        let walk_fields = ensure_field(fields, "parent");
        let mut ancestors = Vec::new();
        let mut current = self
            .node(id, &["id".to_string(), "parent".to_string()])
            .await?
            .ok_or_else(|| TreeError::not_found(id))?;
        while let Some(pid) = text_field(&current, "parent") {
            let node = self.node(&pid, &walk_fields).await?.ok_or_else(|| TreeError::not_found(pid.clone()))?;
            ancestors.push(node.clone());
            current = node;
        }
        Ok(ancestors)
    }

    pub async fn descendants(&self, id: &str, fields: &[String], max_depth: Option<u32>) -> Result<Vec<Record>> {
        let walk_fields = ensure_field(fields, "children");
        let root = self
            .node(id, &["id".to_string(), "children".to_string()])
            .await?
            .ok_or_else(|| TreeError::not_found(id))?;

        let mut queue: VecDeque<(String, u32)> = child_ids(&root)?.into_iter().map(|c| (c, 1)).collect();
        let mut out = Vec::new();
        while let Some((cid, depth)) = queue.pop_front() {
            if let Some(max) = max_depth {
                if depth > max {
                    continue;
                }
            }
            let node = self.node(&cid, &walk_fields).await?.ok_or_else(|| TreeError::not_found(cid.clone()))?;
            for grandchild in child_ids(&node)? {
                queue.push_back((grandchild, depth + 1));
            }
            out.push(node);
        }
        Ok(out)
    }

    pub async fn orphans(&self, fields: &[String], order: Option<&Order>, limit: Option<u64>) -> Result<Vec<Record>> {
        let conds = Conditions::new().leaf("parent", Op::Is, Value::Null).build();
        let walk_fields = ensure_field(fields, "id");
        let mut nodes = self.nodes_where(&conds, &walk_fields, order, limit).await?;
        if let Some(root_id) = self.root_id().await? {
            nodes.retain(|n| text_field(n, "id").as_deref() != Some(root_id.as_str()));
        }
        Ok(nodes)
    }

    pub async fn nodes_relation_where(
        &self,
        relation: Relation,
        conds: &[PredicateTerm],
        fields: &[String],
        order: Option<&Order>,
        limit: Option<u64>,
        include_base: bool,
    ) -> Result<Vec<Vec<Record>>> {
        let matches = self.nodes_where(conds, &ensure_field(fields, "id"), order, limit).await?;
        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            let id = text_field(&m, "id").ok_or_else(|| TreeError::data_model("match missing id"))?;
            let mut group = if include_base { vec![m] } else { Vec::new() };
            let related = match &relation {
                Relation::Parent => self.parent(&id, fields).await?.into_iter().collect(),
                Relation::Children => self.children(&id, fields).await?,
                Relation::Siblings => self.siblings(&id, fields).await?,
                Relation::Ancestors => self.ancestors(&id, fields).await?,
                Relation::Descendants { max_depth } => self.descendants(&id, fields, *max_depth).await?,
            };
            group.extend(related);
            out.push(group);
        }
        Ok(out)
    }

    /// Walks both nodes up to their lowest common ancestor and splices the
    /// two walks together: `from`'s ancestor chain up to and including the
    /// LCA, followed by `to`'s ancestor chain back down to `to` itself.
    pub async fn path(&self, from: &str, to: &str, fields: &[String]) -> Result<Vec<Record>> {
        let walk_fields = ensure_field(fields, "parent");
        let from_chain = self.ancestor_chain(from, &walk_fields).await?;
        let to_chain = self.ancestor_chain(to, &walk_fields).await?;

        // Each chain is a node's unique path to the root, so the first
        // `from_chain` entry that also appears in `to_chain` is the lowest
        // common ancestor.
        let lca_from_idx = from_chain
            .iter()
            .position(|n| {
                let id = text_field(n, "id");
                id.is_some() && to_chain.iter().any(|t| text_field(t, "id") == id)
            })
            .ok_or_else(|| TreeError::invariant(format!("no common ancestor between '{from}' and '{to}'")))?;
        let lca_id = text_field(&from_chain[lca_from_idx], "id");
        let lca_to_idx = to_chain
            .iter()
            .position(|t| text_field(t, "id") == lca_id)
            .expect("lca_id was found in to_chain by construction");

        let mut path = from_chain[..=lca_from_idx].to_vec();
        path.extend(to_chain[..lca_to_idx].iter().rev().cloned());
        Ok(path)
    }

    /// `id`, then its parent, grandparent, ... up to and including the root.
    async fn ancestor_chain(&self, id: &str, walk_fields: &[String]) -> Result<Vec<Record>> {
        let mut chain = vec![self.node(id, walk_fields).await?.ok_or_else(|| TreeError::not_found(id))?];
        while let Some(pid) = text_field(chain.last().unwrap(), "parent") {
            let node = self.node(&pid, walk_fields).await?.ok_or_else(|| TreeError::not_found(pid.clone()))?;
            chain.push(node);
        }
        Ok(chain)
    }

    // ---- introspection ----------------------------------------------------

    pub async fn size(&self) -> Result<i64> {
        self.engine.scalar_i64(&format!("SELECT COUNT(*) FROM {};", self.schema.nodes.name), &[]).await
    }

    pub async fn depth(&self) -> Result<i64> {
        self.engine
            .scalar_i64(&format!("SELECT COALESCE(MAX(depth), 0) FROM {};", self.schema.metadata.name), &[])
            .await
    }

    pub async fn info(&self) -> Result<TreeInfo> {
        Ok(TreeInfo {
            name: self.schema.tree_name.clone(),
            size: self.size().await?,
            depth: self.depth().await?,
            model: self.schema.user_field_kinds(),
        })
    }

    // ---- mutations --------------------------------------------------------

    /// Validates `record` against the nodes schema, refuses a second root,
    /// and otherwise attaches it under its declared parent: dedup the
    /// parent's `children`, flip the parent's `is_leaf` off, insert the
    /// node and its metadata row in one transaction.
    pub async fn add(&self, mut record: Record) -> Result<()> {
        let id = record.get("id").and_then(Value::as_str).map(str::to_owned);
        let id = id.ok_or_else(|| TreeError::data_model("node missing 'id'"))?;

        for field in record.fields() {
            if self.schema.nodes.field(field).is_none() {
                return Err(TreeError::data_model(format!("unknown field on nodes table: {field}")));
            }
        }

        let parent_id = match record.get("parent") {
            Some(Value::Text(p)) => Some(p.clone()),
            Some(Value::Null) | None => None,
            _ => return Err(TreeError::data_model("'parent' must be a string or null")),
        };
        if record.get("children").is_none() {
            record.push("children", Value::JsonList(Vec::new()));
        }

        let compiler = QueryCompiler::new(&self.schema);
        let kinds = self.kinds();
        let mut tx = self.engine.begin().await?;

        let depth = match &parent_id {
            None => {
                let existing_root = {
                    let sql = format!("SELECT nid FROM {} WHERE is_root = 1 LIMIT 1;", self.schema.metadata.name);
                    tx.fetch_optional(&sql, &[], &kinds).await?
                };
                if existing_root.is_some() {
                    return Err(TreeError::invariant("tree already has a root"));
                }
                0
            }
            Some(pid) => {
                let sql = format!("SELECT id, children FROM {} WHERE id = ?;", self.schema.nodes.name);
                let parent_node = tx
                    .fetch_optional(&sql, &[Value::Text(pid.clone())], &kinds)
                    .await?
                    .ok_or_else(|| TreeError::not_found(pid.clone()))?;

                let mut children = child_ids(&parent_node)?;
                if !children.iter().any(|c| c == &id) {
                    children.push(id.clone());
                }
                let children_value = Value::JsonList(children.into_iter().map(Json::String).collect());

                let (sql, values) = compiler.compile_update(
                    &[("children".to_string(), children_value)],
                    &Conditions::new().leaf("id", Op::Eq, pid.clone()).build(),
                )?;
                tx.execute(&sql, &values).await?;

                let (sql, values) = compiler.compile_update(
                    &[("is_leaf".to_string(), Value::Bool(false))],
                    &Conditions::new().leaf("nid", Op::Eq, pid.clone()).build(),
                )?;
                tx.execute(&sql, &values).await?;

                let depth_sql = format!("SELECT depth FROM {} WHERE nid = ?;", self.schema.metadata.name);
                let parent_meta = tx
                    .fetch_optional(&depth_sql, &[Value::Text(pid.clone())], &kinds)
                    .await?
                    .ok_or_else(|| TreeError::not_found(pid.clone()))?;
                match parent_meta.get("depth") {
                    Some(Value::Integer(d)) => d + 1,
                    _ => return Err(TreeError::data_model("parent metadata missing depth")),
                }
            }
        };

        let (sql, values) = compiler.compile_insert(&self.schema.nodes, &record, OnConflict::None_);
        match tx.execute(&sql, &values).await {
            Ok(_) => {}
            Err(TreeError::Storage(err)) if TreeError::is_constraint_violation(&err) => {
                return Err(TreeError::invariant(format!("node with id '{id}' already exists")));
            }
            Err(err) => return Err(err),
        }

        let meta: Record = [
            ("nid".to_string(), Value::Text(id.clone())),
            ("depth".to_string(), Value::Integer(depth)),
            ("is_root".to_string(), Value::Bool(parent_id.is_none())),
            ("is_leaf".to_string(), Value::Bool(true)),
        ]
        .into_iter()
        .collect();
        let (sql, values) = compiler.compile_insert(&self.schema.metadata, &meta, OnConflict::None_);
        tx.execute(&sql, &values).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Groups setters by owning table and issues one `UPDATE` per group.
    /// Fields that are maintained by dedicated operations can't be set
    /// through this path.
    pub async fn update(&self, id: &str, setters: Vec<(String, Value)>) -> Result<u64> {
        const FORBIDDEN: &[&str] = &["id", "nid", "parent", "children", "depth", "is_root", "is_leaf"];
        for (field, _) in &setters {
            if FORBIDDEN.contains(&field.as_str()) {
                return Err(TreeError::invariant(format!("field '{field}' is maintained by dedicated operations")));
            }
        }
        if setters.is_empty() {
            return Ok(0);
        }

        let mut grouped: HashMap<String, Vec<(String, Value)>> = HashMap::new();
        for (field, value) in setters {
            let ns = self
                .schema
                .namespace(&field)
                .ok_or_else(|| TreeError::query(format!("unknown field: {field}")))?;
            grouped.entry(ns.owning_table.clone()).or_default().push((field, value));
        }

        let compiler = QueryCompiler::new(&self.schema);
        let mut tx = self.engine.begin().await?;
        let mut affected = 0u64;
        for (table, pairs) in grouped {
            let id_column = if table == self.schema.metadata.name { "nid" } else { "id" };
            let conds = Conditions::new().leaf(id_column, Op::Eq, id).build();
            let (sql, values) = compiler.compile_update(&pairs, &conds)?;
            affected += tx.execute(&sql, &values).await?;
        }
        tx.commit().await?;
        Ok(affected)
    }

    /// Detaches every child, removes `id` from its parent's `children`,
    /// deletes the node, and (if orphan reclamation is enabled) sweeps
    /// every now-orphaned branch. Refuses to delete the root.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.root_id().await?.as_deref() == Some(id) {
            return Err(TreeError::invariant("cannot delete the root node"));
        }
        self.delete_node_inner(id).await?;
        if self.options.reclaim_orphans {
            self.delete_dead_branches().await?;
        }
        Ok(())
    }

    pub async fn delete_where(&self, conds: &[PredicateTerm]) -> Result<()> {
        let matches = self.nodes_where(conds, &["id".to_string()], None, None).await?;
        let ids: Result<Vec<String>> = matches
            .iter()
            .map(|m| text_field(m, "id").ok_or_else(|| TreeError::data_model("match missing id")))
            .collect();
        let ids = ids?;

        let root_id = self.root_id().await?;
        if let Some(root_id) = &root_id {
            if ids.iter().any(|id| id == root_id) {
                return Err(TreeError::invariant("cannot delete the root node"));
            }
        }

        for id in &ids {
            self.delete_node_inner(id).await?;
        }
        if self.options.reclaim_orphans {
            self.delete_dead_branches().await?;
        }
        Ok(())
    }

    async fn delete_node_inner(&self, id: &str) -> Result<()> {
        let compiler = QueryCompiler::new(&self.schema);
        let kinds = self.kinds();
        let mut tx = self.engine.begin().await?;

        let sql = format!("SELECT id, parent, children FROM {} WHERE id = ?;", self.schema.nodes.name);
        let node = tx
            .fetch_optional(&sql, &[Value::Text(id.to_string())], &kinds)
            .await?
            .ok_or_else(|| TreeError::not_found(id))?;

        for cid in child_ids(&node)? {
            let (sql, values) = compiler.compile_update(
                &[("parent".to_string(), Value::Null)],
                &Conditions::new().leaf("id", Op::Eq, cid).build(),
            )?;
            tx.execute(&sql, &values).await?;
        }

        if let Some(parent_id) = text_field(&node, "parent") {
            let parent_sql = format!("SELECT id, children FROM {} WHERE id = ?;", self.schema.nodes.name);
            let parent_node = tx
                .fetch_optional(&parent_sql, &[Value::Text(parent_id.clone())], &kinds)
                .await?
                .ok_or_else(|| TreeError::not_found(parent_id.clone()))?;
            let mut remaining = child_ids(&parent_node)?;
            remaining.retain(|c| c != id);
            let became_leaf = remaining.is_empty();
            let children_value = Value::JsonList(remaining.into_iter().map(Json::String).collect());
            let (sql, values) = compiler.compile_update(
                &[("children".to_string(), children_value)],
                &Conditions::new().leaf("id", Op::Eq, parent_id.clone()).build(),
            )?;
            tx.execute(&sql, &values).await?;

            if became_leaf {
                let (sql, values) = compiler.compile_update(
                    &[("is_leaf".to_string(), Value::Bool(true))],
                    &Conditions::new().leaf("nid", Op::Eq, parent_id).build(),
                )?;
                tx.execute(&sql, &values).await?;
            }
        }

        let (sql, values) = compiler.compile_delete(&Conditions::new().leaf("id", Op::Eq, id).build())?;
        tx.execute(&sql, &values).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Every orphan's entire subtree, deleted. Exposed alongside
    /// `delete_orphans` (below) since the original keeps the cascading
    /// sweep and the shallow one as distinct operations.
    pub async fn delete_dead_branches(&self) -> Result<()> {
        let orphans = self.orphans(&["id".to_string()], None, None).await?;
        let compiler = QueryCompiler::new(&self.schema);
        for o in orphans {
            let oid = text_field(&o, "id").ok_or_else(|| TreeError::data_model("orphan missing id"))?;
            let descendants = self.descendants(&oid, &["id".to_string()], None).await?;

            let mut tx = self.engine.begin().await?;
            let (sql, values) = compiler.compile_delete(&Conditions::new().leaf("id", Op::Eq, oid).build())?;
            tx.execute(&sql, &values).await?;
            for d in descendants {
                let did = text_field(&d, "id").ok_or_else(|| TreeError::data_model("descendant missing id"))?;
                let (sql, values) = compiler.compile_delete(&Conditions::new().leaf("id", Op::Eq, did).build())?;
                tx.execute(&sql, &values).await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    /// Deletes every orphan directly, without cascading into its subtree.
    pub async fn delete_orphans(&self) -> Result<()> {
        let orphans = self.orphans(&["id".to_string()], None, None).await?;
        let compiler = QueryCompiler::new(&self.schema);
        let mut tx = self.engine.begin().await?;
        for o in orphans {
            let oid = text_field(&o, "id").ok_or_else(|| TreeError::data_model("orphan missing id"))?;
            let (sql, values) = compiler.compile_delete(&Conditions::new().leaf("id", Op::Eq, oid).build())?;
            tx.execute(&sql, &values).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn text_field(record: &Record, field: &str) -> Option<String> {
    match record.get(field) {
        Some(Value::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn child_ids(record: &Record) -> Result<Vec<String>> {
    match record.get("children") {
        Some(Value::JsonList(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned).ok_or_else(|| TreeError::data_model("children element is not a string")))
            .collect(),
        Some(Value::Null) | None => Ok(Vec::new()),
        _ => Err(TreeError::data_model("'children' column is not a JSONLIST")),
    }
}

fn ensure_field(fields: &[String], extra: &str) -> Vec<String> {
    if fields.is_empty() || fields.iter().any(|f| f == "*" || f == extra) {
        fields.to_vec()
    } else {
        let mut out = fields.to_vec();
        out.push(extra.to_string());
        out
    }
}
