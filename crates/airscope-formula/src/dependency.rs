//! Dependency graph for computed fields
//!
//! An edge `A -> B` means "A's value is computed from B's value". Formula
//! fields get edges from the field references in their bound AST; rollup,
//! lookup and count fields get edges to their link field and to the field
//! they read in the linked table, so the graph can span several tables.

use crate::ast::{Expr, FieldRef};
use crate::error::{FormulaError, FormulaResult};
use crate::parser::parse_formula;
use crate::printer::FieldLabels;
use crate::resolve::bind;
use ahash::AHashMap;
use airscope_core::{Field, FieldId, FieldType, Schema, Table, TableId};
use serde::Serialize;
use std::collections::VecDeque;

/// Role of a field in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// User-entered value
    Input,
    /// Link to another table
    Link,
    /// Formula field
    Formula,
    /// Rollup over linked records
    Rollup,
    /// Lookup of a linked table's field
    Lookup,
    /// Count of linked records
    Count,
    /// Value maintained by Airtable itself (created time, autonumber, ...)
    System,
}

impl NodeKind {
    pub fn of(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Formula => NodeKind::Formula,
            FieldType::Rollup => NodeKind::Rollup,
            FieldType::Lookup | FieldType::MultipleLookupValues => NodeKind::Lookup,
            FieldType::Count => NodeKind::Count,
            FieldType::MultipleRecordLinks => NodeKind::Link,
            FieldType::CreatedTime
            | FieldType::LastModifiedTime
            | FieldType::CreatedBy
            | FieldType::LastModifiedBy
            | FieldType::AutoNumber => NodeKind::System,
            _ => NodeKind::Input,
        }
    }
}

/// A field in the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNode {
    pub id: FieldId,
    pub name: String,
    pub table_id: TableId,
    pub field_type: FieldType,
    pub kind: NodeKind,
    /// Formula text as stored in the schema
    pub formula_text: Option<String>,
    /// Parsed formula with every reference bound to an ID
    #[serde(skip)]
    pub formula: Option<Expr>,
}

impl FieldNode {
    fn from_field(table: &Table, field: &Field) -> Self {
        Self {
            id: field.id.clone(),
            name: field.name.clone(),
            table_id: table.id.clone(),
            field_type: field.field_type,
            kind: NodeKind::of(field.field_type),
            formula_text: field.formula_text().map(str::to_string),
            formula: None,
        }
    }
}

/// Dependency graph rooted at one table
///
/// Nodes are kept in insertion order: the root table's fields in schema
/// order, then fields of other tables in the order they were reached.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    table_id: TableId,
    nodes: Vec<FieldNode>,
    index: AHashMap<FieldId, usize>,
    /// Node -> nodes it reads
    precedents: Vec<Vec<usize>>,
    /// Node -> nodes that read it
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Create an empty graph for a table
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            nodes: Vec::new(),
            index: AHashMap::new(),
            precedents: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// The table this graph was built for
    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> &[FieldNode] {
        &self.nodes
    }

    /// Nodes belonging to the root table, in schema order
    pub fn table_nodes(&self) -> impl Iterator<Item = &FieldNode> {
        self.nodes.iter().filter(move |n| n.table_id == self.table_id)
    }

    /// Get a node by field ID
    pub fn node(&self, id: &str) -> Option<&FieldNode> {
        self.index.get(id).map(|&ix| &self.nodes[ix])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Bound formula of a field
    pub fn formula(&self, id: &str) -> Option<&Expr> {
        self.node(id)?.formula.as_ref()
    }

    /// Find a root-table node by name (first in schema order)
    pub fn find_by_name(&self, name: &str) -> Option<&FieldNode> {
        self.table_nodes().find(|n| n.name == name)
    }

    /// Resolve a reference as written to a node
    pub fn resolve(&self, field_ref: &FieldRef) -> Option<&FieldNode> {
        match field_ref {
            FieldRef::Id(id) => self
                .node(id.as_str())
                .or_else(|| self.find_by_name(id.as_str())),
            FieldRef::Name(name) => self.find_by_name(name),
        }
    }

    /// Fields `id` reads
    pub fn precedents(&self, id: &str) -> impl Iterator<Item = &FieldId> + '_ {
        self.index
            .get(id)
            .into_iter()
            .flat_map(move |&ix| self.precedents[ix].iter().map(move |&p| &self.nodes[p].id))
    }

    /// Fields that read `id`
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &FieldId> + '_ {
        self.index
            .get(id)
            .into_iter()
            .flat_map(move |&ix| self.dependents[ix].iter().map(move |&d| &self.nodes[d].id))
    }

    /// All edges as (reader, read) pairs
    pub fn edges(&self) -> impl Iterator<Item = (&FieldId, &FieldId)> + '_ {
        self.precedents.iter().enumerate().flat_map(move |(from, targets)| {
            targets
                .iter()
                .map(move |&to| (&self.nodes[from].id, &self.nodes[to].id))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.precedents.iter().map(Vec::len).sum()
    }

    // === Index-level access for the analyzer ===

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn node_at(&self, ix: usize) -> &FieldNode {
        &self.nodes[ix]
    }

    pub(crate) fn precedents_at(&self, ix: usize) -> &[usize] {
        &self.precedents[ix]
    }

    pub(crate) fn dependents_at(&self, ix: usize) -> &[usize] {
        &self.dependents[ix]
    }

    // === Construction ===

    /// Add a node, returning its index (existing nodes are left untouched)
    pub fn add_node(&mut self, node: FieldNode) -> usize {
        if let Some(&ix) = self.index.get(node.id.as_str()) {
            return ix;
        }
        let ix = self.nodes.len();
        self.index.insert(node.id.clone(), ix);
        self.nodes.push(node);
        self.precedents.push(Vec::new());
        self.dependents.push(Vec::new());
        ix
    }

    /// Add a dependency: `reader` reads `read`
    ///
    /// Self-loops are rejected; duplicate edges are ignored.
    pub fn add_dependency(&mut self, reader: &str, read: &str) -> FormulaResult<()> {
        if reader == read {
            return Err(FormulaError::SelfReference {
                field_id: FieldId::new(reader),
            });
        }
        let from = self
            .index_of(reader)
            .ok_or_else(|| FormulaError::UnknownField(reader.to_string()))?;
        let to = self
            .index_of(read)
            .ok_or_else(|| FormulaError::UnknownField(read.to_string()))?;
        if !self.precedents[from].contains(&to) {
            self.precedents[from].push(to);
            self.dependents[to].push(from);
        }
        Ok(())
    }
}

impl FieldLabels for DependencyGraph {
    fn field_label(&self, id: &str) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }
}

/// Field ID -> owning table and field, across the whole schema
struct FieldLocator<'s> {
    fields: AHashMap<&'s str, (&'s Table, &'s Field)>,
}

impl<'s> FieldLocator<'s> {
    fn new(table: &'s Table, schema: &'s Schema) -> Self {
        let mut fields = AHashMap::with_capacity(schema.field_count() + table.fields.len());
        for t in std::iter::once(table).chain(schema.tables.iter()) {
            for f in &t.fields {
                fields.entry(f.id.as_str()).or_insert((t, f));
            }
        }
        Self { fields }
    }

    fn get(&self, id: &str) -> Option<(&'s Table, &'s Field)> {
        self.fields.get(id).copied()
    }
}

/// Build the dependency graph of `table`
///
/// Every field of `table` becomes a node. Fields of other tables are added
/// when a rollup/lookup reaches them, and their own dependencies are followed
/// so depths stay meaningful across tables.
pub fn build_graph(table: &Table, schema: &Schema) -> FormulaResult<DependencyGraph> {
    let locator = FieldLocator::new(table, schema);
    let mut graph = DependencyGraph::new(table.id.clone());
    let mut queue: VecDeque<(&Table, &Field)> = VecDeque::new();

    for field in &table.fields {
        graph.add_node(FieldNode::from_field(table, field));
        queue.push_back((table, field));
    }

    while let Some((owner, field)) = queue.pop_front() {
        let (formula, targets) = field_dependencies(owner, field, &locator)?;

        for target in &targets {
            if target == &field.id {
                return Err(FormulaError::SelfReference {
                    field_id: field.id.clone(),
                });
            }
            if !graph.contains(target.as_str()) {
                let (target_table, target_field) =
                    locator
                        .get(target.as_str())
                        .ok_or_else(|| FormulaError::UnresolvedReference {
                            field_id: target.to_string(),
                            referenced_by: field.id.clone(),
                        })?;
                graph.add_node(FieldNode::from_field(target_table, target_field));
                queue.push_back((target_table, target_field));
            }
            graph.add_dependency(field.id.as_str(), target.as_str())?;
        }

        if let Some(ix) = graph.index_of(field.id.as_str()) {
            graph.nodes[ix].formula = formula;
        }
    }

    tracing::debug!(
        table = %table.name,
        nodes = graph.len(),
        edges = graph.edge_count(),
        "built dependency graph"
    );
    Ok(graph)
}

/// Parse + bind a field's formula and list the fields it reads
fn field_dependencies(
    owner: &Table,
    field: &Field,
    locator: &FieldLocator<'_>,
) -> FormulaResult<(Option<Expr>, Vec<FieldId>)> {
    let mut targets: Vec<FieldId> = Vec::new();
    let mut push = |id: FieldId| {
        if !targets.contains(&id) {
            targets.push(id);
        }
    };

    match field.field_type {
        FieldType::Formula => {
            let Some(text) = field.formula_text() else {
                return Ok((None, Vec::new()));
            };
            let ast = parse_formula(text).map_err(|source| FormulaError::InvalidFormula {
                field: format!("{} ({})", field.name, field.id),
                formula: text.to_string(),
                source,
            })?;
            let bound = bind(&ast, owner, &field.id)?;
            for field_ref in bound.field_refs() {
                if let Some(id) = field_ref.id() {
                    push(id.clone());
                }
            }
            tracing::trace!(field = %field.id, refs = ?targets, "bound formula");
            Ok((Some(bound), targets))
        }
        FieldType::Rollup | FieldType::Lookup | FieldType::MultipleLookupValues | FieldType::Count => {
            let unresolved = |id: &FieldId| FormulaError::UnresolvedReference {
                field_id: id.to_string(),
                referenced_by: field.id.clone(),
            };

            let mut linked_table_id = field.linked_table_id().map(str::to_string);
            if let Some(link_id) = field.record_link_field_id() {
                let link = owner.field(link_id.as_str()).ok_or_else(|| unresolved(link_id))?;
                if let Some(id) = link.linked_table_id() {
                    linked_table_id = Some(id.to_string());
                }
                push(link_id.clone());
            }

            if field.field_type != FieldType::Count {
                let foreign = field
                    .field_id_in_linked_table()
                    .into_iter()
                    .chain(field.referenced_field_ids());
                for id in foreign {
                    let (table, _) = locator.get(id.as_str()).ok_or_else(|| unresolved(id))?;
                    if let Some(expected) = &linked_table_id {
                        if table.id.as_str() != expected && table.id != owner.id {
                            tracing::warn!(
                                field = %field.id,
                                target = %id,
                                linked_table = %expected,
                                "rollup/lookup target lives outside the linked table"
                            );
                        }
                    }
                    push(id.clone());
                }
            }
            Ok((None, targets))
        }
        _ => Ok((None, targets)),
    }
}
