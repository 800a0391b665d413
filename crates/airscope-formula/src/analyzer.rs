//! Graph analysis: depth, cycle detection and bounded traversal

use crate::dependency::{DependencyGraph, FieldNode};
use crate::error::{FormulaError, FormulaResult};
use airscope_core::FieldId;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;

/// Bounds for [`GraphAnalyzer::ancestors`] / [`GraphAnalyzer::descendants`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraversalOptions {
    /// Maximum number of hops from the start field (None = unbounded)
    pub max_depth: Option<usize>,
    /// Maximum number of fields returned, start included (None = unbounded)
    pub max_nodes: Option<usize>,
}

impl TraversalOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }
}

/// A field reached by a traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reached {
    pub field_id: FieldId,
    /// Hops from the start field
    pub distance: usize,
}

/// Result of a bounded breadth-first traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Traversal {
    pub start: FieldId,
    /// Visited fields in breadth-first order, the start first at distance 0
    pub nodes: Vec<Reached>,
    /// Whether a bound stopped the traversal before it was exhausted
    pub truncated: bool,
}

impl Traversal {
    /// Visited field IDs in order
    pub fn ids(&self) -> Vec<&FieldId> {
        self.nodes.iter().map(|r| &r.field_id).collect()
    }

    /// Hop distance of a visited field
    pub fn distance(&self, id: &str) -> Option<usize> {
        self.nodes
            .iter()
            .find(|r| r.field_id == id)
            .map(|r| r.distance)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.distance(id).is_some()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Read-only analysis over a [`DependencyGraph`]
///
/// Depths are memoized for the lifetime of the analyzer.
pub struct GraphAnalyzer<'g> {
    graph: &'g DependencyGraph,
    depths: RefCell<Vec<Option<usize>>>,
}

impl<'g> GraphAnalyzer<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            depths: RefCell::new(vec![None; graph.len()]),
        }
    }

    pub fn graph(&self) -> &'g DependencyGraph {
        self.graph
    }

    fn index(&self, id: &str) -> FormulaResult<usize> {
        self.graph
            .index_of(id)
            .ok_or_else(|| FormulaError::UnknownField(id.to_string()))
    }

    fn ids(&self, path: impl IntoIterator<Item = usize>) -> Vec<FieldId> {
        path.into_iter()
            .map(|ix| self.graph.node_at(ix).id.clone())
            .collect()
    }

    // === Depth ===

    /// Longest dependency chain below a field; 0 when it reads nothing
    ///
    /// Fails with [`FormulaError::CyclicGraph`] when a cycle is reachable.
    pub fn depth(&self, id: &str) -> FormulaResult<usize> {
        let start = self.index(id)?;
        self.depth_at(start)
    }

    fn depth_at(&self, start: usize) -> FormulaResult<usize> {
        let mut memo = self.depths.borrow_mut();
        if let Some(depth) = memo[start] {
            return Ok(depth);
        }

        let mut on_stack = vec![false; self.graph.len()];
        // (node, next precedent to visit)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        on_stack[start] = true;

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let precedents = self.graph.precedents_at(node);

            if top.1 < precedents.len() {
                let next = precedents[top.1];
                top.1 += 1;
                if memo[next].is_some() {
                    continue;
                }
                if on_stack[next] {
                    let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    let cycle = self.ids(stack[from..].iter().map(|&(n, _)| n));
                    return Err(FormulaError::CyclicGraph { cycle });
                }
                on_stack[next] = true;
                stack.push((next, 0));
            } else {
                let depth = precedents
                    .iter()
                    .map(|&p| memo[p].map_or(0, |d| d + 1))
                    .max()
                    .unwrap_or(0);
                memo[node] = Some(depth);
                on_stack[node] = false;
                stack.pop();
            }
        }

        Ok(memo[start].unwrap_or(0))
    }

    /// Depth of every root-table field, in schema order
    pub fn depths(&self) -> FormulaResult<Vec<(FieldId, usize)>> {
        self.graph
            .table_nodes()
            .map(|node| Ok((node.id.clone(), self.depth(node.id.as_str())?)))
            .collect()
    }

    /// Greatest depth among root-table fields
    pub fn max_depth(&self) -> FormulaResult<usize> {
        Ok(self
            .depths()?
            .into_iter()
            .map(|(_, d)| d)
            .max()
            .unwrap_or(0))
    }

    // === Cycles ===

    /// First cycle found by a depth-first walk over nodes in graph order
    ///
    /// The cycle is returned as a path `[a, b, c]` meaning `a -> b -> c -> a`.
    pub fn detect_cycle(&self) -> Option<Vec<FieldId>> {
        let mut marks = vec![Mark::Unvisited; self.graph.len()];

        for root in 0..self.graph.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::InProgress;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let precedents = self.graph.precedents_at(node);

                if top.1 < precedents.len() {
                    let next = precedents[top.1];
                    top.1 += 1;
                    match marks[next] {
                        Mark::Done => {}
                        Mark::InProgress => {
                            let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                            return Some(self.ids(stack[from..].iter().map(|&(n, _)| n)));
                        }
                        Mark::Unvisited => {
                            marks[next] = Mark::InProgress;
                            stack.push((next, 0));
                        }
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
        None
    }

    pub fn is_acyclic(&self) -> bool {
        self.detect_cycle().is_none()
    }

    // === Traversal ===

    /// Fields `id` depends on, transitively, nearest first
    pub fn ancestors(&self, id: &str, options: &TraversalOptions) -> FormulaResult<Traversal> {
        self.traverse(id, options, DependencyGraph::precedents_at)
    }

    /// Fields depending on `id`, transitively, nearest first
    pub fn descendants(&self, id: &str, options: &TraversalOptions) -> FormulaResult<Traversal> {
        self.traverse(id, options, DependencyGraph::dependents_at)
    }

    fn traverse(
        &self,
        id: &str,
        options: &TraversalOptions,
        neighbors: fn(&DependencyGraph, usize) -> &[usize],
    ) -> FormulaResult<Traversal> {
        let start = self.index(id)?;
        let mut visited = vec![false; self.graph.len()];
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut nodes = vec![Reached {
            field_id: self.graph.node_at(start).id.clone(),
            distance: 0,
        }];
        let mut truncated = false;
        visited[start] = true;

        'walk: while let Some((ix, distance)) = queue.pop_front() {
            let next: Vec<usize> = neighbors(self.graph, ix)
                .iter()
                .copied()
                .filter(|&n| !visited[n])
                .collect();
            if next.is_empty() {
                continue;
            }
            if options.max_depth.is_some_and(|max| distance >= max) {
                truncated = true;
                continue;
            }
            for n in next {
                if options.max_nodes.is_some_and(|max| nodes.len() >= max) {
                    truncated = true;
                    break 'walk;
                }
                visited[n] = true;
                nodes.push(Reached {
                    field_id: self.graph.node_at(n).id.clone(),
                    distance: distance + 1,
                });
                queue.push_back((n, distance + 1));
            }
        }

        Ok(Traversal {
            start: self.graph.node_at(start).id.clone(),
            nodes,
            truncated,
        })
    }

    // === Ordering ===

    /// Root-table fields in an order where every field follows the fields it
    /// reads: by depth, then schema order
    pub fn evaluation_order(&self) -> FormulaResult<Vec<&'g FieldNode>> {
        if let Some(cycle) = self.detect_cycle() {
            return Err(FormulaError::CyclicGraph { cycle });
        }
        let mut ordered: Vec<(usize, usize, &'g FieldNode)> = Vec::new();
        for (position, node) in self.graph.table_nodes().enumerate() {
            ordered.push((self.depth(node.id.as_str())?, position, node));
        }
        ordered.sort_by_key(|&(depth, position, _)| (depth, position));
        Ok(ordered.into_iter().map(|(_, _, node)| node).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::build_graph;
    use airscope_core::{Field, FieldType, Schema, Table};
    use pretty_assertions::assert_eq;

    fn graph_of(table: Table) -> DependencyGraph {
        let schema = Schema::new(vec![table.clone()]);
        build_graph(&table, &schema).unwrap()
    }

    fn orders() -> DependencyGraph {
        graph_of(
            Table::new("tblOrders", "Orders")
                .with_field(Field::formula("fldTax", "Tax", "{Total} * 0.2"))
                .with_field(Field::formula("fldTotal", "Total", "{Qty} * {Price}"))
                .with_field(Field::new("fldQty", "Qty", FieldType::Number))
                .with_field(Field::new("fldPrice", "Price", FieldType::Currency))
                .with_field(Field::formula("fldGrand", "Grand", "{Total} + {Tax}")),
        )
    }

    fn cyclic() -> DependencyGraph {
        graph_of(
            Table::new("tblC", "C")
                .with_field(Field::formula("fldX", "X", "{fldY} + 1"))
                .with_field(Field::formula("fldY", "Y", "{fldZ} + 1"))
                .with_field(Field::formula("fldZ", "Z", "{fldX} + 1"))
                .with_field(Field::new("fldFree", "Free", FieldType::Number)),
        )
    }

    #[test]
    fn test_depths() {
        let graph = orders();
        let analyzer = GraphAnalyzer::new(&graph);
        assert_eq!(analyzer.depth("fldQty").unwrap(), 0);
        assert_eq!(analyzer.depth("fldTotal").unwrap(), 1);
        assert_eq!(analyzer.depth("fldTax").unwrap(), 2);
        assert_eq!(analyzer.depth("fldGrand").unwrap(), 3);
        assert_eq!(analyzer.max_depth().unwrap(), 3);
    }

    #[test]
    fn test_depth_monotonic_along_edges() {
        let graph = orders();
        let analyzer = GraphAnalyzer::new(&graph);
        for (reader, read) in graph.edges() {
            assert!(
                analyzer.depth(reader.as_str()).unwrap() > analyzer.depth(read.as_str()).unwrap(),
                "{} -> {}",
                reader,
                read
            );
        }
    }

    #[test]
    fn test_unknown_field() {
        let graph = orders();
        let analyzer = GraphAnalyzer::new(&graph);
        assert!(matches!(
            analyzer.depth("fldNope"),
            Err(FormulaError::UnknownField(_))
        ));
    }

    #[test]
    fn test_detect_cycle() {
        let graph = cyclic();
        let analyzer = GraphAnalyzer::new(&graph);
        let mut cycle: Vec<String> = analyzer
            .detect_cycle()
            .unwrap()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        cycle.sort();
        assert_eq!(cycle, vec!["fldX", "fldY", "fldZ"]);

        // Fields off the cycle still have a depth
        assert_eq!(analyzer.depth("fldFree").unwrap(), 0);
        assert!(matches!(
            analyzer.depth("fldX"),
            Err(FormulaError::CyclicGraph { .. })
        ));
        assert!(matches!(
            analyzer.evaluation_order(),
            Err(FormulaError::CyclicGraph { .. })
        ));
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let graph = orders();
        assert_eq!(GraphAnalyzer::new(&graph).detect_cycle(), None);
    }

    #[test]
    fn test_ancestors_with_distances() {
        let graph = orders();
        let analyzer = GraphAnalyzer::new(&graph);
        let up = analyzer
            .ancestors("fldGrand", &TraversalOptions::default())
            .unwrap();
        assert_eq!(up.distance("fldGrand"), Some(0));
        assert_eq!(up.distance("fldTotal"), Some(1));
        assert_eq!(up.distance("fldTax"), Some(1));
        assert_eq!(up.distance("fldQty"), Some(2));
        assert_eq!(up.nodes.len(), 5);
        assert!(!up.truncated);
    }

    #[test]
    fn test_descendants_visit_diamond_once() {
        // Qty -> Total -> {Tax, Grand}, Tax -> Grand
        let graph = orders();
        let analyzer = GraphAnalyzer::new(&graph);
        let down = analyzer
            .descendants("fldQty", &TraversalOptions::default())
            .unwrap();
        let ids: Vec<&str> = down.ids().into_iter().map(FieldId::as_str).collect();
        assert_eq!(ids, vec!["fldQty", "fldTotal", "fldTax", "fldGrand"]);
        assert_eq!(down.distance("fldGrand"), Some(2));
    }

    #[test]
    fn test_traversal_bounds() {
        let graph = orders();
        let analyzer = GraphAnalyzer::new(&graph);

        let only_start = analyzer
            .ancestors("fldGrand", &TraversalOptions::default().with_max_depth(0))
            .unwrap();
        assert_eq!(only_start.ids(), vec![&FieldId::new("fldGrand")]);
        assert!(only_start.truncated);

        let one_hop = analyzer
            .ancestors("fldGrand", &TraversalOptions::default().with_max_depth(1))
            .unwrap();
        assert_eq!(one_hop.nodes.len(), 3);

        let capped = analyzer
            .ancestors("fldGrand", &TraversalOptions::default().with_max_nodes(2))
            .unwrap();
        assert_eq!(capped.nodes.len(), 2);
        assert!(capped.truncated);

        let leaf = analyzer
            .ancestors("fldQty", &TraversalOptions::default().with_max_depth(0))
            .unwrap();
        assert!(!leaf.truncated);
    }

    #[test]
    fn test_traversal_terminates_on_cycle() {
        let graph = cyclic();
        let analyzer = GraphAnalyzer::new(&graph);
        let up = analyzer.ancestors("fldX", &TraversalOptions::default()).unwrap();
        assert_eq!(up.nodes.len(), 3);
    }

    #[test]
    fn test_evaluation_order() {
        let graph = orders();
        let analyzer = GraphAnalyzer::new(&graph);
        let order: Vec<&str> = analyzer
            .evaluation_order()
            .unwrap()
            .into_iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(
            order,
            vec!["fldQty", "fldPrice", "fldTotal", "fldTax", "fldGrand"]
        );
    }
}
