//! Cycle collection
//!
//! Reference counting frees acyclic garbage on its own. Objects that point
//! at each other keep their counts above zero forever, so a synchronous
//! trial-deletion pass finds them:
//!
//! - every live object, and every reference cell and array reachable from
//!   one, becomes a node
//! - edges between nodes are counted; a node whose strong count is larger
//!   than its internal edge count is referenced from outside the graph
//!   (a frame, a static property, a constant pool) and is a root
//! - everything reachable from a root survives, the remaining objects are
//!   garbage
//!
//! ## References
//!
//! - PHP's synchronous cycle collector: `$PHP_SRC_PATH/Zend/zend_gc.c`
//! - Bacon & Rajan, "Concurrent Cycle Collection in Reference Counted Systems"

use crate::core::heap::ObjectStore;
use crate::core::value::{ArrayData, ObjectRef, Reference, Tracer, Val};
use std::collections::HashMap;
use std::rc::Rc;

enum Node {
    Object(ObjectRef),
    Cell(Reference),
    Array(Rc<ArrayData>),
}

impl Node {
    fn strong_count(&self) -> usize {
        match self {
            Node::Object(o) => o.strong_count(),
            Node::Cell(c) => c.strong_count(),
            Node::Array(a) => Rc::strong_count(a),
        }
    }
}

#[derive(Default)]
struct Graph {
    nodes: Vec<Node>,
    index: HashMap<usize, usize>,
    internal: Vec<usize>,
    edges: Vec<Vec<usize>>,
    /// Edges found while tracing the node currently being expanded
    scratch: Vec<usize>,
}

impl Graph {
    fn add(&mut self, addr: usize, make: impl FnOnce() -> Node) -> usize {
        if let Some(&idx) = self.index.get(&addr) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(make());
        self.index.insert(addr, idx);
        self.internal.push(0);
        self.edges.push(Vec::new());
        idx
    }

    fn edge(&mut self, target: usize) {
        self.internal[target] += 1;
        self.scratch.push(target);
    }
}

impl Tracer for Graph {
    fn value(&mut self, val: &Val) {
        match val {
            Val::Object(obj) => self.object(obj),
            Val::Ref(cell) => self.cell(cell),
            Val::Array(arr) => {
                let addr = Rc::as_ptr(arr) as *const () as usize;
                let idx = self.add(addr, || Node::Array(Rc::clone(arr)));
                self.edge(idx);
            }
            _ => {}
        }
    }

    fn cell(&mut self, cell: &Reference) {
        let idx = self.add(cell.addr(), || Node::Cell(cell.clone()));
        self.edge(idx);
    }

    fn object(&mut self, obj: &ObjectRef) {
        let idx = self.add(obj.addr(), || Node::Object(obj.clone()));
        self.edge(idx);
    }
}

fn expand(graph: &mut Graph, idx: usize) {
    graph.scratch.clear();
    match &graph.nodes[idx] {
        Node::Object(obj) => {
            let obj = obj.clone();
            if let Some(data) = obj.try_borrow() {
                for val in data.properties.values() {
                    graph.value(val);
                }
                if let Some(internal) = &data.internal {
                    internal.trace(graph);
                }
            }
        }
        Node::Cell(cell) => {
            let cell = cell.clone();
            if let Some(val) = cell.try_borrow() {
                graph.value(&val);
            }
        }
        Node::Array(arr) => {
            let arr = Rc::clone(arr);
            for val in arr.map.values() {
                graph.value(val);
            }
        }
    }
    graph.edges[idx] = std::mem::take(&mut graph.scratch);
}

/// Finds objects kept alive only by reference cycles.
pub fn find_garbage(store: &ObjectStore) -> Vec<ObjectRef> {
    let mut graph = Graph::default();
    for obj in store.live_objects() {
        graph.add(obj.addr(), || Node::Object(obj.clone()));
    }

    let mut next = 0;
    while next < graph.nodes.len() {
        expand(&mut graph, next);
        next += 1;
    }

    // Our own node table holds one handle per node.
    let mut live = vec![false; graph.nodes.len()];
    let mut work: Vec<usize> = (0..graph.nodes.len())
        .filter(|&i| graph.nodes[i].strong_count() > graph.internal[i] + 1)
        .collect();
    for &i in &work {
        live[i] = true;
    }
    while let Some(i) = work.pop() {
        for &target in &graph.edges[i] {
            if !live[target] {
                live[target] = true;
                work.push(target);
            }
        }
    }

    graph
        .nodes
        .iter()
        .enumerate()
        .filter(|(i, _)| !live[*i])
        .filter_map(|(_, node)| match node {
            Node::Object(obj) => Some(obj.clone()),
            _ => None,
        })
        .collect()
}

/// Drops the properties and native state of garbage objects so the
/// reference counts in the cycle can reach zero.
pub fn break_cycles(garbage: &[ObjectRef]) {
    for obj in garbage {
        obj.mark_destructed();
        let (props, internal) = {
            let mut data = obj.borrow_mut();
            (
                std::mem::take(&mut data.properties),
                data.internal.take(),
            )
        };
        drop(props);
        drop(internal);
    }
}
