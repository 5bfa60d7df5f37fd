//! Strongly-connected-component cycle detection.
//!
//! One linear-time Tarjan pass over the subgraph induced by a node set. The
//! walk keeps an explicit call stack so graphs with very long reference
//! chains do not exhaust the thread stack. Used for manifest module graphs
//! and for file/package import graphs.

use std::collections::HashMap;
use std::hash::Hash;

struct Tarjan {
    adjacency: Vec<Vec<usize>>,
    self_loop: Vec<bool>,
    index_of: Vec<Option<usize>>,
    low_link: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    counter: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan {
    fn visit(&mut self, node: usize) {
        self.index_of[node] = Some(self.counter);
        self.low_link[node] = self.counter;
        self.counter += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
    }

    fn strong_connect(&mut self, start: usize) {
        // (node, next successor position)
        let mut call_stack: Vec<(usize, usize)> = vec![(start, 0)];
        self.visit(start);

        while let Some(&(node, next)) = call_stack.last() {
            if next < self.adjacency[node].len() {
                if let Some(frame) = call_stack.last_mut() {
                    frame.1 += 1;
                }
                let successor = self.adjacency[node][next];
                match self.index_of[successor] {
                    None => {
                        self.visit(successor);
                        call_stack.push((successor, 0));
                    }
                    Some(successor_index) if self.on_stack[successor] => {
                        self.low_link[node] = self.low_link[node].min(successor_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                self.low_link[parent] = self.low_link[parent].min(self.low_link[node]);
            }
            if Some(self.low_link[node]) == self.index_of[node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                // Stack order is discovery order reversed.
                component.reverse();
                if component.len() > 1 || self.self_loop[node] {
                    self.components.push(component);
                }
            }
        }
    }
}

/// Every strongly connected component of size two or more, plus every
/// single node with an edge to itself. Successors outside `nodes` are
/// ignored. For a fixed iteration order of `nodes` and of each successor
/// list the output is identical across runs; members of a component are
/// listed in discovery order.
pub fn find_cycles<N, I, F>(nodes: impl IntoIterator<Item = N>, mut successors: F) -> Vec<Vec<N>>
where
    N: Clone + Eq + Hash,
    I: IntoIterator<Item = N>,
    F: FnMut(&N) -> I,
{
    let mut ordered: Vec<N> = Vec::new();
    let mut position: HashMap<N, usize> = HashMap::new();
    for node in nodes {
        if !position.contains_key(&node) {
            position.insert(node.clone(), ordered.len());
            ordered.push(node);
        }
    }

    let mut adjacency = Vec::with_capacity(ordered.len());
    let mut self_loop = vec![false; ordered.len()];
    for (index, node) in ordered.iter().enumerate() {
        let targets: Vec<usize> = successors(node)
            .into_iter()
            .filter_map(|target| position.get(&target).copied())
            .collect();
        self_loop[index] = targets.contains(&index);
        adjacency.push(targets);
    }

    let count = ordered.len();
    let mut tarjan = Tarjan {
        adjacency,
        self_loop,
        index_of: vec![None; count],
        low_link: vec![0; count],
        on_stack: vec![false; count],
        stack: Vec::new(),
        counter: 0,
        components: Vec::new(),
    };
    for start in 0..count {
        if tarjan.index_of[start].is_none() {
            tarjan.strong_connect(start);
        }
    }

    tarjan
        .components
        .into_iter()
        .map(|component| component.into_iter().map(|i| ordered[i].clone()).collect())
        .collect()
}
