use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// The minimal interface the dominance, loop, and dataflow code needs from a graph: a successor
/// relation, split into `Graph`/`InvertibleGraph` the way `hir/src/ir/cfg.rs` does it so the same
/// traversal code runs over a CFG or, via [`Inverse`], over its reverse.
pub trait Graph {
    type Node: Copy + Eq + std::hash::Hash + std::fmt::Debug;

    fn successors(&self, node: Self::Node) -> SmallVec<[Self::Node; 4]>;
}

/// A [`Graph`] whose predecessor relation is also available, letting callers traverse it backward
/// without recomputing the reverse edge set.
pub trait InvertibleGraph: Graph {
    fn predecessors(&self, node: Self::Node) -> SmallVec<[Self::Node; 4]>;
}

/// Presents `G`'s predecessor relation as a successor relation and vice versa. Used by the
/// backward dataflow solver and by dominance-frontier computation so one forward algorithm serves
/// both directions.
pub struct Inverse<'g, G>(pub &'g G);

impl<G: InvertibleGraph> Graph for Inverse<'_, G> {
    type Node = G::Node;

    fn successors(&self, node: Self::Node) -> SmallVec<[Self::Node; 4]> {
        self.0.predecessors(node)
    }
}

impl<G: InvertibleGraph> InvertibleGraph for Inverse<'_, G> {
    fn predecessors(&self, node: Self::Node) -> SmallVec<[Self::Node; 4]> {
        self.0.successors(node)
    }
}

/// Iterative (non-recursive) postorder DFS from `entry`, returned in reverse-postorder: a valid
/// forward topological order for any reducible-enough graph, used to seed the dominator fixpoint
/// and the worklist solver's initial processing order.
pub fn reverse_postorder<G: Graph>(graph: &G, entry: G::Node) -> Vec<G::Node> {
    let mut visited: FxHashSet<G::Node> = FxHashSet::default();
    let mut postorder = Vec::new();
    let mut stack: Vec<(G::Node, bool)> = vec![(entry, false)];
    visited.insert(entry);

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            postorder.push(node);
            continue;
        }
        stack.push((node, true));
        for succ in graph.successors(node) {
            if visited.insert(succ) {
                stack.push((succ, false));
            }
        }
    }

    postorder.reverse();
    postorder
}

/// All nodes reachable from `entry`, inclusive.
pub fn reachable_from<G: Graph>(graph: &G, entry: G::Node) -> FxHashSet<G::Node> {
    let mut visited = FxHashSet::default();
    let mut stack = vec![entry];
    visited.insert(entry);
    while let Some(node) = stack.pop() {
        for succ in graph.successors(node) {
            if visited.insert(succ) {
                stack.push(succ);
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHashMap;

    struct Toy(FxHashMap<u32, Vec<u32>>);

    impl Graph for Toy {
        type Node = u32;
        fn successors(&self, node: u32) -> SmallVec<[u32; 4]> {
            self.0.get(&node).cloned().unwrap_or_default().into()
        }
    }

    #[test]
    fn rpo_visits_entry_first() {
        let mut edges = FxHashMap::default();
        edges.insert(0, vec![1, 2]);
        edges.insert(1, vec![3]);
        edges.insert(2, vec![3]);
        edges.insert(3, vec![]);
        let g = Toy(edges);
        let order = reverse_postorder(&g, 0);
        assert_eq!(order[0], 0);
        assert_eq!(*order.last().unwrap(), 3);
    }
}
