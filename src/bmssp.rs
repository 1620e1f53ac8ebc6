// BMSSP (distance-only), implemented from
// "Breaking the Sorting Barrier for Directed Single-Source Shortest Paths"
// (Duan, Mao, Mao, Shu, Yin, April 2025) (arXiv:2504.17033v1)

use std::collections::BinaryHeap;

use fnv::{FnvHashMap, FnvHashSet};
use tracing::trace;

use crate::block_list::{BlockList, PullResult};
use crate::types::{Cost, NodeId, State};

/// 2^exp, saturating instead of wrapping for exponents past the word size.
#[inline]
fn pow2(exp: usize) -> usize {
    1usize.checked_shl(exp as u32).unwrap_or(usize::MAX)
}

/// Run `k` rounds of synchronous relaxation out of `frontier`, then pick as
/// pivots the frontier nodes rooting relaxation trees of size >= k. Returns
/// the pivots and every node visited below `bound`.
pub fn find_pivots(
    bound: Cost,
    frontier: &[NodeId],
    k: usize,
    adj: &[Vec<(NodeId, Cost)>],
    min_costs: &mut [Cost],
) -> (Vec<NodeId>, FnvHashSet<NodeId>) {
    let mut visited: FnvHashSet<NodeId> = frontier.iter().copied().collect();
    let mut parent: FnvHashMap<NodeId, NodeId> = FnvHashMap::default();
    let mut last_layer: Vec<NodeId> = frontier.to_vec();

    for _ in 0..k {
        let mut next_layer = Vec::new();
        for &u in &last_layer {
            let cost_to_u = min_costs[u];
            for &(v, w) in &adj[u] {
                let d = cost_to_u + w;
                if d <= min_costs[v] {
                    min_costs[v] = d;
                    if d < bound {
                        next_layer.push(v);
                        // Back pointers let us walk the relaxation forest to
                        // its roots afterwards; the last writer wins ties.
                        parent.insert(v, u);
                    }
                }
            }
        }
        for &v in &next_layer {
            visited.insert(v);
        }
        last_layer = next_layer;
        // Too much work for this frontier; fall back to the frontier itself.
        if visited.len() > k * frontier.len() {
            trace!(visited = visited.len(), "find_pivots short-circuit");
            return (frontier.to_vec(), visited);
        }
    }

    // Charge each leaf's walk length to the frontier root it reaches; roots
    // collecting >= k hops anchor subtrees worth recursing into.
    let mut subtree_size: FnvHashMap<NodeId, usize> = FnvHashMap::default();
    let mut pivots: FnvHashSet<NodeId> = FnvHashSet::default();
    let walk_limit = parent.len();
    for &leaf in &last_layer {
        let mut cur = leaf;
        let mut hops = 0usize;
        while let Some(&p) = parent.get(&cur) {
            cur = p;
            hops += 1;
            if hops > walk_limit {
                // Zero-weight ties can knot the parent map into a cycle.
                break;
            }
        }
        let count = subtree_size.entry(cur).or_insert(0);
        *count += hops;
        if *count >= k {
            pivots.insert(cur);
        }
    }

    trace!(pivots = pivots.len(), visited = visited.len(), "find_pivots");
    (pivots.into_iter().collect(), visited)
}

/*
* Runs at l=0 off a single closed node. Effectively a mini-Dijkstra bounded by
* `upper_bound` that stops after settling k+1 nodes.
* Returns: a new boundary B' <= upper_bound and the set of nodes complete
* below it.
*/
fn base_bmssp(
    upper_bound: Cost,
    node_id: NodeId,
    k: usize,
    adj: &[Vec<(NodeId, Cost)>],
    min_costs: &mut [Cost],
) -> (Cost, Vec<NodeId>) {
    let mut heap = BinaryHeap::new();
    let mut settled: Vec<NodeId> = Vec::new();
    let mut visited: FnvHashSet<NodeId> = FnvHashSet::default();
    let mut max_cost = min_costs[node_id];
    heap.push(State::from(node_id, max_cost));

    while let Some(State { node_id, cost }) = heap.pop() {
        if settled.len() > k {
            break;
        }
        if !visited.insert(node_id) {
            continue;
        }
        settled.push(node_id);
        max_cost = max_cost.max(cost);
        for &(v, w) in &adj[node_id] {
            let d = cost + w;
            if d <= min_costs[v] && d < upper_bound {
                min_costs[v] = d;
                heap.push(State::from(v, d));
            }
        }
    }

    if settled.len() <= k {
        (upper_bound, settled)
    } else {
        // Nodes tying the cut-off are not provably complete; keep the ones
        // strictly below it.
        let filtered: Vec<NodeId> = settled
            .iter()
            .copied()
            .filter(|&v| min_costs[v] < max_cost)
            .collect();
        if filtered.is_empty() {
            // Every settled node ties max_cost, which happens on zero-weight
            // clusters. Their distances are final (nothing pending is
            // cheaper), so certify them just past the tie instead of handing
            // the caller a set it would re-queue forever.
            (max_cost.next_up().min(upper_bound), settled)
        } else {
            (max_cost, filtered)
        }
    }
}

/*
* One recursion level: select pivots, then repeatedly pull a value-bounded
* frontier chunk from the block list, recurse a level down on it, and feed the
* resulting relaxations back in (insert for [b, B), batch-prepend for
* [B', b)).
* Returns: a new boundary B' <= upper_bound and the set of nodes complete
* below it.
*/
fn bmssp_bounded(
    level: usize,
    upper_bound: Cost,
    frontier: &[NodeId],
    k: usize,
    t: usize,
    adj: &[Vec<(NodeId, Cost)>],
    min_costs: &mut [Cost],
) -> (Cost, FnvHashSet<NodeId>) {
    if level == 0 {
        // Pulls at level 1 run with M = 1, so the base frontier is a singleton.
        debug_assert_eq!(frontier.len(), 1);
        let (bound, settled) = base_bmssp(upper_bound, frontier[0], k, adj, min_costs);
        return (bound, settled.into_iter().collect());
    }

    trace!(level, upper_bound, frontier = frontier.len(), "bmssp level");
    let (pivots, visited) = find_pivots(upper_bound, frontier, k, adj, min_costs);
    let m = pow2(t * (level - 1));
    let max_u_size = k.saturating_mul(pow2(t * level));
    let mut block_list = BlockList::new(m, upper_bound);

    let mut min_upper_bound = upper_bound;
    for &p in &pivots {
        let dist = min_costs[p];
        debug_assert!(dist <= upper_bound, "pivot {p} above bound");
        block_list.insert(p, dist);
        min_upper_bound = min_upper_bound.min(dist);
    }

    let mut u_set: FnvHashSet<NodeId> = FnvHashSet::default();
    while u_set.len() < max_u_size && !block_list.is_empty() {
        let PullResult(pulled, pulled_bound) = block_list.pull();
        let (new_bound, mut new_u_set) =
            bmssp_bounded(level - 1, pulled_bound, &pulled, k, t, adj, min_costs);
        min_upper_bound = new_bound;

        // A pulled node tying the pull boundary is already final: everything
        // still queued costs at least as much. The child cannot certify it
        // (it sits on the child's bound), so complete it here.
        for &u in &pulled {
            if min_costs[u] == pulled_bound {
                new_u_set.insert(u);
            }
        }

        for &u in &new_u_set {
            u_set.insert(u);
        }
        let mut to_prepend: Vec<(NodeId, Cost)> = Vec::new();
        for &u in &new_u_set {
            for &(v, w) in &adj[u] {
                let d = min_costs[u] + w;
                if d <= min_costs[v] {
                    min_costs[v] = d;
                    // A tie into an already-complete node must not re-queue
                    // it; zero-weight cycles would otherwise churn forever.
                    if u_set.contains(&v) {
                        continue;
                    }
                    if pulled_bound <= d && d < upper_bound {
                        block_list.insert(v, d);
                    } else if new_bound <= d && d < pulled_bound {
                        // Cheaper than anything left in the block list.
                        to_prepend.push((v, d));
                    }
                }
            }
        }

        // Pulled nodes the child did not complete go back in the same window;
        // dropping them would lose their completion entirely.
        for &u in &pulled {
            let cost = min_costs[u];
            if new_bound <= cost && cost < pulled_bound {
                to_prepend.push((u, cost));
            }
        }
        block_list.batch_prepend(to_prepend);
    }

    // Everything the pivot search visited below the final boundary is done.
    for &v in &visited {
        if min_costs[v] < min_upper_bound {
            u_set.insert(v);
        }
    }

    (min_upper_bound, u_set)
}

// Convenience entry point: all shortest-path distances from a single source.
pub fn bmssp_all(adj: &[Vec<(NodeId, Cost)>], start: NodeId) -> Vec<Cost> {
    let n = adj.len();
    let logn = if n <= 2 { 1.0 } else { (n as f64).log2() };
    let k = (logn.powf(1.0 / 3.0).floor() as usize).max(2);
    let t = (logn.powf(2.0 / 3.0).floor() as usize).max(1);
    let l = (logn / t as f64).ceil() as usize;
    trace!(n, k, t, l, "bmssp parameters");

    let mut min_costs = vec![Cost::INFINITY; n];
    min_costs[start] = 0.0;
    bmssp_bounded(l, Cost::INFINITY, &[start], k, t, adj, &mut min_costs);
    min_costs
}
