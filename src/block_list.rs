/*
Block data structure proposed in https://arxiv.org/pdf/2504.17033v1.

Parameterized by M, and an upper bound B over all values (assuming values are
floats) in the structure. Supported operations are Insert, BatchPrepend, and
Pull.

Insert(u, d): route the element to the D1 block with the smallest upper bound
>= d (O(log(N/M)) through the index) and split the block around its median if
it grows past M.
BatchPrepend(L): add L elements to D0, assuming they are all currently cheaper
than everything else in the structure. Oversized batches are carved into
blocks of at most ceil(M/2) by repeated median selection rather than a full
sort.
Pull: remove up to the M cheapest elements and return them with the smallest
value left behind (or B when the structure empties).

Blocks live in a slot arena keyed by a stable BlockId. D1 ordering and the
routing index are the same BTreeSet keyed by (upper_bound, block_id); D0 is a
deque with the cheapest block at the front. The locator maps each node to its
list, block, and stored value.
*/

use std::collections::{BTreeSet, VecDeque};

use hashbrown::HashMap;

use crate::types::{cmp_cost, Cost, NodeId};

type BlockId = u32;

/// Order-preserving bit transform so f64 values can key a BTreeSet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
struct OrderedCost(u64);

impl OrderedCost {
    #[inline(always)]
    fn new(f: f64) -> Self {
        debug_assert!(!f.is_nan());
        let bits = f.to_bits();
        // Transform so that integer comparison gives float ordering
        let bits = if (bits as i64) < 0 {
            !bits
        } else {
            bits | (1u64 << 63)
        };
        OrderedCost(bits)
    }

    #[inline(always)]
    fn as_f64(self) -> f64 {
        let bits = if self.0 & (1u64 << 63) != 0 {
            self.0 & !(1u64 << 63)
        } else {
            !self.0
        };
        f64::from_bits(bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListTag {
    D0,
    D1,
}

#[derive(Debug, Clone, Copy)]
struct Locator {
    tag: ListTag,
    block: BlockId,
    cost: Cost,
}

#[derive(Debug)]
struct Block {
    elems: Vec<(NodeId, Cost)>,
    upper_bound: Cost,
}

pub struct PullResult(pub Vec<NodeId>, pub Cost);

#[derive(Debug)]
pub struct BlockList {
    m: usize,
    b_global: Cost,
    blocks: Vec<Option<Block>>,
    free_ids: Vec<BlockId>,
    d0: VecDeque<BlockId>,
    d1_index: BTreeSet<(OrderedCost, BlockId)>,
    locator: HashMap<NodeId, Locator>,
}

impl BlockList {
    pub fn new(m: usize, b_global: Cost) -> Self {
        Self {
            m: m.max(1),
            b_global,
            blocks: Vec::new(),
            free_ids: Vec::new(),
            d0: VecDeque::new(),
            d1_index: BTreeSet::new(),
            locator: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.locator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locator.is_empty()
    }

    fn block(&self, id: BlockId) -> &Block {
        self.blocks[id as usize].as_ref().expect("dangling block id")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks[id as usize].as_mut().expect("dangling block id")
    }

    fn alloc_block(&mut self, upper_bound: Cost, elems: Vec<(NodeId, Cost)>) -> BlockId {
        let block = Block { elems, upper_bound };
        match self.free_ids.pop() {
            Some(id) => {
                self.blocks[id as usize] = Some(block);
                id
            }
            None => {
                let id = self.blocks.len() as BlockId;
                self.blocks.push(Some(block));
                id
            }
        }
    }

    fn free_block(&mut self, id: BlockId) {
        self.blocks[id as usize] = None;
        self.free_ids.push(id);
    }

    /// Remove a node from its block and the locator. Emptied blocks are
    /// unlinked from their list and returned to the arena.
    fn detach(&mut self, node_id: NodeId) {
        let Some(loc) = self.locator.remove(&node_id) else {
            return;
        };
        let (emptied, upper_bound) = {
            let block = self.block_mut(loc.block);
            if let Some(i) = block.elems.iter().position(|&(u, _)| u == node_id) {
                block.elems.swap_remove(i);
            }
            (block.elems.is_empty(), block.upper_bound)
        };
        if emptied {
            match loc.tag {
                ListTag::D0 => {
                    if let Some(pos) = self.d0.iter().position(|&b| b == loc.block) {
                        let _ = self.d0.remove(pos);
                    }
                }
                ListTag::D1 => {
                    self.d1_index.remove(&(OrderedCost::new(upper_bound), loc.block));
                }
            }
            self.free_block(loc.block);
        }
    }

    /// Returns whether `cost` should be stored for `node_id`, detaching any
    /// costlier entry it supersedes.
    fn update(&mut self, node_id: NodeId, cost: Cost) -> bool {
        match self.locator.get(&node_id) {
            Some(loc) if loc.cost <= cost => false,
            Some(_) => {
                self.detach(node_id);
                true
            }
            None => true,
        }
    }

    pub fn insert(&mut self, node_id: NodeId, cost: Cost) {
        debug_assert!(
            cost <= self.b_global,
            "inserted cost {} above bound {}",
            cost,
            self.b_global
        );
        if !self.update(node_id, cost) {
            return;
        }
        if self.d1_index.is_empty() {
            let id = self.alloc_block(self.b_global, Vec::new());
            self.d1_index.insert((OrderedCost::new(self.b_global), id));
        }
        // Route to the block with the smallest (upper_bound, id) >= (cost, MIN).
        let id = match self.d1_index.range((OrderedCost::new(cost), BlockId::MIN)..).next() {
            Some(&(_, id)) => id,
            None => {
                // Every bound sits below cost (the B-bounded block was emptied
                // earlier); the last block absorbs the element and its bound
                // rises to match.
                let &(ub, id) = self.d1_index.iter().next_back().expect("D1 is non-empty");
                self.d1_index.remove(&(ub, id));
                self.d1_index.insert((OrderedCost::new(cost), id));
                self.block_mut(id).upper_bound = cost;
                id
            }
        };
        self.block_mut(id).elems.push((node_id, cost));
        self.locator.insert(
            node_id,
            Locator {
                tag: ListTag::D1,
                block: id,
                cost,
            },
        );
        if self.block(id).elems.len() > self.m {
            self.split_block_d1(id);
        }
    }

    /// Split an overfull D1 block around its median. The left half keeps the
    /// block's slot and position, shrinking its bound to the left maximum; the
    /// right half moves to a fresh block inheriting the original bound.
    fn split_block_d1(&mut self, id: BlockId) {
        let (mut elems, old_ub) = {
            let block = self.block_mut(id);
            (std::mem::take(&mut block.elems), block.upper_bound)
        };
        let mid = elems.len() / 2;
        elems.select_nth_unstable_by(mid, |a, b| cmp_cost(a.1, b.1));
        let right = elems.split_off(mid);
        let left_ub = elems
            .iter()
            .map(|&(_, d)| d)
            .fold(Cost::NEG_INFINITY, Cost::max);

        self.d1_index.remove(&(OrderedCost::new(old_ub), id));
        self.d1_index.insert((OrderedCost::new(left_ub), id));
        {
            let block = self.block_mut(id);
            block.elems = elems;
            block.upper_bound = left_ub;
        }

        let right_id = self.alloc_block(old_ub, Vec::new());
        self.d1_index.insert((OrderedCost::new(old_ub), right_id));
        for &(u, d) in &right {
            self.locator.insert(
                u,
                Locator {
                    tag: ListTag::D1,
                    block: right_id,
                    cost: d,
                },
            );
        }
        self.block_mut(right_id).elems = right;
    }

    /// Add elements that are collectively cheaper than everything currently
    /// stored. The structure stays correct if the caller breaks that promise;
    /// the values simply merge at the front.
    pub fn batch_prepend(&mut self, mut elements: Vec<(NodeId, Cost)>) {
        // Keep the cheapest entry per node.
        elements.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(cmp_cost(a.1, b.1)));
        elements.dedup_by_key(|e| e.0);

        let mut fresh = Vec::with_capacity(elements.len());
        for (node_id, cost) in elements {
            if self.update(node_id, cost) {
                fresh.push((node_id, cost));
            }
        }
        if fresh.is_empty() {
            return;
        }
        if fresh.len() <= self.m {
            self.push_front_d0(fresh);
            return;
        }
        let cap = self.m.div_ceil(2);
        let mut chunks = Vec::new();
        partition_by_median(fresh, cap, &mut chunks);
        // Chunks come out in ascending value order; reverse the pushes so the
        // cheapest block ends up at the front.
        for chunk in chunks.into_iter().rev() {
            self.push_front_d0(chunk);
        }
    }

    fn push_front_d0(&mut self, elems: Vec<(NodeId, Cost)>) {
        debug_assert!(!elems.is_empty());
        let upper_bound = elems
            .iter()
            .map(|&(_, d)| d)
            .fold(Cost::NEG_INFINITY, Cost::max);
        let id = self.alloc_block(upper_bound, Vec::new());
        for &(u, d) in &elems {
            self.locator.insert(
                u,
                Locator {
                    tag: ListTag::D0,
                    block: id,
                    cost: d,
                },
            );
        }
        self.block_mut(id).elems = elems;
        self.d0.push_front(id);
    }

    /// Remove and return up to M of the cheapest elements, together with the
    /// smallest value still stored (B when the structure is drained).
    pub fn pull(&mut self) -> PullResult {
        // Walk whole blocks off the front of each list until both walks have
        // seen at least M candidates.
        let mut candidates: Vec<(NodeId, Cost)> = Vec::new();
        let mut seen_d0 = 0usize;
        for &id in &self.d0 {
            let block = self.block(id);
            candidates.extend_from_slice(&block.elems);
            seen_d0 += block.elems.len();
            if seen_d0 >= self.m {
                break;
            }
        }
        let mut seen_d1 = 0usize;
        for &(_, id) in self.d1_index.iter() {
            let block = self.block(id);
            candidates.extend_from_slice(&block.elems);
            seen_d1 += block.elems.len();
            if seen_d1 >= self.m {
                break;
            }
        }

        if candidates.is_empty() {
            return PullResult(Vec::new(), self.b_global);
        }

        let frontier: Vec<(NodeId, Cost)> = if candidates.len() <= self.m {
            candidates
        } else {
            let m = self.m;
            let strict: Vec<(NodeId, Cost)> = {
                let (smaller, nth, _) =
                    candidates.select_nth_unstable_by(m, |a, b| cmp_cost(a.1, b.1));
                let threshold = nth.1;
                smaller.iter().copied().filter(|&(_, d)| d < threshold).collect()
            };
            if strict.is_empty() {
                // Everything ties the threshold; take a full batch so the
                // caller still makes progress.
                candidates.truncate(m);
                candidates
            } else {
                strict
            }
        };

        let mut ids = Vec::with_capacity(frontier.len());
        for &(node_id, _) in &frontier {
            self.detach(node_id);
            ids.push(node_id);
        }

        let bound = if self.locator.is_empty() {
            self.b_global
        } else {
            self.front_min_cost()
        };
        PullResult(ids, bound)
    }

    // Cheapest value across the front block of each list.
    fn front_min_cost(&self) -> Cost {
        let mut best = self.b_global;
        if let Some(&id) = self.d0.front() {
            for &(_, d) in &self.block(id).elems {
                best = best.min(d);
            }
        }
        if let Some(&(_, id)) = self.d1_index.iter().next() {
            for &(_, d) in &self.block(id).elems {
                best = best.min(d);
            }
        }
        best
    }
}

/// Carve `elems` into value-ordered chunks of at most `cap` elements using
/// repeated median selection, appending them to `out` in ascending order.
fn partition_by_median(mut elems: Vec<(NodeId, Cost)>, cap: usize, out: &mut Vec<Vec<(NodeId, Cost)>>) {
    if elems.len() <= cap {
        out.push(elems);
        return;
    }
    let mid = elems.len() / 2;
    elems.select_nth_unstable_by(mid, |a, b| cmp_cost(a.1, b.1));
    let right = elems.split_off(mid);
    partition_by_median(elems, cap, out);
    partition_by_median(right, cap, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    impl BlockList {
        fn d0_block_count(&self) -> usize {
            self.d0.len()
        }

        fn d1_block_count(&self) -> usize {
            self.d1_index.len()
        }

        /// Structural audit: locator and physical placement agree, no block is
        /// empty or over capacity, D1 bounds are ordered, elements sit under
        /// their block bound.
        fn check_invariants(&self) {
            let mut seen = std::collections::HashSet::new();
            let mut physical = 0usize;
            for &id in &self.d0 {
                let block = self.block(id);
                assert!(!block.elems.is_empty(), "empty D0 block survives");
                for &(u, d) in &block.elems {
                    assert!(seen.insert(u), "node {u} appears twice");
                    let loc = self.locator.get(&u).expect("missing locator entry");
                    assert_eq!(loc.tag, ListTag::D0);
                    assert_eq!(loc.block, id);
                    assert_eq!(loc.cost, d);
                    assert!(d <= block.upper_bound, "D0 element above block bound");
                    physical += 1;
                }
            }
            let mut prev_ub = Cost::NEG_INFINITY;
            for &(key, id) in self.d1_index.iter() {
                let block = self.block(id);
                let ub = key.as_f64();
                assert!(!block.elems.is_empty(), "empty D1 block survives");
                assert!(block.elems.len() <= self.m, "D1 block over capacity");
                assert_eq!(block.upper_bound, ub, "index key disagrees with block");
                assert!(ub <= self.b_global);
                assert!(prev_ub <= ub, "D1 bounds out of order");
                prev_ub = ub;
                for &(u, d) in &block.elems {
                    assert!(seen.insert(u), "node {u} appears twice");
                    let loc = self.locator.get(&u).expect("missing locator entry");
                    assert_eq!(loc.tag, ListTag::D1);
                    assert_eq!(loc.block, id);
                    assert_eq!(loc.cost, d);
                    assert!(d <= ub, "D1 element above block bound");
                    physical += 1;
                }
            }
            assert_eq!(physical, self.locator.len(), "locator count mismatch");
        }

        fn drain_all(&mut self) -> Vec<Vec<NodeId>> {
            let mut batches = Vec::new();
            while !self.is_empty() {
                let PullResult(frontier, _) = self.pull();
                assert!(!frontier.is_empty(), "pull made no progress");
                batches.push(frontier);
            }
            batches
        }
    }

    #[test]
    fn ordered_cost_round_trips() {
        for v in [0.0, 1.5, 123456.75, f64::INFINITY] {
            assert_eq!(OrderedCost::new(v).as_f64(), v);
        }
        assert!(OrderedCost::new(1.0) < OrderedCost::new(2.0));
        assert!(OrderedCost::new(2.0) < OrderedCost::new(f64::INFINITY));
    }

    #[test]
    fn basic_insert_and_pull() {
        let mut bl = BlockList::new(5, 100.0);
        bl.insert(1, 10.0);
        bl.insert(2, 20.0);
        bl.insert(3, 5.0);
        bl.check_invariants();

        let PullResult(frontier, bound) = bl.pull();
        assert_eq!(frontier.len(), 3);
        assert!(frontier.contains(&3));
        assert_eq!(bound, 100.0);
        assert!(bl.is_empty());
    }

    #[test]
    fn duplicate_key_keeps_minimum() {
        let mut bl = BlockList::new(5, 100.0);
        bl.insert(1, 50.0);
        bl.insert(1, 30.0);
        bl.insert(1, 40.0); // worse than 30, ignored
        assert_eq!(bl.len(), 1);
        bl.check_invariants();

        let PullResult(frontier, _) = bl.pull();
        assert_eq!(frontier, vec![1]);
        assert!(bl.is_empty());
    }

    #[test]
    fn mixed_operations_pull_cheapest_first() {
        let mut bl = BlockList::new(3, 100.0);
        bl.insert(1, 50.0);
        bl.insert(2, 30.0);
        bl.batch_prepend(vec![(3, 10.0), (4, 5.0)]);
        bl.insert(5, 25.0);
        bl.check_invariants();

        let costs = |u: NodeId| [0.0, 50.0, 30.0, 10.0, 5.0, 25.0][u];
        let PullResult(frontier, _) = bl.pull();
        assert!(frontier.len() <= 3);
        assert!(frontier.contains(&4));
        assert!(frontier.contains(&3));
        assert!(frontier.iter().all(|&u| costs(u) <= 25.0));
        bl.check_invariants();

        let mut all: Vec<NodeId> = frontier;
        for batch in bl.drain_all() {
            all.extend(batch);
        }
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn prepend_and_insert_block_layout() {
        let mut bl = BlockList::new(3, 100.0);
        bl.insert(30, 30.0);
        bl.insert(10, 10.0);
        bl.batch_prepend(vec![(8, 8.0), (7, 7.0), (9, 9.0)]);
        bl.insert(50, 50.0);
        bl.insert(60, 60.0);
        bl.batch_prepend(vec![(1, 1.0), (3, 3.0), (2, 2.0), (4, 4.0)]);
        bl.check_invariants();

        // D0: [1, 2] [3, 4] [7, 8, 9]; D1 split once under the 4th insert.
        assert_eq!(bl.d0_block_count(), 3);
        assert_eq!(bl.d1_block_count(), 2);
        assert_eq!(bl.len(), 9);

        // Batches must come out in non-decreasing value order.
        let cost_of = |u: NodeId| u as Cost;
        let mut prev_max = Cost::NEG_INFINITY;
        for batch in bl.drain_all() {
            let lo = batch.iter().map(|&u| cost_of(u)).fold(Cost::INFINITY, Cost::min);
            let hi = batch.iter().map(|&u| cost_of(u)).fold(Cost::NEG_INFINITY, Cost::max);
            assert!(prev_max <= lo, "batch overlaps its predecessor");
            prev_max = hi;
        }
    }

    #[test]
    fn oversized_batch_prepend_is_chunked() {
        let mut bl = BlockList::new(5, 100.0);
        let batch: Vec<(NodeId, Cost)> = (0..20).map(|i| (i, i as Cost)).collect();
        bl.batch_prepend(batch);
        bl.check_invariants();
        assert!(bl.d0_block_count() > 1);

        let PullResult(frontier, bound) = bl.pull();
        assert_eq!(frontier.len(), 5);
        assert!(frontier.iter().all(|&u| u < 5), "pulled {frontier:?}");
        assert_eq!(bound, 5.0);
        bl.check_invariants();
    }

    #[test]
    fn batch_prepend_dedups_to_minimum() {
        let mut bl = BlockList::new(5, 100.0);
        bl.batch_prepend(vec![(1, 10.0), (1, 5.0), (1, 15.0), (2, 20.0)]);
        assert_eq!(bl.len(), 2);
        bl.check_invariants();

        let PullResult(frontier, _) = bl.pull();
        let mut frontier = frontier;
        frontier.sort_unstable();
        assert_eq!(frontier, vec![1, 2]);
    }

    #[test]
    fn update_moves_between_lists() {
        let mut bl = BlockList::new(5, 100.0);
        bl.batch_prepend(vec![(1, 50.0)]);
        bl.insert(1, 30.0); // leaves D0, lands in D1
        bl.check_invariants();
        assert_eq!(bl.len(), 1);
        assert_eq!(bl.d0_block_count(), 0);

        let PullResult(frontier, _) = bl.pull();
        assert_eq!(frontier, vec![1]);

        bl.insert(1, 50.0);
        bl.insert(2, 60.0);
        bl.batch_prepend(vec![(1, 10.0), (3, 15.0)]); // overwrites the D1 entry
        bl.check_invariants();
        let mut all: Vec<NodeId> = bl.drain_all().into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn splitting_preserves_order_across_pulls() {
        let mut bl = BlockList::new(4, 100.0);
        for i in 0..10usize {
            bl.insert(i, (10 - i) as Cost);
        }
        bl.check_invariants();
        assert!(bl.d1_block_count() > 1, "descending inserts must split");

        let cost_of = |u: NodeId| (10 - u) as Cost;
        let mut pulled = Vec::new();
        let mut prev_bound = Cost::NEG_INFINITY;
        while !bl.is_empty() {
            let PullResult(frontier, bound) = bl.pull();
            let hi = frontier.iter().map(|&u| cost_of(u)).fold(Cost::NEG_INFINITY, Cost::max);
            let lo = frontier.iter().map(|&u| cost_of(u)).fold(Cost::INFINITY, Cost::min);
            assert!(hi <= bound, "pulled value above returned bound");
            assert!(prev_bound <= lo, "pull dipped below an earlier bound");
            prev_bound = bound;
            pulled.extend(frontier);
            bl.check_invariants();
        }
        pulled.sort_unstable();
        assert_eq!(pulled, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn pull_bounds_are_monotone() {
        let mut bl = BlockList::new(3, 1000.0);
        for i in 0..10usize {
            bl.insert(i, (i * 10) as Cost);
        }
        let mut prev = Cost::NEG_INFINITY;
        while !bl.is_empty() {
            let PullResult(_, bound) = bl.pull();
            assert!(prev <= bound, "bounds regressed");
            assert!(bound <= 1000.0);
            prev = bound;
        }
    }

    #[test]
    fn m_equals_one_drains_in_singletons() {
        let mut bl = BlockList::new(1, 100.0);
        for i in 0..5usize {
            bl.insert(i, i as Cost);
        }
        bl.check_invariants();
        let batches = bl.drain_all();
        assert!(batches.iter().all(|b| b.len() == 1));
        assert_eq!(batches.len(), 5);
        assert_eq!(batches.concat(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_structure_operations() {
        let mut bl = BlockList::new(5, 100.0);
        assert!(bl.is_empty());
        let PullResult(frontier, bound) = bl.pull();
        assert!(frontier.is_empty());
        assert_eq!(bound, 100.0);

        bl.insert(1, 10.0);
        assert!(!bl.is_empty());
        assert_eq!(bl.len(), 1);
    }

    #[test]
    fn all_ties_still_make_progress() {
        let mut bl = BlockList::new(2, 100.0);
        for i in 0..7usize {
            bl.insert(i, 42.0);
        }
        bl.check_invariants();
        let batches = bl.drain_all();
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 7);
        assert!(batches.iter().all(|b| b.len() <= 2));
    }

    #[test]
    fn random_operation_stress() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(12345);
        let mut bl = BlockList::new(8, 200.0);
        let mut expected = std::collections::HashSet::new();

        for round in 0..6 {
            for _ in 0..25 {
                let key = rng.gen_range(0..120usize);
                let cost = rng.gen_range(10.0..100.0);
                bl.insert(key, cost);
                expected.insert(key);
            }
            let batch: Vec<(NodeId, Cost)> = (0..10)
                .map(|_| {
                    let key = 200 + rng.gen_range(0..60usize);
                    (key, rng.gen_range(0.0..10.0))
                })
                .collect();
            for &(key, _) in &batch {
                expected.insert(key);
            }
            bl.batch_prepend(batch);
            bl.check_invariants();

            if round % 2 == 1 {
                let PullResult(frontier, _) = bl.pull();
                for u in frontier {
                    expected.remove(&u);
                }
                bl.check_invariants();
            }
        }

        let mut pulled: Vec<NodeId> = bl.drain_all().into_iter().flatten().collect();
        pulled.sort_unstable();
        let mut want: Vec<NodeId> = expected.into_iter().collect();
        want.sort_unstable();
        assert_eq!(pulled, want);
    }
}
