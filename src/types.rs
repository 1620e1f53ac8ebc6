use std::cmp::Ordering;

pub type NodeId = usize;
pub type Cost = f64;

/// Compare costs, treating incomparable values as equal. Weights are
/// non-negative and finite, so NaN never reaches the comparisons that use
/// this; infinity orders normally.
#[inline]
pub fn cmp_cost(a: Cost, b: Cost) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct State {
    pub node_id: NodeId,
    pub cost: Cost,
}

impl State {
    pub fn from(node_id: NodeId, cost: Cost) -> Self {
        Self { node_id, cost }
    }
}

// Min-heap by cost.
impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // reverse ordering for min-heap
        cmp_cost(other.cost, self.cost)
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn state_orders_as_min_heap() {
        let mut heap = BinaryHeap::new();
        heap.push(State::from(1, 4.0));
        heap.push(State::from(2, 1.5));
        heap.push(State::from(3, 3.0));
        assert_eq!(heap.pop().unwrap().node_id, 2);
        assert_eq!(heap.pop().unwrap().node_id, 3);
        assert_eq!(heap.pop().unwrap().node_id, 1);
    }
}
