//! Bounding-interval hierarchy over scalar `[min, max]` ranges.
//!
//! Used for both per-domain extents ([`IntervalTree`](crate::IntervalTree)) and per-cell
//! ranges (the scalar range tree of the contour crate). Items are split at the median of
//! their range midpoints; each node stores the union of its items' ranges so a stabbing
//! query can skip whole subtrees.

/// Items per leaf.
const LEAF_SIZE: usize = 8;

const NO_CHILD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    lo: f64,
    hi: f64,
    /// Range into `RangeIndex::order`.
    start: u32,
    end: u32,
    left: u32,
    right: u32,
}

/// A static stabbing-query index over `[min, max]` ranges.
#[derive(Debug, Clone, Default)]
pub struct RangeIndex {
    ranges: Vec<[f64; 2]>,
    order: Vec<u32>,
    nodes: Vec<Node>,
}

impl RangeIndex {
    /// Builds the index. Item `i` is `ranges[i]`; ranges with a NaN bound never match.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(ranges: Vec<[f64; 2]>) -> Self {
        let mut order: Vec<u32> = (0..ranges.len() as u32)
            .filter(|&i| {
                let [lo, hi] = ranges[i as usize];
                !lo.is_nan() && !hi.is_nan()
            })
            .collect();
        let mut nodes = Vec::with_capacity(2 * order.len() / LEAF_SIZE + 1);
        if !order.is_empty() {
            let len = order.len();
            build_node(&ranges, &mut order, 0, len, &mut nodes);
        }
        Self {
            ranges,
            order,
            nodes,
        }
    }

    /// Returns the number of indexed items (including never-matching ones).
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the range of item `i`.
    pub fn range(&self, i: usize) -> [f64; 2] {
        self.ranges[i]
    }

    /// Returns the union of all ranges, or `None` if nothing is indexed.
    pub fn extents(&self) -> Option<(f64, f64)> {
        self.nodes.first().map(|n| (n.lo, n.hi))
    }

    /// Appends to `out` every item whose range contains `value`, in ascending item order.
    pub fn stab(&self, value: f64, out: &mut Vec<u32>) {
        let first = out.len();
        if self.nodes.is_empty() || value.is_nan() {
            return;
        }
        let mut stack = vec![0_u32];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            if value < node.lo || value > node.hi {
                continue;
            }
            if node.left == NO_CHILD {
                for &item in &self.order[node.start as usize..node.end as usize] {
                    let [lo, hi] = self.ranges[item as usize];
                    if lo <= value && value <= hi {
                        out.push(item);
                    }
                }
            } else {
                stack.push(node.right);
                stack.push(node.left);
            }
        }
        out[first..].sort_unstable();
    }
}

#[allow(clippy::cast_possible_truncation)]
fn build_node(
    ranges: &[[f64; 2]],
    order: &mut [u32],
    start: usize,
    end: usize,
    nodes: &mut Vec<Node>,
) -> u32 {
    let (lo, hi) = order[start..end].iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), &i| {
            let [a, b] = ranges[i as usize];
            (lo.min(a), hi.max(b))
        },
    );
    let idx = nodes.len() as u32;
    nodes.push(Node {
        lo,
        hi,
        start: start as u32,
        end: end as u32,
        left: NO_CHILD,
        right: NO_CHILD,
    });
    if end - start <= LEAF_SIZE {
        return idx;
    }

    let mid = start + (end - start) / 2;
    let midpoint = |i: u32| {
        let [a, b] = ranges[i as usize];
        0.5 * (a + b)
    };
    order[start..end].select_nth_unstable_by(mid - start, |&a, &b| {
        midpoint(a).total_cmp(&midpoint(b))
    });
    let left = build_node(ranges, order, start, mid, nodes);
    let right = build_node(ranges, order, mid, end, nodes);
    nodes[idx as usize].left = left;
    nodes[idx as usize].right = right;
    idx
}
