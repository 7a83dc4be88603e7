use std::collections::BTreeSet;
use std::fmt::Debug;
use std::ops::RangeInclusive;

/// Closed interval
pub trait Interval {
    type Endpoint: Ord + Copy + Debug;

    /// Start of the interval (inclusive)
    fn from(&self) -> Self::Endpoint;

    /// End of the interval (inclusive)
    fn until(&self) -> Self::Endpoint;
}

impl<Idx: Copy + Ord + Debug> Interval for RangeInclusive<Idx> {
    type Endpoint = Idx;

    fn from(&self) -> Idx {
        *self.start()
    }

    fn until(&self) -> Idx {
        *self.end()
    }
}

/// Static segment tree answering "which intervals contain this point?"
///
/// Nodes live in a flat arena and refer to each other by index. The leaves are the elementary
/// segments of the endpoint line: every endpoint by itself, and the open gap between consecutive
/// endpoints. Each interval is stored on the `O(log n)` nodes that canonically cover it.
#[derive(Debug)]
pub struct SegmentTree<I: Interval> {
    intervals: Vec<I>,
    elementary: Vec<Elementary<I::Endpoint>>,
    nodes: Vec<SegmentNode>,
}

#[derive(Debug, Copy, Clone)]
enum Elementary<E> {
    /// A single endpoint
    Point(E),

    /// Points strictly between two consecutive endpoints
    Between(E, E),
}

impl<E: Ord + Copy> Elementary<E> {
    /// Is the segment entirely inside the closed interval?
    fn within(&self, from: E, until: E) -> bool {
        match *self {
            Elementary::Point(e) => from <= e && e <= until,
            Elementary::Between(lo, hi) => from <= lo && hi <= until,
        }
    }

    /// Is the segment entirely below `point`?
    fn before(&self, point: E) -> bool {
        match *self {
            Elementary::Point(e) => e < point,
            Elementary::Between(_, hi) => hi <= point,
        }
    }

    /// Is the segment entirely above `point`?
    fn after(&self, point: E) -> bool {
        match *self {
            Elementary::Point(e) => e > point,
            Elementary::Between(lo, _) => lo >= point,
        }
    }
}

#[derive(Debug)]
struct SegmentNode {
    /// First elementary segment covered
    first: usize,

    /// Last elementary segment covered (inclusive)
    last: usize,

    /// Left and right children
    children: Option<(usize, usize)>,

    /// Indices of the intervals stored on this node
    intervals: Vec<usize>,
}

impl<I: Interval> SegmentTree<I> {
    /// Make a new segment tree containing all the specified intervals
    pub fn new(intervals: Vec<I>) -> SegmentTree<I> {
        let endpoints: Vec<I::Endpoint> = intervals
            .iter()
            .flat_map(|interval| [interval.from(), interval.until()])
            .collect::<BTreeSet<I::Endpoint>>()
            .into_iter()
            .collect();

        let mut elementary = vec![];
        for (idx, endpoint) in endpoints.iter().enumerate() {
            elementary.push(Elementary::Point(*endpoint));
            if let Some(next) = endpoints.get(idx + 1) {
                elementary.push(Elementary::Between(*endpoint, *next));
            }
        }

        let mut tree = SegmentTree {
            intervals: vec![],
            elementary,
            nodes: vec![],
        };
        if !tree.elementary.is_empty() {
            tree.build(0, tree.elementary.len() - 1);
        }
        for interval in intervals {
            tree.insert(interval);
        }
        tree
    }

    /// Build the (empty) subtree covering the elementary segments `first..=last`
    fn build(&mut self, first: usize, last: usize) -> usize {
        let node_idx = self.nodes.len();
        self.nodes.push(SegmentNode {
            first,
            last,
            children: None,
            intervals: vec![],
        });
        if first < last {
            let mid = (first + last) / 2;
            let left = self.build(first, mid);
            let right = self.build(mid + 1, last);
            self.nodes[node_idx].children = Some((left, right));
        }
        node_idx
    }

    fn insert(&mut self, interval: I) {
        let (from, until) = (interval.from(), interval.until());
        let interval_idx = self.intervals.len();
        self.intervals.push(interval);

        let mut to_visit = if self.nodes.is_empty() { vec![] } else { vec![0] };
        while let Some(node_idx) = to_visit.pop() {
            let node = &mut self.nodes[node_idx];
            let first = &self.elementary[node.first];
            let last = &self.elementary[node.last];
            if last.before(from) || first.after(until) {
                continue;
            }
            if first.within(from, until) && last.within(from, until) {
                node.intervals.push(interval_idx);
            } else if let Some((left, right)) = node.children {
                to_visit.push(left);
                to_visit.push(right);
            }
        }
    }

    /// Find all intervals containing the specified point
    pub fn intervals_containing(&self, point: &I::Endpoint) -> Vec<&I> {
        let point = *point;
        let mut containing = vec![];
        let root = match self.nodes.first() {
            Some(root) => root,
            None => return containing,
        };
        if self.elementary[root.first].after(point) || self.elementary[root.last].before(point) {
            return containing;
        }

        let mut node = root;
        loop {
            containing.extend(node.intervals.iter().map(|idx| &self.intervals[*idx]));
            match node.children {
                None => break,
                Some((left, right)) => {
                    let right_node = &self.nodes[right];
                    node = if self.elementary[right_node.first].after(point) {
                        &self.nodes[left]
                    } else {
                        right_node
                    };
                }
            }
        }
        containing
    }
}
