//! Adaptive octree over the RGB cube.
//!
//! Each level of the tree halves the cube along all three axes at once, so a
//! node at level `n` covers a `256 >> n` wide subcube. Pixels are classified
//! down to the current insertion depth; the tree is then pruned bottom-up
//! until no more than `max_colors` nodes still hold pixels of their own, and
//! each of those nodes contributes the mean color of its pixels to the palette.
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to each other by index. A
//! parent owns its children through the `children` slots; the `parent` index
//! is a plain back-reference. Freed slots are recycled.

extern crate alloc;
use alloc::vec::Vec;

use log::trace;
use rgb::RGB8;

use crate::palette::ColorMap;

/// Deepest level a node can sit at: one level per bit of an 8-bit channel.
pub const MAX_TREE_DEPTH: u8 = 8;

/// Level pruning never shortens the tree below this depth.
pub const MIN_TREE_DEPTH: u8 = 2;

/// Default node budget before level pruning kicks in.
pub const DEFAULT_TREE_SIZE: usize = 65536;

const ROOT: usize = 0;

/// Midpoint of the full 8-bit range, `(255 + 1) >> 1`.
const ROOT_MIDPOINT: u8 = 128;

#[derive(Debug, Clone)]
struct Node {
    parent: usize,
    children: [Option<usize>; 8],
    /// Slot index within the parent.
    id: u8,
    level: u8,
    mid_red: u8,
    mid_green: u8,
    mid_blue: u8,
    /// Pixels classified through this node or any descendant.
    number_pixels: u64,
    /// Pixels whose classification stopped at this node.
    unique: u64,
    total_red: u64,
    total_green: u64,
    total_blue: u64,
    color_number: Option<usize>,
}

impl Node {
    fn root() -> Self {
        Self {
            parent: ROOT,
            children: [None; 8],
            id: 0,
            level: 0,
            mid_red: ROOT_MIDPOINT,
            mid_green: ROOT_MIDPOINT,
            mid_blue: ROOT_MIDPOINT,
            number_pixels: u64::MAX,
            unique: 0,
            total_red: 0,
            total_green: 0,
            total_blue: 0,
            color_number: None,
        }
    }

    fn child(parent: &Node, parent_idx: usize, id: u8, level: u8) -> Self {
        let half = (1i16 << (MAX_TREE_DEPTH - level)) >> 1;
        let shift = |mid: u8, bit: u8| -> u8 {
            if id & bit != 0 {
                (mid as i16 + half) as u8
            } else {
                (mid as i16 - half) as u8
            }
        };

        Self {
            parent: parent_idx,
            children: [None; 8],
            id,
            level,
            mid_red: shift(parent.mid_red, 1),
            mid_green: shift(parent.mid_green, 2),
            mid_blue: shift(parent.mid_blue, 4),
            number_pixels: 0,
            unique: 0,
            total_red: 0,
            total_green: 0,
            total_blue: 0,
            color_number: None,
        }
    }

    /// Child slot a color falls into. Ties go to the lower half.
    #[inline]
    fn octant(&self, color: RGB8) -> usize {
        (color.r > self.mid_red) as usize
            | ((color.g > self.mid_green) as usize) << 1
            | ((color.b > self.mid_blue) as usize) << 2
    }

    fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    fn mean(&self) -> RGB8 {
        let half = self.unique / 2;
        RGB8 {
            r: ((self.total_red + half) / self.unique) as u8,
            g: ((self.total_green + half) / self.unique) as u8,
            b: ((self.total_blue + half) / self.unique) as u8,
        }
    }
}

/// Insertion depth for a palette of `max_colors` entries:
/// `ceil(log2(max_colors))`, clamped to `[MIN_TREE_DEPTH, MAX_TREE_DEPTH]`.
pub fn initial_depth(max_colors: usize) -> u8 {
    let bits = if max_colors <= 1 {
        0
    } else {
        usize::BITS - (max_colors - 1).leading_zeros()
    };
    bits.clamp(MIN_TREE_DEPTH as u32, MAX_TREE_DEPTH as u32) as u8
}

/// The color description tree for one quantization run.
#[derive(Debug, Clone)]
pub struct Octree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    depth: u8,
    /// Live nodes, root excluded.
    node_count: usize,
    colors: usize,
    tree_size: usize,
    max_colors: usize,
    level_prunes: u32,
}

impl Octree {
    /// An empty tree targeting `max_colors` entries under a `tree_size` node budget.
    pub fn new(max_colors: usize, tree_size: usize) -> Self {
        debug_assert!(max_colors >= 1, "max_colors must be positive");
        Self {
            nodes: alloc::vec![Node::root()],
            free: Vec::new(),
            depth: initial_depth(max_colors),
            node_count: 0,
            colors: 0,
            tree_size,
            max_colors,
            level_prunes: 0,
        }
    }

    /// Current insertion depth.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Live node count, excluding the root.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Nodes currently counted as distinct output colors.
    pub fn colors(&self) -> usize {
        self.colors
    }

    pub fn max_colors(&self) -> usize {
        self.max_colors
    }

    pub fn tree_size(&self) -> usize {
        self.tree_size
    }

    /// How many times the node budget forced the tree one level shorter.
    pub fn level_prunes(&self) -> u32 {
        self.level_prunes
    }

    /// Classify one pixel, growing the tree down to the current depth.
    pub fn insert(&mut self, color: RGB8) {
        if self.node_count > self.tree_size && self.depth > MIN_TREE_DEPTH {
            self.prune_level(ROOT);
            self.depth -= 1;
            self.level_prunes += 1;
            trace!(
                "node budget {} exceeded, tree cut to depth {} ({} nodes left)",
                self.tree_size,
                self.depth,
                self.node_count
            );
        }

        let mut idx = ROOT;
        for level in 1..=self.depth {
            let id = self.nodes[idx].octant(color);
            let child = match self.nodes[idx].children[id] {
                Some(child) => child,
                None => self.add_child(idx, id, level),
            };
            self.nodes[child].number_pixels += 1;
            idx = child;
        }

        let node = &mut self.nodes[idx];
        node.unique += 1;
        node.total_red += color.r as u64;
        node.total_green += color.g as u64;
        node.total_blue += color.b as u64;
    }

    fn add_child(&mut self, parent: usize, id: usize, level: u8) -> usize {
        let node = Node::child(&self.nodes[parent], parent, id as u8, level);
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        self.nodes[parent].children[id] = Some(idx);
        self.node_count += 1;
        if level == self.depth {
            self.colors += 1;
        }
        idx
    }

    /// Detach a leaf and fold its pixel statistics into its parent.
    fn prune_child(&mut self, idx: usize) {
        debug_assert_ne!(idx, ROOT, "the root is never pruned");
        let node = &self.nodes[idx];
        debug_assert!(!node.has_children(), "pruned node still has children");

        let (parent, id) = (node.parent, node.id as usize);
        let (unique, red, green, blue) = (
            node.unique,
            node.total_red,
            node.total_green,
            node.total_blue,
        );

        let parent = &mut self.nodes[parent];
        parent.children[id] = None;
        parent.unique += unique;
        parent.total_red += red;
        parent.total_green += green;
        parent.total_blue += blue;

        self.node_count -= 1;
        self.free.push(idx);
    }

    /// Merge every node at the current depth into its parent.
    fn prune_level(&mut self, idx: usize) {
        let children = self.nodes[idx].children;
        for child in children.into_iter().flatten() {
            self.prune_level(child);
        }
        if self.nodes[idx].level == self.depth {
            self.prune_child(idx);
        }
    }

    /// One pruning pass: drop every node with at most `threshold` pixels,
    /// recount surviving colors, and return the smallest surviving pixel count.
    fn reduce(&mut self, idx: usize, threshold: u64, mut next_threshold: u64) -> u64 {
        let children = self.nodes[idx].children;
        for child in children.into_iter().flatten() {
            next_threshold = self.reduce(child, threshold, next_threshold);
        }

        let node = &self.nodes[idx];
        if idx != ROOT && node.number_pixels <= threshold {
            self.prune_child(idx);
        } else {
            if node.unique != 0 {
                self.colors += 1;
            }
            next_threshold = next_threshold.min(node.number_pixels);
        }

        next_threshold
    }

    fn count_colors(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];
        let own = (node.unique != 0) as usize;
        own + node
            .children
            .iter()
            .flatten()
            .map(|&child| self.count_colors(child))
            .sum::<usize>()
    }

    /// Threshold the first reduction pass starts from.
    pub fn initial_threshold(&self, samples: u64) -> u64 {
        (samples / (self.max_colors as u64 * 8)).max(1)
    }

    /// Prune until at most `max_colors` nodes hold pixels of their own.
    ///
    /// `samples` is the number of pixels inserted. Returns the number of
    /// passes taken.
    pub fn reduction(&mut self, samples: u64) -> u32 {
        // Level pruning moves pixels into nodes that were not counted when
        // they were created.
        if self.level_prunes > 0 {
            self.colors = self.count_colors(ROOT);
        }

        let mut threshold = self.initial_threshold(samples);
        let mut passes = 0;
        while self.colors > self.max_colors {
            self.colors = 0;
            threshold = self.reduce(ROOT, threshold, u64::MAX);
            passes += 1;
            trace!(
                "reduction pass {passes}: {} colors, {} nodes, next threshold {threshold}",
                self.colors,
                self.node_count
            );
        }
        passes
    }

    /// Build the palette from the surviving nodes and number them.
    pub fn assignment(&mut self) -> ColorMap {
        let mut colormap = ColorMap::with_len(self.colors);
        self.colors = 0;
        self.assign(ROOT, &mut colormap);
        debug_assert_eq!(self.colors, colormap.len());
        colormap
    }

    fn assign(&mut self, idx: usize, colormap: &mut ColorMap) {
        let children = self.nodes[idx].children;
        for child in children.into_iter().flatten() {
            self.assign(child, colormap);
        }

        let node = &mut self.nodes[idx];
        if node.unique != 0 {
            colormap.set(self.colors, node.mean());
            node.color_number = Some(self.colors);
            self.colors += 1;
        }
    }

    /// Palette index of the deepest numbered node on `color`'s path.
    ///
    /// `None` when no node on the path was numbered by [`Octree::assignment`].
    pub fn lookup(&self, color: RGB8) -> Option<usize> {
        let mut node = &self.nodes[ROOT];
        let mut found = node.color_number;
        while let Some(child) = node.children[node.octant(color)] {
            node = &self.nodes[child];
            if node.color_number.is_some() {
                found = node.color_number;
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(r: u8, g: u8, b: u8) -> RGB8 {
        RGB8 { r, g, b }
    }

    /// Pseudo-random colors via a multiplicative hash.
    fn noise(n: usize) -> Vec<RGB8> {
        (0..n)
            .map(|i| {
                let h = (i as u32).wrapping_mul(2654435761);
                rgb((h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8)
            })
            .collect()
    }

    impl Octree {
        fn live(&self, idx: usize, out: &mut Vec<usize>) {
            out.push(idx);
            for child in self.nodes[idx].children.into_iter().flatten() {
                self.live(child, out);
            }
        }

        fn live_nodes(&self) -> Vec<usize> {
            let mut out = Vec::new();
            self.live(ROOT, &mut out);
            out
        }

        fn subtree_unique(&self, idx: usize) -> u64 {
            let node = &self.nodes[idx];
            node.unique
                + node
                    .children
                    .iter()
                    .flatten()
                    .map(|&c| self.subtree_unique(c))
                    .sum::<u64>()
        }

        fn subtree_totals(&self, idx: usize) -> [u64; 3] {
            let node = &self.nodes[idx];
            let mut totals = [node.total_red, node.total_green, node.total_blue];
            for &child in node.children.iter().flatten() {
                let sub = self.subtree_totals(child);
                for c in 0..3 {
                    totals[c] += sub[c];
                }
            }
            totals
        }
    }

    #[test]
    fn initial_depth_is_clamped_log2() {
        assert_eq!(initial_depth(1), 2);
        assert_eq!(initial_depth(2), 2);
        assert_eq!(initial_depth(4), 2);
        assert_eq!(initial_depth(5), 3);
        assert_eq!(initial_depth(16), 4);
        assert_eq!(initial_depth(17), 5);
        assert_eq!(initial_depth(256), 8);
        assert_eq!(initial_depth(100_000), 8);
    }

    #[test]
    fn child_midpoints_follow_box_size() {
        let mut tree = Octree::new(256, DEFAULT_TREE_SIZE);
        tree.insert(rgb(0, 255, 0));

        let mut node = &tree.nodes[ROOT];
        let mut mids = Vec::new();
        while let Some(child) = node.children.iter().flatten().next() {
            node = &tree.nodes[*child];
            mids.push((node.mid_red, node.mid_green, node.level));
        }

        assert_eq!(
            mids,
            vec![
                (64, 192, 1),
                (32, 224, 2),
                (16, 240, 3),
                (8, 248, 4),
                (4, 252, 5),
                (2, 254, 6),
                (1, 255, 7),
                (1, 255, 8),
            ]
        );
    }

    #[test]
    fn ties_fall_into_lower_half() {
        let mut tree = Octree::new(4, DEFAULT_TREE_SIZE);
        tree.insert(rgb(128, 128, 128));
        tree.insert(rgb(129, 128, 128));

        let root = &tree.nodes[ROOT];
        assert!(root.children[0].is_some());
        assert!(root.children[1].is_some());
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.colors(), 2);
    }

    #[test]
    fn pixel_counts_sum_over_children() {
        let mut tree = Octree::new(64, DEFAULT_TREE_SIZE);
        for c in noise(5_000) {
            tree.insert(c);
        }

        for idx in tree.live_nodes() {
            if idx == ROOT {
                continue;
            }
            let node = &tree.nodes[idx];
            let below: u64 = node
                .children
                .iter()
                .flatten()
                .map(|&c| tree.nodes[c].number_pixels)
                .sum();
            assert_eq!(node.number_pixels, node.unique + below);
        }
        assert_eq!(tree.subtree_unique(ROOT), 5_000);
    }

    #[test]
    fn prune_level_folds_statistics_upward() {
        let pixels = noise(2_000);
        let mut tree = Octree::new(64, DEFAULT_TREE_SIZE);
        for &c in &pixels {
            tree.insert(c);
        }
        let before = tree.subtree_totals(ROOT);
        let nodes_before = tree.node_count();

        tree.prune_level(ROOT);
        tree.depth -= 1;

        assert!(tree.node_count() < nodes_before);
        assert_eq!(tree.subtree_unique(ROOT), 2_000);
        assert_eq!(tree.subtree_totals(ROOT), before);
        assert!(tree
            .live_nodes()
            .iter()
            .all(|&idx| tree.nodes[idx].level <= tree.depth()));
    }

    #[test]
    fn tiny_budget_stops_at_minimum_depth() {
        let mut tree = Octree::new(256, 0);
        for c in noise(10_000) {
            tree.insert(c);
        }
        assert_eq!(tree.depth(), MIN_TREE_DEPTH);
        assert_eq!(u32::from(MAX_TREE_DEPTH - MIN_TREE_DEPTH), tree.level_prunes());
        assert_eq!(tree.subtree_unique(ROOT), 10_000);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = Octree::new(16, 40);
        for c in noise(4_000) {
            tree.insert(c);
        }
        assert!(tree.level_prunes() > 0);
        assert_eq!(tree.nodes.len(), tree.node_count() + tree.free.len() + 1);
    }

    #[test]
    fn reduction_threshold_strictly_increases() {
        let pixels = noise(20_000);
        let mut tree = Octree::new(8, DEFAULT_TREE_SIZE);
        for &c in &pixels {
            tree.insert(c);
        }

        let mut threshold = tree.initial_threshold(pixels.len() as u64);
        let mut passes = 0;
        while tree.colors > tree.max_colors {
            tree.colors = 0;
            let next = tree.reduce(ROOT, threshold, u64::MAX);
            assert!(next > threshold, "threshold went from {threshold} to {next}");
            threshold = next;
            passes += 1;
            assert_eq!(tree.subtree_unique(ROOT), 20_000);
        }
        assert!(passes > 0);
        assert!(tree.colors() <= 8);
    }

    #[test]
    fn reduction_recounts_after_level_prunes() {
        let mut tree = Octree::new(256, 30);
        for c in noise(3_000) {
            tree.insert(c);
        }
        assert!(tree.level_prunes() > 0);

        tree.reduction(3_000);
        assert_eq!(tree.colors(), tree.count_colors(ROOT));
        let palette = tree.assignment();
        assert_eq!(palette.len(), tree.colors());
        assert!(palette.len() <= 256);
    }

    #[test]
    fn assignment_rounds_to_nearest() {
        let mut tree = Octree::new(4, DEFAULT_TREE_SIZE);
        tree.insert(rgb(10, 10, 10));
        tree.insert(rgb(11, 11, 11));
        tree.insert(rgb(10, 11, 11));

        tree.reduction(3);
        let palette = tree.assignment();
        assert_eq!(palette.len(), 1);
        // (31 + 1) / 3 = 10, (32 + 1) / 3 = 11; truncation would give 10 for green.
        assert_eq!(palette.get(0), Some(rgb(10, 11, 11)));
    }

    #[test]
    fn assignment_numbers_post_order() {
        let mut tree = Octree::new(4, DEFAULT_TREE_SIZE);
        tree.insert(rgb(250, 250, 250));
        tree.insert(rgb(5, 5, 5));

        tree.reduction(2);
        let palette = tree.assignment();
        assert_eq!(palette.get(0), Some(rgb(5, 5, 5)));
        assert_eq!(palette.get(1), Some(rgb(250, 250, 250)));
        assert_eq!(tree.lookup(rgb(0, 0, 0)), Some(0));
        assert_eq!(tree.lookup(rgb(255, 255, 255)), Some(1));
    }

    #[test]
    fn lookup_falls_back_to_colored_ancestor() {
        let mut tree = Octree::new(1, DEFAULT_TREE_SIZE);
        for _ in 0..10 {
            tree.insert(rgb(20, 20, 20));
        }
        tree.insert(rgb(40, 20, 20));
        tree.insert(rgb(200, 200, 200));

        tree.reduction(12);
        let palette = tree.assignment();
        assert_eq!(palette.len(), 1);
        assert_eq!(palette.get(0), Some(rgb(37, 35, 35)));
        assert_eq!(tree.node_count(), 0);

        for color in [rgb(20, 20, 20), rgb(200, 200, 200), rgb(0, 255, 0)] {
            assert_eq!(tree.lookup(color), Some(0));
        }
    }

    #[test]
    fn lookup_misses_uncolored_path() {
        let mut tree = Octree::new(2, DEFAULT_TREE_SIZE);
        tree.insert(rgb(20, 20, 20));
        tree.insert(rgb(200, 200, 200));

        tree.reduction(2);
        tree.assignment();
        assert_eq!(tree.lookup(rgb(20, 20, 20)), Some(0));
        // Same level-1 cube as the first pixel, but an unvisited level-2 octant.
        assert_eq!(tree.lookup(rgb(100, 20, 20)), None);
    }

    #[test]
    fn empty_tree_yields_empty_palette() {
        let mut tree = Octree::new(16, DEFAULT_TREE_SIZE);
        assert_eq!(tree.reduction(0), 0);
        let palette = tree.assignment();
        assert!(palette.is_empty());
        assert_eq!(tree.lookup(rgb(1, 2, 3)), None);
    }
}
