//! One quantization run: construct the tree, reduce it, assign the palette.
//!
//! A [`Session`] moves through [`Phase::Empty`], [`Phase::Constructing`],
//! [`Phase::Reducing`] and [`Phase::Assigned`] in that order. Calling an
//! operation out of order is a programming error and panics. All mutation goes
//! through `&mut self`, so a session shared between threads needs the caller's
//! own lock around the whole run.

use log::debug;
use rgb::RGB8;

use crate::octree::Octree;
use crate::palette::ColorMap;
use crate::source::PixelSource;

/// Where a [`Session`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No pixels seen yet.
    Empty,
    /// At least one pixel inserted.
    Constructing,
    /// The tree has been reduced to at most `max_colors` colors.
    Reducing,
    /// The palette is final. Terminal.
    Assigned,
}

#[derive(Debug, Clone)]
pub struct Session {
    tree: Octree,
    phase: Phase,
    samples: u64,
    colormap: ColorMap,
}

impl Session {
    /// Start a run targeting `max_colors` entries with a `tree_size` node budget.
    pub fn new(max_colors: usize, tree_size: usize) -> Self {
        Self {
            tree: Octree::new(max_colors, tree_size),
            phase: Phase::Empty,
            samples: 0,
            colormap: ColorMap::default(),
        }
    }

    /// Construct, reduce and assign in one go.
    pub fn train<S: PixelSource + ?Sized>(max_colors: usize, tree_size: usize, source: &S) -> Self {
        let mut session = Self::new(max_colors, tree_size);
        session.construct(source);
        session.reduce();
        session.assign();
        session
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Pixels inserted so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn tree(&self) -> &Octree {
        &self.tree
    }

    /// Insert one pixel.
    ///
    /// # Panics
    /// After [`Session::reduce`] has run.
    pub fn insert(&mut self, color: RGB8) {
        assert!(
            matches!(self.phase, Phase::Empty | Phase::Constructing),
            "cannot insert pixels in the {:?} phase",
            self.phase
        );
        self.phase = Phase::Constructing;
        self.samples += 1;
        self.tree.insert(color);
    }

    /// Insert every pixel `source` yields.
    pub fn construct<S: PixelSource + ?Sized>(&mut self, source: &S) {
        source.for_each_pixel(&mut |p| self.insert(p));
    }

    /// Close the pixel stream and prune the tree down to `max_colors` colors.
    ///
    /// # Panics
    /// If the session has already been reduced.
    pub fn reduce(&mut self) {
        assert!(
            matches!(self.phase, Phase::Empty | Phase::Constructing),
            "cannot reduce in the {:?} phase",
            self.phase
        );
        debug!(
            "octree built from {} samples: {} nodes, depth {}, {} colors",
            self.samples,
            self.tree.node_count(),
            self.tree.depth(),
            self.tree.colors()
        );

        let passes = self.tree.reduction(self.samples);
        self.phase = Phase::Reducing;

        debug!(
            "reduced to {} colors ({} nodes) in {passes} passes",
            self.tree.colors(),
            self.tree.node_count()
        );
    }

    /// Materialize the palette.
    ///
    /// # Panics
    /// Unless the session is in [`Phase::Reducing`].
    pub fn assign(&mut self) -> &ColorMap {
        assert_eq!(
            self.phase,
            Phase::Reducing,
            "assignment requires a reduced tree"
        );
        self.colormap = self.tree.assignment();
        self.phase = Phase::Assigned;
        debug!("assigned {} palette entries", self.colormap.len());
        &self.colormap
    }

    /// The palette, once assigned.
    pub fn colormap(&self) -> Option<&ColorMap> {
        (self.phase == Phase::Assigned).then_some(&self.colormap)
    }

    /// Take the palette out of an assigned session.
    ///
    /// # Panics
    /// Unless the session is in [`Phase::Assigned`].
    pub fn into_colormap(self) -> ColorMap {
        assert_eq!(self.phase, Phase::Assigned, "palette not assigned yet");
        self.colormap
    }

    /// Palette index for `color`.
    ///
    /// Descends the pruned tree the way insertion does and takes the deepest
    /// numbered node on the way. Colors whose path never meets a numbered
    /// node fall back to a nearest-entry search over the palette.
    ///
    /// # Panics
    /// Unless the session is in [`Phase::Assigned`].
    pub fn color_index(&self, color: RGB8) -> usize {
        assert_eq!(self.phase, Phase::Assigned, "palette not assigned yet");
        self.tree
            .lookup(color)
            .unwrap_or_else(|| self.colormap.nearest(color))
    }
}
