//! Fragment grid geometry - maps cube coordinates onto the grid of fragments

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Global sample coordinate in the cube
pub type CubePoint = [usize; 3];

/// Sample coordinate local to a single fragment
pub type LocalPoint = [usize; 3];

/// Axis of the cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Dimension {
    /// Dimension 0 (typically inline for seismic)
    Dim0 = 0,
    /// Dimension 1 (typically crossline for seismic)
    Dim1 = 1,
    /// Dimension 2 (typically depth/time for seismic)
    Dim2 = 2,
}

impl Dimension {
    /// Convert from usize index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Dimension::Dim0),
            1 => Some(Dimension::Dim1),
            2 => Some(Dimension::Dim2),
            _ => None,
        }
    }

    /// Convert to usize index
    pub fn to_index(&self) -> usize {
        *self as usize
    }
}

/// Position of a fragment in the fragment grid
///
/// The derived ordering is lexicographic over the index triple; that is the
/// order fragments are enumerated, binned, and partitioned in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FragmentId(pub [usize; 3]);

impl FragmentId {
    pub fn new(i0: usize, i1: usize, i2: usize) -> Self {
        Self([i0, i1, i2])
    }
}

impl fmt::Display for FragmentId {
    /// Canonical text form, used for blob naming and logging
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Fixed 3-D grid of fragments covering a cube
///
/// The cube is notionally padded so that whole fragments cover every extent:
/// points past the cube extent are invalid inputs, but fragment ids that
/// reach into the padding are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    cube_shape: [usize; 3],
    fragment_shape: [usize; 3],
}

impl Grid {
    /// Create a new grid
    ///
    /// Both shapes must be non-zero in every dimension.
    pub fn new(cube_shape: [usize; 3], fragment_shape: [usize; 3]) -> Result<Self> {
        if cube_shape.contains(&0) {
            return Err(PlanError::InvalidGrid(format!(
                "cube shape {:?} has a zero extent",
                cube_shape
            )));
        }
        if fragment_shape.contains(&0) {
            return Err(PlanError::InvalidGrid(format!(
                "fragment shape {:?} has a zero extent",
                fragment_shape
            )));
        }

        Ok(Self {
            cube_shape,
            fragment_shape,
        })
    }

    /// Total cube extent in samples
    pub fn cube_shape(&self) -> [usize; 3] {
        self.cube_shape
    }

    /// Extent of a single fragment
    pub fn fragment_shape(&self) -> [usize; 3] {
        self.fragment_shape
    }

    /// Number of fragments along an axis
    pub fn fragment_count(&self, dim: Dimension) -> usize {
        let i = dim.to_index();
        (self.cube_shape[i] + self.fragment_shape[i] - 1) / self.fragment_shape[i]
    }

    /// Fragment counts along all three axes
    pub fn fragment_counts(&self) -> [usize; 3] {
        [
            self.fragment_count(Dimension::Dim0),
            self.fragment_count(Dimension::Dim1),
            self.fragment_count(Dimension::Dim2),
        ]
    }

    /// The fragment a point falls in
    pub fn frag_id(&self, p: CubePoint) -> FragmentId {
        FragmentId([
            p[0] / self.fragment_shape[0],
            p[1] / self.fragment_shape[1],
            p[2] / self.fragment_shape[2],
        ])
    }

    /// Convert a global coordinate to a fragment-local one
    pub fn to_local(&self, p: CubePoint) -> LocalPoint {
        [
            p[0] % self.fragment_shape[0],
            p[1] % self.fragment_shape[1],
            p[2] % self.fragment_shape[2],
        ]
    }

    /// Reassemble a global coordinate from a fragment id and a local point
    pub fn to_global(&self, id: FragmentId, local: LocalPoint) -> CubePoint {
        [
            id.0[0] * self.fragment_shape[0] + local[0],
            id.0[1] * self.fragment_shape[1] + local[1],
            id.0[2] * self.fragment_shape[2] + local[2],
        ]
    }

    /// Row-major offset of a point in the cube
    pub fn to_offset(&self, p: CubePoint) -> usize {
        let [_, c1, c2] = self.cube_shape;
        p[0] * c1 * c2 + p[1] * c2 + p[2]
    }

    /// Enumerate every fragment intersecting the slice at `pin` along `dim`
    ///
    /// `pin` is the positional offset within the cube, not a line label. The
    /// ids come out in lexicographic order, the two remaining axes varying
    /// over their full fragment-count ranges in their natural order.
    pub fn slice(&self, dim: Dimension, pin: usize) -> Vec<FragmentId> {
        let counts = self.fragment_counts();
        let d = dim.to_index();
        let (outer, inner) = match dim {
            Dimension::Dim0 => (1, 2),
            Dimension::Dim1 => (0, 2),
            Dimension::Dim2 => (0, 1),
        };

        let mut ids = Vec::with_capacity(counts[outer] * counts[inner]);
        let mut id = [0usize; 3];
        id[d] = pin / self.fragment_shape[d];
        for i in 0..counts[outer] {
            id[outer] = i;
            for j in 0..counts[inner] {
                id[inner] = j;
                ids.push(FragmentId(id));
            }
        }

        ids
    }
}
