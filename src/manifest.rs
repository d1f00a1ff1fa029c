//! Manifest document - the cube description embedded in every request

use crate::error::{PlanError, Result};
use crate::geometry::Dimension;
use serde::Deserialize;

/// Parsed manifest for a stored cube
///
/// The stored manifest carries more than the planner needs; only the
/// dimension label arrays are read, everything else in the document is
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// Coordinate labels along each axis; the array lengths give the cube
    /// extent
    pub dimensions: Vec<Vec<i64>>,
}

impl Manifest {
    /// Parse a manifest document
    ///
    /// The document must carry exactly three dimension label arrays.
    pub fn parse(doc: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_json::from_str(doc).map_err(|e| PlanError::MalformedManifest(e.to_string()))?;

        if manifest.dimensions.len() != 3 {
            return Err(PlanError::MalformedManifest(format!(
                "expected 3 dimensions, got {}",
                manifest.dimensions.len()
            )));
        }

        Ok(manifest)
    }

    /// The cube extent along each axis
    pub fn cube_shape(&self) -> [usize; 3] {
        [
            self.dimensions[0].len(),
            self.dimensions[1].len(),
            self.dimensions[2].len(),
        ]
    }

    /// Positional offset of a line label along an axis
    ///
    /// Lines are labels, not indices; the lookup is by equality.
    pub fn position_of(&self, dim: Dimension, line: i64) -> Result<usize> {
        self.dimensions[dim.to_index()]
            .iter()
            .position(|&label| label == line)
            .ok_or(PlanError::LineNotFound {
                line,
                dim: dim.to_index(),
            })
    }
}
