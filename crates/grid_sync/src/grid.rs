//! Grid ownership: which identity painted each cell last.
//!
//! The world is finite, so ownership lives in a fixed `cols × rows` array
//! indexed by coordinate instead of a growing map. Cells are only ever
//! overwritten, never cleared; the most recent painter wins.

use crate::types::{Identity, Position, WorldBounds};

/// Returned when a coordinate falls outside the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cell {at} is outside the {cols}x{rows} world")]
pub struct OutOfBounds {
    pub at: Position,
    pub cols: u32,
    pub rows: u32,
}

/// Owner of every painted cell in the world.
#[derive(Debug, Clone)]
pub struct GridOwnership {
    bounds: WorldBounds,
    cells: Vec<Option<Identity>>,
}

impl GridOwnership {
    /// Creates an unpainted grid covering `bounds`.
    pub fn new(bounds: WorldBounds) -> Self {
        Self {
            bounds,
            cells: vec![None; bounds.area()],
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    /// Unconditionally assigns `at` to `owner`.
    ///
    /// # Returns
    ///
    /// The previous owner of the cell, if any.
    pub fn paint(&mut self, at: Position, owner: &Identity) -> Result<Option<Identity>, OutOfBounds> {
        let index = self.index_of(at)?;
        Ok(self.cells[index].replace(owner.clone()))
    }

    pub fn owner_of(&self, at: Position) -> Option<&Identity> {
        let index = self.bounds.index_of(at)?;
        self.cells[index].as_ref()
    }

    /// Full ownership table in row-major order.
    pub fn snapshot(&self) -> Vec<(Position, Identity)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(index, owner)| {
                owner
                    .as_ref()
                    .map(|owner| (self.bounds.position_at(index), owner.clone()))
            })
            .collect()
    }

    /// Number of cells `identity` currently owns.
    ///
    /// Counted from the live table rather than tracked incrementally, so the
    /// score can never drift from ownership.
    pub fn score_of(&self, identity: &Identity) -> u64 {
        self.cells
            .iter()
            .filter(|owner| owner.as_ref() == Some(identity))
            .count() as u64
    }

    /// Number of cells painted by anyone.
    pub fn painted_count(&self) -> usize {
        self.cells.iter().filter(|owner| owner.is_some()).count()
    }

    fn index_of(&self, at: Position) -> Result<usize, OutOfBounds> {
        self.bounds.index_of(at).ok_or(OutOfBounds {
            at,
            cols: self.bounds.cols,
            rows: self.bounds.rows,
        })
    }
}
