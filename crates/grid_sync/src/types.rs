//! Value types shared by every store in the engine.
//!
//! Identities, rooms, coordinates and colors are small, cheaply clonable
//! values. Identities and rooms wrap an `Arc<str>` so that the same name can
//! be held by the registry, the presence store and every painted cell
//! without repeated allocation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A pre-authenticated username.
///
/// The engine never validates identities; it trusts whatever the login layer
/// hands it and uses the string as the key for presence, ownership and stats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Arc<str>);

impl Identity {
    /// Wraps a username.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the username as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Name of a broadcast group. Rooms exist implicitly while they have members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(Arc<str>);

impl RoomId {
    /// Wraps a room name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the room name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An integer cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A `#rrggbb` color string as rendered by clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(format!("#{r:02x}{g:02x}{b:02x}"))
    }

    /// Draws a uniformly random RGB color.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::from_rgb(rng.gen(), rng.gen(), rng.gen())
    }

    /// Gray used for cells whose owner has no cached color.
    pub fn neutral() -> Self {
        Self::from_rgb(0x88, 0x88, 0x88)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Finite dimensions of the painted world.
///
/// Valid coordinates are `0 <= x < cols` and `0 <= y < rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub cols: u32,
    pub rows: u32,
}

impl WorldBounds {
    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    /// Number of cells in the world.
    pub fn area(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    pub fn contains(&self, at: Position) -> bool {
        at.x >= 0 && at.y >= 0 && (at.x as u32) < self.cols && (at.y as u32) < self.rows
    }

    /// Row-major index of `at`, or `None` when it lies outside the world.
    pub fn index_of(&self, at: Position) -> Option<usize> {
        if !self.contains(at) {
            return None;
        }
        Some(at.y as usize * self.cols as usize + at.x as usize)
    }

    /// Inverse of [`WorldBounds::index_of`].
    pub fn position_at(&self, index: usize) -> Position {
        let cols = self.cols as usize;
        Position::new((index % cols) as i32, (index / cols) as i32)
    }

    /// Draws a uniformly random coordinate inside the world.
    pub fn random_position(&self, rng: &mut impl Rng) -> Position {
        Position::new(
            rng.gen_range(0..self.cols) as i32,
            rng.gen_range(0..self.rows) as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_bounds_reject_outside_coordinates() {
        let bounds = WorldBounds::new(25, 25);
        assert!(bounds.contains(Position::new(0, 0)));
        assert!(bounds.contains(Position::new(24, 24)));
        assert!(!bounds.contains(Position::new(25, 0)));
        assert!(!bounds.contains(Position::new(0, -1)));
        assert_eq!(bounds.index_of(Position::new(-3, 4)), None);
    }

    #[test]
    fn test_index_round_trips_through_position() {
        let bounds = WorldBounds::new(7, 3);
        let at = Position::new(5, 2);
        let index = bounds.index_of(at).expect("inside bounds");
        assert_eq!(index, 19);
        assert_eq!(bounds.position_at(index), at);
    }

    #[test]
    fn test_random_positions_stay_inside() {
        let bounds = WorldBounds::new(4, 2);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            assert!(bounds.contains(bounds.random_position(&mut rng)));
        }
    }

    #[test]
    fn test_color_format() {
        assert_eq!(Color::from_rgb(0xe7, 0x4c, 0x3c).as_str(), "#e74c3c");
        let mut rng = StdRng::seed_from_u64(1);
        let color = Color::random(&mut rng);
        assert_eq!(color.as_str().len(), 7);
        assert!(color.as_str().starts_with('#'));
    }
}
