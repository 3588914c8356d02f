//! Core types for the traffic simulation
//!
//! Grid coordinates, identifiers and the small enums shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position on the intersection grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: usize,
    pub y: usize,
}

impl GridPos {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Number of grid hops between two positions
    pub fn manhattan(&self, other: &GridPos) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True when `other` is exactly one cardinal hop away
    pub fn is_adjacent(&self, other: &GridPos) -> bool {
        self.manhattan(other) == 1
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(usize, usize)> for GridPos {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

/// A wrapper type for intersection IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntersectionId(pub usize);

impl IntersectionId {
    /// Row-major id of a grid position
    pub fn of(pos: GridPos, grid_size: usize) -> Self {
        Self(pos.x * grid_size + pos.y)
    }
}

/// A wrapper type for vehicle IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub usize);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis of a single-hop movement
///
/// Moving along `x` is north-south travel, moving along `y` is east-west.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    NorthSouth,
    EastWest,
}

impl Direction {
    /// Direction of a move between two positions.
    ///
    /// Returns `None` for zero, diagonal or multi-hop deltas.
    pub fn between(from: GridPos, to: GridPos) -> Option<Self> {
        let dx = from.x.abs_diff(to.x);
        let dy = from.y.abs_diff(to.y);
        match (dx, dy) {
            (1, 0) => Some(Direction::NorthSouth),
            (0, 1) => Some(Direction::EastWest),
            _ => None,
        }
    }
}

/// Which movement currently has green at a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalPhase {
    NorthSouth,
    EastWest,
}

impl SignalPhase {
    pub fn flipped(self) -> Self {
        match self {
            SignalPhase::NorthSouth => SignalPhase::EastWest,
            SignalPhase::EastWest => SignalPhase::NorthSouth,
        }
    }

    pub fn allows(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (SignalPhase::NorthSouth, Direction::NorthSouth)
                | (SignalPhase::EastWest, Direction::EastWest)
        )
    }
}

/// Ordered sequence of positions from origin to destination (both inclusive)
pub type Route = Vec<GridPos>;

/// True when every consecutive pair in the route is a single cardinal hop
/// and no position repeats
pub fn is_simple_route(route: &[GridPos]) -> bool {
    let adjacent = route.windows(2).all(|pair| pair[0].is_adjacent(&pair[1]));
    let mut seen = std::collections::HashSet::with_capacity(route.len());
    adjacent && route.iter().all(|pos| seen.insert(*pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_from_deltas() {
        let origin = GridPos::new(2, 2);
        assert_eq!(
            Direction::between(origin, GridPos::new(3, 2)),
            Some(Direction::NorthSouth)
        );
        assert_eq!(
            Direction::between(origin, GridPos::new(1, 2)),
            Some(Direction::NorthSouth)
        );
        assert_eq!(
            Direction::between(origin, GridPos::new(2, 1)),
            Some(Direction::EastWest)
        );
        assert_eq!(Direction::between(origin, origin), None);
        assert_eq!(Direction::between(origin, GridPos::new(3, 3)), None);
        assert_eq!(Direction::between(origin, GridPos::new(4, 2)), None);
    }

    #[test]
    fn simple_route_detection() {
        let good = vec![GridPos::new(0, 0), GridPos::new(0, 1), GridPos::new(1, 1)];
        assert!(is_simple_route(&good));

        let jump = vec![GridPos::new(0, 0), GridPos::new(0, 2)];
        assert!(!is_simple_route(&jump));

        let cycle = vec![
            GridPos::new(0, 0),
            GridPos::new(0, 1),
            GridPos::new(0, 0),
        ];
        assert!(!is_simple_route(&cycle));
    }
}
