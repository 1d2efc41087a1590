//! Toroidal lattice addressing.
//!
//! Cells are identified by a single linear index laid out x-major, then y,
//! then z. Every operation here is pure and total for a valid lattice: indices
//! and coordinates outside the lattice are wrapped back onto it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Planar compass directions used for neighbour lookups, plus the cell itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Toward decreasing y.
    North,
    /// Toward increasing x and decreasing y.
    NorthEast,
    /// Toward increasing x.
    East,
    /// Toward increasing x and increasing y.
    SouthEast,
    /// Toward increasing y.
    South,
    /// Toward decreasing x and increasing y.
    SouthWest,
    /// Toward decreasing x.
    West,
    /// Toward decreasing x and decreasing y.
    NorthWest,
    /// The cell itself.
    Origin,
}

impl Direction {
    /// Every direction in canonical iteration order.
    pub const ALL: [Direction; 9] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
        Direction::Origin,
    ];

    /// Column and row offsets applied by a single move in this direction.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
            Self::Origin => (0, 0),
        }
    }

    /// Direction pointing the other way. `Origin` is its own opposite.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::NorthEast => Self::SouthWest,
            Self::East => Self::West,
            Self::SouthEast => Self::NorthWest,
            Self::South => Self::North,
            Self::SouthWest => Self::NorthEast,
            Self::West => Self::East,
            Self::NorthWest => Self::SouthEast,
            Self::Origin => Self::Origin,
        }
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Compact set of directions.
///
/// Serialized as a plain list of directions. Iteration always follows
/// [`Direction::ALL`], independent of insertion order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Direction>", into = "Vec<Direction>")]
pub struct DirectionSet(u16);

impl DirectionSet {
    /// Set containing no directions.
    pub const EMPTY: Self = Self(0);

    /// Von Neumann neighbourhood: the four orthogonal directions.
    pub const FOUR: Self = Self::EMPTY
        .with(Direction::North)
        .with(Direction::East)
        .with(Direction::South)
        .with(Direction::West);

    /// Moore neighbourhood: all eight compass directions.
    pub const EIGHT: Self = Self::FOUR
        .with(Direction::NorthEast)
        .with(Direction::SouthEast)
        .with(Direction::SouthWest)
        .with(Direction::NorthWest);

    /// Returns a copy of the set that also contains `direction`.
    #[must_use]
    pub const fn with(self, direction: Direction) -> Self {
        Self(self.0 | direction.bit())
    }

    /// Reports whether `direction` is part of the set.
    #[must_use]
    pub const fn contains(self, direction: Direction) -> bool {
        self.0 & direction.bit() != 0
    }

    /// Reports whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of directions in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Set made of the opposite of every member.
    #[must_use]
    pub fn opposite(self) -> Self {
        self.iter().map(Direction::opposite).collect()
    }

    /// Iterates the members in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::ALL
            .into_iter()
            .filter(move |direction| self.contains(*direction))
    }
}

impl fmt::Debug for DirectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<Vec<Direction>> for DirectionSet {
    fn from(directions: Vec<Direction>) -> Self {
        directions.into_iter().collect()
    }
}

impl From<DirectionSet> for Vec<Direction> {
    fn from(set: DirectionSet) -> Self {
        set.iter().collect()
    }
}

/// Coordinates of a single cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    x: u32,
    y: u32,
    z: u32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Column of the cell.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Row of the cell.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Layer of the cell.
    #[must_use]
    pub const fn z(&self) -> u32 {
        self.z
    }
}

/// Dimensions of a toroidal lattice, wrapping on every axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Lattice {
    width: u32,
    height: u32,
    depth: u32,
}

impl Lattice {
    /// Creates a lattice, rejecting zero-sized axes.
    pub fn new(width: u32, height: u32, depth: u32) -> Result<Self, ModelError> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(ModelError::EmptyLattice {
                width,
                height,
                depth,
            });
        }
        Ok(Self {
            width,
            height,
            depth,
        })
    }

    /// Creates a single-layer lattice.
    pub fn planar(width: u32, height: u32) -> Result<Self, ModelError> {
        Self::new(width, height, 1)
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of layers.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Total number of cells.
    #[must_use]
    pub const fn data_size(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    /// Linear index of the cell at the provided coordinates, wrapped onto the lattice.
    #[must_use]
    pub const fn to_index(&self, x: u32, y: u32, z: u32) -> usize {
        let width = self.width as usize;
        let height = self.height as usize;
        let x = (x % self.width) as usize;
        let y = (y % self.height) as usize;
        let z = (z % self.depth) as usize;
        (z * height + y) * width + x
    }

    /// Coordinates of the cell at `index`. Meant for diagnostics and hooks.
    #[must_use]
    pub const fn to_position(&self, index: usize) -> Position {
        let width = self.width as usize;
        let plane = width * self.height as usize;
        let index = index % self.data_size();
        let z = index / plane;
        let within = index % plane;
        Position::new((within % width) as u32, (within / width) as u32, z as u32)
    }

    /// Moves `steps` cells from `index` in `direction`, wrapping around planar edges.
    ///
    /// The layer never changes: every direction is planar.
    #[must_use]
    pub fn move_index(&self, index: usize, direction: Direction, steps: u32) -> usize {
        let width = i64::from(self.width);
        let height = i64::from(self.height);
        let plane = self.width as usize * self.height as usize;
        let index = index % self.data_size();
        let layer_start = index - index % plane;
        let within = (index % plane) as i64;
        let (dx, dy) = direction.delta();
        let steps = i64::from(steps);

        let x = (within % width + i64::from(dx) * steps).rem_euclid(width);
        let y = (within / width + i64::from(dy) * steps).rem_euclid(height);
        layer_start + (y * width + x) as usize
    }

    /// Index of the adjacent cell in `direction`.
    #[must_use]
    pub fn neighbour(&self, index: usize, direction: Direction) -> usize {
        self.move_index(index, direction, 1)
    }

    /// Reports whether `index` addresses a cell of the lattice.
    #[must_use]
    pub const fn index_inside(&self, index: usize) -> bool {
        index < self.data_size()
    }

    /// Reports whether the signed coordinates address a cell without wrapping.
    #[must_use]
    pub fn position_inside(&self, x: i64, y: i64, z: i64) -> bool {
        (0..i64::from(self.width)).contains(&x)
            && (0..i64::from(self.height)).contains(&y)
            && (0..i64::from(self.depth)).contains(&z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(width: u32, height: u32, depth: u32) -> Lattice {
        Lattice::new(width, height, depth).expect("valid lattice")
    }

    #[test]
    fn index_and_position_are_inverse() {
        let lattice = lattice(4, 3, 2);
        for index in 0..lattice.data_size() {
            let position = lattice.to_position(index);
            assert_eq!(
                lattice.to_index(position.x(), position.y(), position.z()),
                index
            );
        }
        assert_eq!(lattice.to_position(13), Position::new(1, 0, 1));
    }

    #[test]
    fn moves_wrap_around_every_planar_edge() {
        let lattice = lattice(3, 3, 1);
        assert_eq!(lattice.neighbour(0, Direction::West), 2);
        assert_eq!(lattice.neighbour(0, Direction::North), 6);
        assert_eq!(lattice.neighbour(8, Direction::SouthEast), 0);
        assert_eq!(lattice.neighbour(4, Direction::Origin), 4);
        assert_eq!(lattice.move_index(4, Direction::East, 3), 4);
        assert_eq!(lattice.move_index(4, Direction::NorthWest, 2), 8);
    }

    #[test]
    fn moves_never_leave_the_layer() {
        let lattice = lattice(2, 2, 3);
        let start = lattice.to_index(1, 1, 2);
        for direction in Direction::ALL {
            let moved = lattice.neighbour(start, direction);
            assert_eq!(lattice.to_position(moved).z(), 2);
        }
    }

    #[test]
    fn opposite_round_trips() {
        for direction in Direction::ALL {
            assert_eq!(direction.opposite().opposite(), direction);
            let (dx, dy) = direction.delta();
            assert_eq!(direction.opposite().delta(), (-dx, -dy));
        }
    }

    #[test]
    fn direction_sets_cover_expected_neighbourhoods() {
        assert_eq!(DirectionSet::FOUR.len(), 4);
        assert_eq!(DirectionSet::EIGHT.len(), 8);
        assert!(!DirectionSet::EIGHT.contains(Direction::Origin));
        assert_eq!(DirectionSet::FOUR.opposite(), DirectionSet::FOUR);

        let east_only: DirectionSet = [Direction::East].into_iter().collect();
        assert_eq!(
            east_only.opposite().iter().collect::<Vec<_>>(),
            vec![Direction::West]
        );
    }

    #[test]
    fn bounds_checks_reject_outside_coordinates() {
        let lattice = lattice(5, 4, 1);
        assert!(lattice.index_inside(19));
        assert!(!lattice.index_inside(20));
        assert!(lattice.position_inside(4, 3, 0));
        assert!(!lattice.position_inside(-1, 0, 0));
        assert!(!lattice.position_inside(0, 4, 0));
        assert!(!lattice.position_inside(0, 0, 1));
    }

    #[test]
    fn zero_sized_lattice_is_rejected() {
        assert!(matches!(
            Lattice::new(0, 3, 1),
            Err(ModelError::EmptyLattice { .. })
        ));
    }
}
