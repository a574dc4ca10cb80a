//! World tile graph consumed by the empire simulation.
//!
//! The simulation treats geography as a read-only oracle: tile ids, adjacency,
//! terrain classification and straight-line distance. [`TileGraph`] is that
//! oracle; [`TileMap`] is a plain in-memory implementation for hosts that do
//! not bring their own world grid.

use std::collections::{HashSet, VecDeque};

/// Opaque world tile identifier.
pub type TileId = u32;

/// Coarse terrain classification of a tile.
///
/// Ordering matters: everything below [`Terrain::Flat`] is a water body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Terrain {
    Ocean,
    Lake,
    #[default]
    Flat,
    SmallHills,
    LargeHills,
    Mountainous,
    Impassable,
}

impl Terrain {
    pub fn is_water(self) -> bool {
        self < Terrain::Flat
    }

    /// Land that can carry a settlement or be claimed as territory.
    pub fn is_buildable(self) -> bool {
        !self.is_water() && self != Terrain::Impassable
    }
}

/// Largest river running through a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RiverKind {
    #[default]
    None,
    Creek,
    River,
    LargeRiver,
    HugeRiver,
}

/// Read-only view of the world tile graph.
pub trait TileGraph {
    /// Whether `tile` is a valid id in this graph.
    fn contains(&self, tile: TileId) -> bool;

    /// Tiles adjacent to `tile`. Empty for unknown tiles.
    fn neighbors(&self, tile: TileId) -> Vec<TileId>;

    /// Terrain of `tile`, or `None` if the tile does not exist.
    fn terrain(&self, tile: TileId) -> Option<Terrain>;

    /// Largest river on `tile`.
    fn river(&self, _tile: TileId) -> RiverKind {
        RiverKind::None
    }

    /// Approximate distance between two tiles, in tiles.
    fn distance(&self, from: TileId, to: TileId) -> f32;

    /// Whether `tile` exists and is dry, passable land.
    fn is_buildable(&self, tile: TileId) -> bool {
        self.terrain(tile).is_some_and(Terrain::is_buildable)
    }
}

/// Breadth-first expansion from `origin` out to `radius` hops.
///
/// Returns every visited tile with its hop distance, in visit order. The
/// origin is always included at distance 0; other tiles are only entered when
/// `passable` accepts them.
pub fn bfs_rings<G, F>(graph: &G, origin: TileId, radius: u32, mut passable: F) -> Vec<(TileId, u32)>
where
    G: TileGraph + ?Sized,
    F: FnMut(TileId) -> bool,
{
    let mut visited = Vec::new();
    let mut enqueued: HashSet<TileId> = HashSet::new();
    let mut queue: VecDeque<(TileId, u32)> = VecDeque::new();

    queue.push_back((origin, 0));
    enqueued.insert(origin);

    while let Some((tile, distance)) = queue.pop_front() {
        visited.push((tile, distance));
        if distance == radius {
            continue;
        }

        for neighbor in graph.neighbors(tile) {
            if enqueued.contains(&neighbor) || !passable(neighbor) {
                continue;
            }
            enqueued.insert(neighbor);
            queue.push_back((neighbor, distance + 1));
        }
    }

    visited
}

/// Static data for one tile of a [`TileMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct TileInfo {
    pub terrain: Terrain,
    pub river: RiverKind,
    /// Position used for straight-line distance.
    pub position: (f32, f32),
    pub neighbors: Vec<TileId>,
}

/// Adjacency-list tile graph.
#[derive(Debug, Clone, Default)]
pub struct TileMap {
    tiles: Vec<TileInfo>,
}

impl TileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rectangular grid with 4-neighborhood adjacency.
    ///
    /// Tile `(x, y)` has id `y * width + x`.
    pub fn grid(width: u32, height: u32, terrain: Terrain) -> Self {
        let mut map = Self::new();
        for y in 0..height {
            for x in 0..width {
                map.add_tile(terrain, (x as f32, y as f32));
            }
        }
        for y in 0..height {
            for x in 0..width {
                let id = y * width + x;
                if x + 1 < width {
                    map.connect(id, id + 1);
                }
                if y + 1 < height {
                    map.connect(id, id + width);
                }
            }
        }
        map
    }

    /// Append a tile with no neighbors and return its id.
    pub fn add_tile(&mut self, terrain: Terrain, position: (f32, f32)) -> TileId {
        self.tiles.push(TileInfo {
            terrain,
            river: RiverKind::None,
            position,
            neighbors: Vec::new(),
        });
        (self.tiles.len() - 1) as TileId
    }

    /// Make two tiles mutually adjacent. Unknown ids are ignored.
    pub fn connect(&mut self, a: TileId, b: TileId) {
        if a == b || !self.contains(a) || !self.contains(b) {
            return;
        }
        let a_neighbors = &mut self.tiles[a as usize].neighbors;
        if !a_neighbors.contains(&b) {
            a_neighbors.push(b);
        }
        let b_neighbors = &mut self.tiles[b as usize].neighbors;
        if !b_neighbors.contains(&a) {
            b_neighbors.push(a);
        }
    }

    pub fn set_terrain(&mut self, tile: TileId, terrain: Terrain) {
        if let Some(info) = self.tiles.get_mut(tile as usize) {
            info.terrain = terrain;
        }
    }

    pub fn set_river(&mut self, tile: TileId, river: RiverKind) {
        if let Some(info) = self.tiles.get_mut(tile as usize) {
            info.river = river;
        }
    }

    pub fn tile(&self, tile: TileId) -> Option<&TileInfo> {
        self.tiles.get(tile as usize)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl TileGraph for TileMap {
    fn contains(&self, tile: TileId) -> bool {
        (tile as usize) < self.tiles.len()
    }

    fn neighbors(&self, tile: TileId) -> Vec<TileId> {
        self.tile(tile)
            .map(|info| info.neighbors.clone())
            .unwrap_or_default()
    }

    fn terrain(&self, tile: TileId) -> Option<Terrain> {
        self.tile(tile).map(|info| info.terrain)
    }

    fn river(&self, tile: TileId) -> RiverKind {
        self.tile(tile).map(|info| info.river).unwrap_or_default()
    }

    fn distance(&self, from: TileId, to: TileId) -> f32 {
        match (self.tile(from), self.tile(to)) {
            (Some(a), Some(b)) => {
                let dx = a.position.0 - b.position.0;
                let dy = a.position.1 - b.position.1;
                (dx * dx + dy * dy).sqrt()
            }
            _ => f32::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0 1 2
    // 3 4 5
    // 6 7 8
    fn grid3() -> TileMap {
        TileMap::grid(3, 3, Terrain::Flat)
    }

    #[test]
    fn test_grid_adjacency() {
        let map = grid3();
        let mut n = map.neighbors(4);
        n.sort();
        assert_eq!(n, vec![1, 3, 5, 7]);

        let mut corner = map.neighbors(0);
        corner.sort();
        assert_eq!(corner, vec![1, 3]);
    }

    #[test]
    fn test_unknown_tile() {
        let map = grid3();
        assert!(!map.contains(9));
        assert!(map.neighbors(9).is_empty());
        assert_eq!(map.terrain(9), None);
        assert!(!map.is_buildable(9));
    }

    #[test]
    fn test_terrain_classification() {
        assert!(Terrain::Ocean.is_water());
        assert!(Terrain::Lake.is_water());
        assert!(!Terrain::Flat.is_water());
        assert!(Terrain::Mountainous.is_buildable());
        assert!(!Terrain::Impassable.is_buildable());
        assert!(!Terrain::Ocean.is_buildable());
    }

    #[test]
    fn test_bfs_rings_distances() {
        let map = grid3();
        let rings = bfs_rings(&map, 0, 2, |_| true);

        assert_eq!(rings[0], (0, 0));
        let dist_of = |t: TileId| rings.iter().find(|(id, _)| *id == t).map(|(_, d)| *d);
        assert_eq!(dist_of(1), Some(1));
        assert_eq!(dist_of(3), Some(1));
        assert_eq!(dist_of(4), Some(2));
        assert_eq!(dist_of(2), Some(2));
        // Distance 3 and 4 are out of range
        assert_eq!(dist_of(5), None);
        assert_eq!(dist_of(8), None);
    }

    #[test]
    fn test_bfs_radius_zero_is_origin_only() {
        let map = grid3();
        assert_eq!(bfs_rings(&map, 4, 0, |_| true), vec![(4, 0)]);
    }

    #[test]
    fn test_bfs_respects_passable_filter() {
        let mut map = grid3();
        // Wall off the middle column
        map.set_terrain(1, Terrain::Ocean);
        map.set_terrain(4, Terrain::Ocean);
        map.set_terrain(7, Terrain::Ocean);

        let rings = bfs_rings(&map, 0, 10, |t| map.is_buildable(t));
        let mut tiles: Vec<_> = rings.iter().map(|(t, _)| *t).collect();
        tiles.sort();
        assert_eq!(tiles, vec![0, 3, 6]);
    }

    #[test]
    fn test_bfs_origin_included_even_if_impassable() {
        let mut map = grid3();
        map.set_terrain(4, Terrain::Impassable);
        let rings = bfs_rings(&map, 4, 1, |t| map.is_buildable(t));
        assert_eq!(rings.len(), 5);
        assert_eq!(rings[0], (4, 0));
    }

    #[test]
    fn test_distance() {
        let map = grid3();
        assert_eq!(map.distance(0, 2), 2.0);
        assert!((map.distance(0, 4) - 2f32.sqrt()).abs() < 1e-6);
        assert_eq!(map.distance(0, 99), f32::INFINITY);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut map = TileMap::new();
        let a = map.add_tile(Terrain::Flat, (0.0, 0.0));
        let b = map.add_tile(Terrain::Flat, (1.0, 0.0));
        map.connect(a, b);
        map.connect(b, a);
        assert_eq!(map.neighbors(a), vec![b]);
        assert_eq!(map.neighbors(b), vec![a]);
    }
}
