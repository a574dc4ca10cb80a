//! Read-only world geometry consumed by the engine.
//!
//! The engine never owns tile data. Hosts hand it something implementing
//! [`TileOracle`]: adjacency, buildability and distance come from
//! [`TileGraph`], per-tile base resource modifiers from this trait.

use crate::modifiers::{ResourceId, ResourceModifier};
use crate::resources::ResourceDef;
use rustc_hash::FxHashMap;
use tile_graph::{RiverKind, Terrain, TileGraph, TileId, TileMap};

pub trait TileOracle: TileGraph {
    /// Static base modifier of `tile` for `resource`.
    ///
    /// The default derives it from the resource's terrain and river factor
    /// tables. Unknown tiles yield the neutral modifier.
    fn base_modifier(&self, tile: TileId, resource: &ResourceDef) -> ResourceModifier {
        match self.terrain(tile) {
            Some(terrain) => resource.tile_modifier(terrain, self.river(tile)),
            None => ResourceModifier::neutral(resource.id),
        }
    }
}

impl TileOracle for TileMap {}

/// Wraps a graph with explicit per-tile modifier overrides.
///
/// Tiles without an override fall back to the terrain-derived modifier.
#[derive(Debug, Clone)]
pub struct ModifierTable<G> {
    graph: G,
    overrides: FxHashMap<(TileId, ResourceId), ResourceModifier>,
}

impl<G: TileGraph> ModifierTable<G> {
    pub fn new(graph: G) -> Self {
        Self {
            graph,
            overrides: FxHashMap::default(),
        }
    }

    pub fn set(&mut self, tile: TileId, modifier: ResourceModifier) -> &mut Self {
        self.overrides.insert((tile, modifier.resource), modifier);
        self
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }
}

impl<G: TileGraph> TileGraph for ModifierTable<G> {
    fn contains(&self, tile: TileId) -> bool {
        self.graph.contains(tile)
    }

    fn neighbors(&self, tile: TileId) -> Vec<TileId> {
        self.graph.neighbors(tile)
    }

    fn terrain(&self, tile: TileId) -> Option<Terrain> {
        self.graph.terrain(tile)
    }

    fn river(&self, tile: TileId) -> RiverKind {
        self.graph.river(tile)
    }

    fn distance(&self, a: TileId, b: TileId) -> f32 {
        self.graph.distance(a, b)
    }

    fn is_buildable(&self, tile: TileId) -> bool {
        self.graph.is_buildable(tile)
    }
}

impl<G: TileGraph> TileOracle for ModifierTable<G> {
    fn base_modifier(&self, tile: TileId, resource: &ResourceDef) -> ResourceModifier {
        if let Some(m) = self.overrides.get(&(tile, resource.id)) {
            return *m;
        }
        match self.graph.terrain(tile) {
            Some(terrain) => resource.tile_modifier(terrain, self.graph.river(tile)),
            None => ResourceModifier::neutral(resource.id),
        }
    }
}
