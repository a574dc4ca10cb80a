//! Weighted tile claims and derived territory ownership.
//!
//! Every settlement bids for the tiles within its territory radius. A bid's
//! weight is `1 / (hops + 1)` plus a tiny random jitter, and the owner of a
//! tile is the claimant with the strictly greatest weight. Claims are the
//! persisted source of truth; per-settlement territory lists are a cache.

use crate::state::SettlementId;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tile_graph::{bfs_rings, TileGraph, TileId};
use tracing::instrument;

/// Territory radius for a settlement: `ceil(sqrt(max(0, level*3 + tech*2 - 4)))`.
pub fn territory_radius(level: u32, tech_tier: u8) -> u32 {
    let raw = level as i64 * 3 + tech_tier as i64 * 2 - 4;
    (raw.max(0) as f64).sqrt().ceil() as u32
}

/// All claims on one tile, keyed by settlement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileClaims(BTreeMap<SettlementId, f64>);

impl TileClaims {
    /// Settlement with the greatest weight.
    ///
    /// Only a strictly greater weight displaces the current best, so equal
    /// weights resolve to the lowest settlement id.
    pub fn owner(&self) -> Option<SettlementId> {
        let mut best: Option<(SettlementId, f64)> = None;
        for (&settlement, &weight) in &self.0 {
            match best {
                Some((_, w)) if weight <= w => {}
                _ => best = Some((settlement, weight)),
            }
        }
        best.map(|(s, _)| s)
    }

    pub fn weight(&self, settlement: SettlementId) -> Option<f64> {
        self.0.get(&settlement).copied()
    }

    pub fn contains(&self, settlement: SettlementId) -> bool {
        self.0.contains_key(&settlement)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SettlementId, f64)> + '_ {
        self.0.iter().map(|(s, w)| (*s, *w))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of a claim pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimUpdate {
    /// Tiles whose claim entry for the settlement was written or removed.
    pub tiles_touched: usize,
    /// Tiles whose owner differs from before the pass.
    pub owners_changed: Vec<TileId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerritoryResolver {
    claims: FxHashMap<TileId, TileClaims>,
    /// Tiles each settlement has a claim on. Rebuilt from `claims` on load.
    #[serde(skip)]
    claimed_by: FxHashMap<SettlementId, Vec<TileId>>,
    /// Tiles each settlement currently owns, computed on demand.
    #[serde(skip)]
    territory_cache: FxHashMap<SettlementId, Vec<TileId>>,
}

impl TerritoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breadth-first claim weights around `origin`.
    ///
    /// The origin is always claimed. Expansion only enters buildable tiles
    /// and stops at `radius` hops.
    pub fn compute_claims<G, R>(
        graph: &G,
        origin: TileId,
        radius: u32,
        jitter: f64,
        rng: &mut R,
    ) -> Vec<(TileId, f64)>
    where
        G: TileGraph + ?Sized,
        R: Rng,
    {
        bfs_rings(graph, origin, radius, |tile| graph.is_buildable(tile))
            .into_iter()
            .map(|(tile, hops)| {
                let weight = 1.0 / (hops as f64 + 1.0) + rng.gen::<f64>() * jitter;
                (tile, weight)
            })
            .collect()
    }

    /// Run a claim pass for `settlement` and write its weights.
    ///
    /// With `reset` set, tiles this settlement already claims keep their
    /// existing weight.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, name = "add_claims", fields(settlement = settlement.0, radius = radius))]
    pub fn add_claims<G, R>(
        &mut self,
        settlement: SettlementId,
        origin: TileId,
        radius: u32,
        graph: &G,
        jitter: f64,
        rng: &mut R,
        reset: bool,
    ) -> ClaimUpdate
    where
        G: TileGraph + ?Sized,
        R: Rng,
    {
        let weights = Self::compute_claims(graph, origin, radius, jitter, rng);
        self.territory_cache.remove(&settlement);

        let mut update = ClaimUpdate::default();
        for (tile, weight) in weights {
            if reset
                && self
                    .claims
                    .get(&tile)
                    .is_some_and(|c| c.contains(settlement))
            {
                continue;
            }
            if self.set_claim(tile, settlement, weight) {
                update.owners_changed.push(tile);
            }
            update.tiles_touched += 1;
        }

        log::trace!(
            "Settlement {} claimed {} tiles (radius {}), {} owner changes",
            settlement.0,
            update.tiles_touched,
            radius,
            update.owners_changed.len()
        );
        update
    }

    /// Write one claim weight. Returns `true` if the tile's owner changed.
    ///
    /// Invalidates the cached territory of every claimant of the tile.
    pub fn set_claim(&mut self, tile: TileId, settlement: SettlementId, weight: f64) -> bool {
        let claims = self.claims.entry(tile).or_default();
        let before = claims.owner();
        for (claimant, _) in claims.iter() {
            self.territory_cache.remove(&claimant);
        }
        if claims.0.insert(settlement, weight).is_none() {
            self.claimed_by.entry(settlement).or_default().push(tile);
        }
        self.territory_cache.remove(&settlement);

        claims.owner() != before
    }

    /// Drop every claim held by `settlement`.
    pub fn remove_claims(&mut self, settlement: SettlementId) -> ClaimUpdate {
        let mut update = ClaimUpdate::default();
        let tiles = self.claimed_by.remove(&settlement).unwrap_or_default();
        for tile in tiles {
            let Some(claims) = self.claims.get_mut(&tile) else {
                continue;
            };
            let before = claims.owner();
            claims.0.remove(&settlement);
            for (claimant, _) in claims.iter() {
                self.territory_cache.remove(&claimant);
            }
            if claims.owner() != before {
                update.owners_changed.push(tile);
            }
            if claims.is_empty() {
                self.claims.remove(&tile);
            }
            update.tiles_touched += 1;
        }
        self.territory_cache.remove(&settlement);
        update
    }

    pub fn tile_owner(&self, tile: TileId) -> Option<SettlementId> {
        self.claims.get(&tile).and_then(TileClaims::owner)
    }

    pub fn claims(&self, tile: TileId) -> Option<&TileClaims> {
        self.claims.get(&tile)
    }

    /// Whether `settlement` has any claim at all.
    pub fn has_claims(&self, settlement: SettlementId) -> bool {
        self.claimed_by
            .get(&settlement)
            .is_some_and(|tiles| !tiles.is_empty())
    }

    /// Tiles `settlement` currently owns, sorted by id.
    ///
    /// Computed on first request after any relevant claim change.
    pub fn territory(&mut self, settlement: SettlementId) -> &[TileId] {
        if !self.territory_cache.contains_key(&settlement) {
            let mut owned: Vec<TileId> = self
                .claimed_by
                .get(&settlement)
                .map(|tiles| {
                    tiles
                        .iter()
                        .copied()
                        .filter(|&t| self.tile_owner(t) == Some(settlement))
                        .collect()
                })
                .unwrap_or_default();
            owned.sort_unstable();
            if owned.is_empty() {
                log::warn!("Settlement {} has no territory", settlement.0);
            }
            self.territory_cache.insert(settlement, owned);
        }
        self.territory_cache
            .get(&settlement)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rebuild the per-settlement index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.claimed_by.clear();
        self.territory_cache.clear();
        let mut tiles: Vec<_> = self.claims.keys().copied().collect();
        tiles.sort_unstable();
        for tile in tiles {
            if let Some(claims) = self.claims.get(&tile) {
                for (settlement, _) in claims.iter() {
                    self.claimed_by.entry(settlement).or_default().push(tile);
                }
            }
        }
    }

    /// All claims as `(tile, settlement, weight)`, sorted by tile then settlement.
    pub fn sorted_claims(&self) -> Vec<(TileId, SettlementId, f64)> {
        let mut out: Vec<_> = self
            .claims
            .iter()
            .flat_map(|(&tile, claims)| claims.iter().map(move |(s, w)| (tile, s, w)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tile_graph::{Terrain, TileMap};

    const A: SettlementId = SettlementId(1);
    const B: SettlementId = SettlementId(2);

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_radius_formula() {
        // level 1, tech 0: 3 - 4 < 0 -> 0
        assert_eq!(territory_radius(1, 0), 0);
        // level 2, tech 0: sqrt(2) -> 2
        assert_eq!(territory_radius(2, 0), 2);
        // level 1, tech 1: sqrt(1) -> 1
        assert_eq!(territory_radius(1, 1), 1);
        // level 10, tech 2: sqrt(30) -> 6
        assert_eq!(territory_radius(10, 2), 6);
    }

    #[test]
    fn test_claim_weights_decay_with_distance() {
        let map = TileMap::grid(5, 1, Terrain::Flat);
        let claims = TerritoryResolver::compute_claims(&map, 0, 2, 0.0, &mut rng());
        assert_eq!(claims, vec![(0, 1.0), (1, 0.5), (2, 1.0 / 3.0)]);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let map = TileMap::grid(3, 3, Terrain::Flat);
        let claims = TerritoryResolver::compute_claims(&map, 4, 1, 1e-5, &mut rng());
        for (tile, w) in claims {
            let base = if tile == 4 { 1.0 } else { 0.5 };
            assert!(w >= base && w < base + 1e-5, "tile {} weight {}", tile, w);
        }
    }

    #[test]
    fn test_closer_settlement_wins() {
        let map = TileMap::grid(6, 1, Terrain::Flat);
        let mut t = TerritoryResolver::new();
        t.add_claims(A, 0, 5, &map, 1e-5, &mut rng(), false);
        t.add_claims(B, 5, 5, &map, 1e-5, &mut StdRng::seed_from_u64(8), false);

        assert_eq!(t.tile_owner(0), Some(A));
        assert_eq!(t.tile_owner(2), Some(A));
        assert_eq!(t.tile_owner(3), Some(B));
        assert_eq!(t.territory(A), &[0, 1, 2]);
        assert_eq!(t.territory(B), &[3, 4, 5]);
    }

    #[test]
    fn test_owner_is_max_weight() {
        let mut t = TerritoryResolver::new();
        t.set_claim(9, A, 0.25);
        t.set_claim(9, B, 0.5);
        assert_eq!(t.tile_owner(9), Some(B));
        t.set_claim(9, A, 0.75);
        assert_eq!(t.tile_owner(9), Some(A));
        assert_eq!(t.tile_owner(10), None);
    }

    #[test]
    fn test_equal_weights_resolve_to_lowest_id() {
        let mut t = TerritoryResolver::new();
        t.set_claim(3, B, 0.5);
        t.set_claim(3, A, 0.5);
        assert_eq!(t.tile_owner(3), Some(A));
    }

    #[test]
    fn test_set_claim_reports_owner_change() {
        let mut t = TerritoryResolver::new();
        assert!(t.set_claim(1, A, 0.5));
        assert!(!t.set_claim(1, B, 0.25));
        assert!(t.set_claim(1, B, 0.75));
        assert_eq!(t.tile_owner(1), Some(B));
    }

    #[test]
    fn test_cache_invalidated_when_rival_claims() {
        let map = TileMap::grid(3, 1, Terrain::Flat);
        let mut t = TerritoryResolver::new();
        t.add_claims(A, 0, 2, &map, 0.0, &mut rng(), false);
        assert_eq!(t.territory(A), &[0, 1, 2]);

        t.set_claim(2, B, 0.9);
        assert_eq!(t.territory(A), &[0, 1]);
        assert_eq!(t.territory(B), &[2]);
    }

    #[test]
    fn test_reset_keeps_existing_weights() {
        let map = TileMap::grid(3, 1, Terrain::Flat);
        let mut t = TerritoryResolver::new();
        t.add_claims(A, 0, 1, &map, 0.0, &mut rng(), false);
        t.set_claim(1, A, 0.1);

        let update = t.add_claims(A, 0, 2, &map, 0.0, &mut rng(), true);
        assert_eq!(update.tiles_touched, 1, "only tile 2 is new");
        assert_eq!(t.claims(1).unwrap().weight(A), Some(0.1));
        assert_eq!(t.claims(2).unwrap().weight(A), Some(1.0 / 3.0));

        let update = t.add_claims(A, 0, 2, &map, 0.0, &mut rng(), false);
        assert_eq!(update.tiles_touched, 3);
        assert_eq!(t.claims(1).unwrap().weight(A), Some(0.5));
    }

    #[test]
    fn test_claims_skip_unbuildable_tiles() {
        let mut map = TileMap::grid(3, 1, Terrain::Flat);
        map.set_terrain(1, Terrain::Ocean);
        let mut t = TerritoryResolver::new();
        t.add_claims(A, 0, 2, &map, 0.0, &mut rng(), false);
        assert_eq!(t.territory(A), &[0]);
        assert_eq!(t.tile_owner(2), None);
    }

    #[test]
    fn test_surrounded_settlement_keeps_origin() {
        let mut map = TileMap::grid(3, 3, Terrain::Impassable);
        map.set_terrain(4, Terrain::Flat);
        let mut t = TerritoryResolver::new();
        let update = t.add_claims(A, 4, 3, &map, 0.0, &mut rng(), false);
        assert_eq!(update.tiles_touched, 1);
        assert_eq!(t.territory(A), &[4]);
    }

    #[test]
    fn test_territory_can_be_empty() {
        let mut t = TerritoryResolver::new();
        t.set_claim(0, A, 0.1);
        t.set_claim(0, B, 0.9);
        assert!(t.territory(A).is_empty());
        assert!(t.has_claims(A));
    }

    #[test]
    fn test_remove_claims_hands_tiles_to_rival() {
        let map = TileMap::grid(3, 1, Terrain::Flat);
        let mut t = TerritoryResolver::new();
        t.add_claims(A, 0, 2, &map, 0.0, &mut rng(), false);
        t.add_claims(B, 2, 2, &map, 0.0, &mut rng(), false);
        assert_eq!(t.territory(B), &[2]);

        let update = t.remove_claims(A);
        assert_eq!(update.tiles_touched, 3);
        assert_eq!(update.owners_changed, vec![0, 1]);
        assert!(!t.has_claims(A));
        assert_eq!(t.territory(B), &[0, 1, 2]);
    }

    #[test]
    fn test_roundtrip_rebuilds_index() {
        let map = TileMap::grid(3, 1, Terrain::Flat);
        let mut t = TerritoryResolver::new();
        t.add_claims(A, 0, 2, &map, 1e-5, &mut rng(), false);

        let json = serde_json::to_string(&t).unwrap();
        let mut loaded: TerritoryResolver = serde_json::from_str(&json).unwrap();
        assert!(!loaded.has_claims(A));
        loaded.rebuild_index();
        assert!(loaded.has_claims(A));
        assert_eq!(loaded.territory(A), &[0, 1, 2]);

        let before = t.sorted_claims();
        let after = loaded.sorted_claims();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            assert_eq!((b.0, b.1), (a.0, a.1));
            assert!((b.2 - a.2).abs() < 1e-12);
        }
    }
}
