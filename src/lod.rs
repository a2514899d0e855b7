//! Level-of-detail selection over decimated bar payloads.
//!
//! Each level pairs a power-of-two decimation factor with the visible-bar
//! count at which it becomes worthwhile. Selection picks the deepest level
//! whose threshold is met, with a hysteresis band so a view hovering near
//! a threshold does not flap between levels. Level caches hold M4 payloads
//! produced by the compute worker and are dropped wholesale whenever the
//! source data changes.

use bitchart_core::Bar;

/// Fraction of the visible count used as the hysteresis band.
const HYSTERESIS: f64 = 0.10;

#[derive(Clone, Debug)]
pub struct LodLevel {
    pub id: usize,
    /// Visible-bar count at which this level becomes eligible.
    pub min_visible_count: usize,
    /// Power-of-two reduction applied by the cache; 1 is identity.
    pub decimation_factor: usize,
    cache: Option<Vec<Bar>>,
}

pub struct LodManager {
    levels: Vec<LodLevel>,
    active: usize,
}

impl LodManager {
    /// The default ladder: identity plus five power-of-two reductions.
    pub fn new() -> Self {
        let thresholds = [0, 2_000, 4_000, 8_000, 16_000, 32_000];
        let levels = thresholds
            .iter()
            .enumerate()
            .map(|(id, &min_visible_count)| LodLevel {
                id,
                min_visible_count,
                decimation_factor: 1 << id,
                cache: None,
            })
            .collect();
        Self { levels, active: 0 }
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    pub fn active(&self) -> &LodLevel {
        &self.levels[self.active]
    }

    /// Pick the level for `visible_count` and make it active.
    ///
    /// The raw rule is "deepest level whose threshold fits"; the hysteresis
    /// band keeps the current level until the count clears the boundary by
    /// 10 % in the switching direction.
    pub fn select(&mut self, visible_count: usize) -> usize {
        let band = visible_count as f64 * HYSTERESIS;
        let mut target = self
            .levels
            .iter()
            .rev()
            .find(|level| level.min_visible_count <= visible_count)
            .map(|level| level.id)
            .unwrap_or(0);
        if target > self.active {
            let entering = self.levels[target].min_visible_count as f64;
            if (visible_count as f64) < entering + band {
                target = self.active;
            }
        } else if target < self.active {
            let leaving = self.levels[self.active].min_visible_count as f64;
            if (visible_count as f64) > leaving - band {
                target = self.active;
            }
        }
        self.active = target;
        target
    }

    pub fn cache(&self, id: usize) -> Option<&[Bar]> {
        self.levels.get(id).and_then(|l| l.cache.as_deref())
    }

    pub fn set_cache(&mut self, id: usize, bars: Vec<Bar>) {
        if let Some(level) = self.levels.get_mut(id) {
            level.cache = Some(bars);
        }
    }

    /// Source data changed: every decimated payload is stale.
    pub fn invalidate(&mut self) {
        for level in &mut self.levels {
            level.cache = None;
        }
    }
}

impl Default for LodManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_level_for_small_counts() {
        let mut lod = LodManager::new();
        assert_eq!(lod.select(100), 0);
        assert_eq!(lod.active().decimation_factor, 1);
    }

    #[test]
    fn deep_zoom_out_selects_deepest_level() {
        let mut lod = LodManager::new();
        assert_eq!(lod.select(1_000_000), 5);
        assert_eq!(lod.active().decimation_factor, 32);
    }

    #[test]
    fn hysteresis_blocks_flapping_at_a_threshold() {
        let mut lod = LodManager::new();
        assert_eq!(lod.select(1_000), 0);
        // just past the level-1 threshold but inside the band: stay
        assert_eq!(lod.select(2_050), 0);
        // well past: switch up
        assert_eq!(lod.select(2_600), 1);
        // dipping barely below the threshold stays on level 1
        assert_eq!(lod.select(1_950), 1);
        // dropping clearly below switches down
        assert_eq!(lod.select(1_500), 0);
    }

    #[test]
    fn caches_invalidate_together() {
        let mut lod = LodManager::new();
        lod.set_cache(1, vec![Bar::new(0.0, 1.0, 2.0, 0.5, 1.5, 1.0)]);
        lod.set_cache(2, vec![]);
        assert!(lod.cache(1).is_some());
        lod.invalidate();
        assert!(lod.cache(1).is_none());
        assert!(lod.cache(2).is_none());
    }
}
