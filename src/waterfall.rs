//! Waterfall (masonry) column assignment.
//!
//! Partitions an ordered list of items into `column_count` columns so that
//! column heights stay balanced, while keeping items that were already placed
//! in their column across passes. Re-running a pass after appending items or
//! correcting an aspect ratio does not shuffle the feed.
//!
//! ## Height accounting
//!
//! Columns share one width, so an item's rendered height is proportional to
//! `1 / aspect_ratio`. Heights are summed from zero on **every** pass, which
//! makes aspect-ratio corrections show up without patching running totals.
//!
//! ## Placement rules
//!
//! For each item, in order, with `min` being the shortest column so far
//! (first occurrence wins on ties):
//!
//! | Cached column | Condition | Result |
//! |---|---|---|
//! | none | any | `min`, recorded |
//! | out of range | any | `min`, overwritten |
//! | `c` | `height[c] > height[min] + threshold` | migrates to `min` |
//! | `c` | otherwise | stays in `c` |
//!
//! A change of column count drops every cached placement.

use crate::types::{FeedItem, sanitize_ratio};
use std::collections::HashMap;
use std::hash::Hash;

/// Default extra height a column may carry before its items migrate.
pub const DEFAULT_REBALANCE_THRESHOLD: f64 = 1.2;

/// Something that can be placed in a waterfall column.
pub trait Tile {
    type Id: Clone + Eq + Hash;

    fn tile_id(&self) -> &Self::Id;

    /// Width / height. Degenerate values are treated as 1.0 by the engine.
    fn aspect_ratio(&self) -> f64;
}

impl Tile for FeedItem {
    type Id = String;

    fn tile_id(&self) -> &String {
        &self.id
    }

    fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }
}

/// Sticky, balanced column assignment.
///
/// One instance belongs to one feed; the placement cache lives as long as the
/// instance and is dropped whenever the column count changes.
#[derive(Debug, Clone)]
pub struct WaterfallLayout<K> {
    threshold: f64,
    column_count: usize,
    placements: HashMap<K, usize>,
    heights: Vec<f64>,
}

impl<K: Clone + Eq + Hash> WaterfallLayout<K> {
    pub fn new(rebalance_threshold: f64) -> Self {
        Self {
            threshold: rebalance_threshold,
            column_count: 0,
            placements: HashMap::new(),
            heights: Vec::new(),
        }
    }

    /// Column count the current placement cache was built for (0 before the
    /// first pass).
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn rebalance_threshold(&self) -> f64 {
        self.threshold
    }

    /// Column heights as of the end of the last pass.
    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    /// Cached column for an item.
    pub fn placement(&self, id: &K) -> Option<usize> {
        self.placements.get(id).copied()
    }

    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    /// Switch to a new column count.
    ///
    /// A different count clears every placement and zeroes a height vector of
    /// the new length. Returns whether anything was invalidated. Counts below
    /// one are treated as one.
    pub fn set_column_count(&mut self, column_count: usize) -> bool {
        let column_count = column_count.max(1);
        if column_count == self.column_count {
            return false;
        }
        self.column_count = column_count;
        self.placements.clear();
        self.heights = vec![0.0; column_count];
        true
    }

    /// Drop cached placements for ids not in `keep`.
    pub fn retain<F: FnMut(&K) -> bool>(&mut self, mut keep: F) {
        self.placements.retain(|id, _| keep(id));
    }

    /// Forget every placement while keeping the column count.
    pub fn reset(&mut self) {
        self.placements.clear();
        self.heights = vec![0.0; self.column_count];
    }

    /// Run one layout pass and return the items of each column, in order.
    pub fn layout<'a, T>(&mut self, items: &'a [T], column_count: usize) -> Vec<Vec<&'a T>>
    where
        T: Tile<Id = K>,
    {
        self.set_column_count(column_count);
        let columns = self.column_count;

        let mut heights = vec![0.0_f64; columns];
        let mut output: Vec<Vec<&T>> = vec![Vec::new(); columns];

        for item in items {
            let min_col = shortest_column(&heights);

            let chosen = match self.placements.get(item.tile_id()).copied() {
                Some(cached) if cached < columns => {
                    if heights[cached] > heights[min_col] + self.threshold {
                        min_col
                    } else {
                        cached
                    }
                }
                _ => min_col,
            };
            self.placements.insert(item.tile_id().clone(), chosen);

            output[chosen].push(item);
            heights[chosen] += 1.0 / sanitize_ratio(item.aspect_ratio());
        }

        self.heights = heights;
        output
    }
}

impl<K: Clone + Eq + Hash> Default for WaterfallLayout<K> {
    fn default() -> Self {
        Self::new(DEFAULT_REBALANCE_THRESHOLD)
    }
}

/// Index of the shortest column; the first one wins on ties.
fn shortest_column(heights: &[f64]) -> usize {
    let mut min_idx = 0;
    for (idx, &h) in heights.iter().enumerate().skip(1) {
        if h < heights[min_idx] {
            min_idx = idx;
        }
    }
    min_idx
}
