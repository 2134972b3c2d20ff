//! A mounted feed: items, viewport and the layout engine that places them.
//!
//! [`Feed`] is what a view holds on to. It recomputes columns whenever the
//! items or the column count change and is the only place aspect ratios are
//! corrected after an item is created.

use crate::config::LayoutConfig;
use crate::types::FeedItem;
use crate::waterfall::WaterfallLayout;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Feed {
    items: Vec<FeedItem>,
    layout: WaterfallLayout<String>,
    config: LayoutConfig,
    column_count: usize,
}

impl Feed {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            items: Vec::new(),
            layout: WaterfallLayout::new(config.rebalance_threshold),
            column_count: config.breakpoints.small_columns.max(1),
            config,
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn layout(&self) -> &WaterfallLayout<String> {
        &self.layout
    }

    /// Update the viewport width; returns whether the column count changed.
    pub fn set_viewport_width(&mut self, width: u32) -> bool {
        self.set_column_count(self.config.breakpoints.columns_for_width(width))
    }

    /// Switch the column count. A change drops every placement right away.
    pub fn set_column_count(&mut self, column_count: usize) -> bool {
        let column_count = column_count.max(1);
        if column_count == self.column_count {
            return false;
        }
        self.column_count = column_count;
        self.layout.set_column_count(column_count);
        true
    }

    /// Append a page of items ("load more").
    pub fn append(&mut self, items: impl IntoIterator<Item = FeedItem>) {
        self.items.extend(items);
    }

    /// Replace the whole list (e.g. on a filter change). Placements of
    /// evicted items are dropped.
    pub fn replace(&mut self, items: Vec<FeedItem>) {
        let keep: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
        self.layout.retain(|id| keep.contains(id.as_str()));
        self.items = items;
    }

    /// Report the real dimensions of an item's media.
    ///
    /// Returns `true` when the stored aspect ratio changed and the columns
    /// need recomputing. Unknown ids are ignored.
    pub fn on_media_loaded(&mut self, id: &str, width: u32, height: u32) -> bool {
        let tolerance = self.config.aspect_tolerance;
        match self.items.iter_mut().find(|i| i.id == id) {
            Some(item) => item.correct_aspect_ratio(width, height, tolerance),
            None => false,
        }
    }

    /// Run a layout pass over the current items.
    pub fn columns(&mut self) -> Vec<Vec<&FeedItem>> {
        self.layout.layout(&self.items, self.column_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: &str) -> FeedItem {
        FeedItem::new(id, format!("images/{id}.png"))
    }

    fn column_ids(feed: &mut Feed) -> Vec<Vec<String>> {
        feed.columns()
            .iter()
            .map(|c| c.iter().map(|i| i.id.clone()).collect())
            .collect()
    }

    #[test]
    fn starts_with_small_layout() {
        let feed = Feed::new(LayoutConfig::default());
        assert_eq!(feed.column_count(), 1);
    }

    #[test]
    fn viewport_width_drives_columns() {
        let mut feed = Feed::new(LayoutConfig::default());
        assert!(feed.set_viewport_width(1440));
        assert_eq!(feed.column_count(), 4);
        assert!(!feed.set_viewport_width(1920));
        assert!(feed.set_viewport_width(800));
        assert_eq!(feed.column_count(), 2);
    }

    #[test]
    fn resize_resets_placements() {
        let mut feed = Feed::new(LayoutConfig::default());
        feed.set_viewport_width(1440);
        feed.append(["a", "b", "c", "d"].map(square));
        let four = column_ids(&mut feed);
        assert_eq!(four.len(), 4);
        assert_eq!(feed.layout().placement(&"d".to_string()), Some(3));

        feed.set_viewport_width(800);
        let two = column_ids(&mut feed);
        assert_eq!(two, vec![vec!["a", "c"], vec!["b", "d"]]);
    }

    #[test]
    fn resize_clears_layout_state_before_next_pass() {
        let mut feed = Feed::new(LayoutConfig::default());
        feed.set_column_count(4);
        feed.append(["a", "b", "c", "d", "e"].map(square));
        feed.columns();
        assert_eq!(feed.layout().placed_count(), 5);

        assert!(feed.set_column_count(2));
        assert_eq!(feed.layout().placed_count(), 0);
        assert_eq!(feed.layout().placement(&"a".to_string()), None);
        assert_eq!(feed.layout().heights(), &[0.0, 0.0]);
        assert_eq!(feed.layout().column_count(), 2);

        // Same count again is a no-op
        feed.columns();
        assert!(!feed.set_column_count(2));
        assert_eq!(feed.layout().placed_count(), 5);
    }

    #[test]
    fn media_load_triggers_relayout_only_past_tolerance() {
        let mut feed = Feed::new(LayoutConfig::default());
        feed.append(["a", "b"].map(square));
        assert!(!feed.on_media_loaded("a", 1010, 1000));
        assert!(feed.on_media_loaded("a", 2000, 1000));
        assert_eq!(feed.items()[0].aspect_ratio, 2.0);
        assert!(!feed.on_media_loaded("missing", 10, 10));
    }

    #[test]
    fn append_keeps_existing_columns() {
        let mut feed = Feed::new(LayoutConfig::default());
        feed.set_column_count(3);
        feed.append(["a", "b", "c", "d"].map(square));
        feed.columns();
        let before: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| feed.layout().placement(&id.to_string()))
            .collect();

        feed.append(["e", "f", "g"].map(square));
        feed.columns();
        let after: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| feed.layout().placement(&id.to_string()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn replace_prunes_evicted_placements() {
        let mut feed = Feed::new(LayoutConfig::default());
        feed.set_column_count(2);
        feed.append(["a", "b", "c"].map(square));
        feed.columns();

        feed.replace(vec![square("c"), square("x")]);
        assert_eq!(feed.layout().placement(&"a".to_string()), None);
        assert_eq!(feed.layout().placement(&"c".to_string()), Some(0));
        let cols = column_ids(&mut feed);
        assert_eq!(cols, vec![vec!["c"], vec!["x"]]);
    }
}
