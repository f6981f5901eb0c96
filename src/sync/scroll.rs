//! Auto-scroll policy for the message view.
//!
//! Follows the bottom of the list while the user is near it, leaves the view
//! alone while they read older messages, and always jumps to the bottom once
//! after a history load.

/// Distance from the bottom, in viewport units, that still counts as "at bottom".
pub const DEFAULT_AT_BOTTOM_THRESHOLD: u32 = 50;

/// Scroll geometry reported by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Distance scrolled from the top.
    pub offset: u32,
    pub content_height: u32,
    pub viewport_height: u32,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> u32 {
        self.content_height
            .saturating_sub(self.viewport_height)
            .saturating_sub(self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    None,
    ScrollToBottom,
}

#[derive(Debug, Clone)]
pub struct ScrollCoordinator {
    threshold: u32,
    at_bottom: bool,
    last_len: usize,
    history_seen: bool,
}

impl Default for ScrollCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_AT_BOTTOM_THRESHOLD)
    }
}

impl ScrollCoordinator {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            at_bottom: true,
            last_len: 0,
            history_seen: false,
        }
    }

    /// Forget everything; call when another conversation is selected.
    pub fn reset(&mut self) {
        *self = Self::new(self.threshold);
    }

    pub fn is_at_bottom(&self) -> bool {
        self.at_bottom
    }

    /// The user scrolled (or the view was resized).
    pub fn on_user_scroll(&mut self, viewport: Viewport) {
        self.at_bottom = viewport.distance_from_bottom() < self.threshold;
    }

    /// Called after each store change with the message count and whether the
    /// history load has completed.
    pub fn observe(&mut self, len: usize, history_loaded: bool) -> ScrollAction {
        let was_empty = self.last_len == 0;
        let grew = len > self.last_len;
        self.last_len = len;

        if history_loaded && !self.history_seen {
            self.history_seen = true;
            self.at_bottom = true;
            return ScrollAction::ScrollToBottom;
        }

        if grew && (self.at_bottom || was_empty) {
            ScrollAction::ScrollToBottom
        } else {
            ScrollAction::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(offset: u32) -> Viewport {
        Viewport {
            offset,
            content_height: 1000,
            viewport_height: 400,
        }
    }

    #[test]
    fn test_history_load_always_scrolls() {
        let mut sc = ScrollCoordinator::default();
        sc.on_user_scroll(viewport(0));
        assert!(!sc.is_at_bottom());
        assert_eq!(sc.observe(20, true), ScrollAction::ScrollToBottom);
        assert!(sc.is_at_bottom());
    }

    #[test]
    fn test_follows_new_messages_near_bottom() {
        let mut sc = ScrollCoordinator::default();
        sc.observe(20, true);
        // 40 from the bottom: still counts.
        sc.on_user_scroll(viewport(560));
        assert_eq!(sc.observe(21, true), ScrollAction::ScrollToBottom);
    }

    #[test]
    fn test_reading_older_messages_is_not_interrupted() {
        let mut sc = ScrollCoordinator::default();
        sc.observe(20, true);
        sc.on_user_scroll(viewport(100));
        assert_eq!(sc.observe(21, true), ScrollAction::None);
        assert_eq!(sc.observe(22, true), ScrollAction::None);

        sc.on_user_scroll(viewport(600));
        assert_eq!(sc.observe(23, true), ScrollAction::ScrollToBottom);
    }

    #[test]
    fn test_threshold_boundary() {
        let mut sc = ScrollCoordinator::new(50);
        sc.on_user_scroll(viewport(550));
        assert!(!sc.is_at_bottom());
        sc.on_user_scroll(viewport(551));
        assert!(sc.is_at_bottom());
    }

    #[test]
    fn test_updates_without_growth_do_not_scroll() {
        let mut sc = ScrollCoordinator::default();
        sc.observe(5, true);
        assert_eq!(sc.observe(5, true), ScrollAction::None);
        assert_eq!(sc.observe(4, true), ScrollAction::None);
    }

    #[test]
    fn test_reset_scrolls_again_for_next_history() {
        let mut sc = ScrollCoordinator::default();
        sc.observe(5, true);
        sc.on_user_scroll(viewport(0));
        sc.reset();
        assert_eq!(sc.observe(0, false), ScrollAction::None);
        assert_eq!(sc.observe(3, true), ScrollAction::ScrollToBottom);
    }

    #[test]
    fn test_growth_from_empty_scrolls() {
        let mut sc = ScrollCoordinator::default();
        sc.observe(0, true);
        sc.on_user_scroll(viewport(0));
        assert_eq!(sc.observe(1, true), ScrollAction::ScrollToBottom);
    }

    #[test]
    fn test_short_content_is_at_bottom() {
        let mut sc = ScrollCoordinator::default();
        sc.on_user_scroll(Viewport {
            offset: 0,
            content_height: 100,
            viewport_height: 400,
        });
        assert!(sc.is_at_bottom());
    }
}
