//! Render statistics: per-thread ray and traversal counters, aggregated at
//! the end of a render when `--stats` is passed.

/// Counters owned by a single worker thread's traversal workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub primary_rays: u64,
    pub secondary_rays: u64,
    pub bvh_node_visits: u64,
    pub intersection_tests: u64,
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.primary_rays += other.primary_rays;
        self.secondary_rays += other.secondary_rays;
        self.bvh_node_visits += other.bvh_node_visits;
        self.intersection_tests += other.intersection_tests;
    }

    pub fn log_summary(&self) {
        log::info!(
            "rays: {} primary, {} secondary | bvh node visits: {} | intersection tests: {}",
            self.primary_rays,
            self.secondary_rays,
            self.bvh_node_visits,
            self.intersection_tests,
        );
    }
}
