//! Namespace-construction-time tuning surface.
//!
//! Built once in [`crate::ftl::namespace::Namespace::new`] and treated as
//! immutable afterward: a `CoreConfig` passed at namespace construction
//! rather than read from process-wide globals.

/// Victim-selection policy selector, as a named enum instead of a bare
/// integer tuning knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcMode {
    Greedy,
    CostBenefit,
    Random,
}

#[derive(Debug, Clone, Copy)]
pub struct CoreConfig {
    pub gc_mode: GcMode,
    /// Enables hot/cold victim statistics (`ftl::stats::Stats`).
    pub debug_mode: bool,
    /// Aggregate a single NAND READ over a whole flash-page group before
    /// relocating its valid pages during GC.
    pub gc_delay: bool,
    /// Over-provisioning fraction used to derive namespace capacity from
    /// physical capacity. Default 0.07 (7%).
    pub op_area_pcent: f32,
    /// Greedy's early-exit threshold, expressed as a fraction
    /// `greedy_threshold_num / greedy_threshold_den` of `pgs_per_line`.
    /// Default 1/8.
    pub greedy_threshold_num: u32,
    pub greedy_threshold_den: u32,
    /// LPN below which a page is considered "hot region" for debug stats.
    pub hot_region_lpn_limit: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            gc_mode: GcMode::Greedy,
            debug_mode: false,
            gc_delay: true,
            op_area_pcent: 0.07,
            greedy_threshold_num: 1,
            greedy_threshold_den: 8,
            hot_region_lpn_limit: 38_400,
        }
    }
}
