/// Tunables for a [`crate::store::PagingStore`], constructed
/// programmatically or from a small `serde`-deserialisable struct the way
/// `ioi-scs::store::StoreConfig` is, by a host binary's own argument
/// parsing — this crate has no CLI of its own.
#[derive(Debug, Clone, Copy)]
pub struct PagingConfig {
    /// Maximum size of a single `partN` segment file before the writer
    /// rolls over to a new one.
    pub segment_max_bytes: u64,
    /// Number of pinned (resident-in-memory) nodes the eviction list is
    /// allowed to hold before `Unload` must run.
    pub working_set: usize,
    /// Capacity of the writer's buffered-write layer.
    pub writer_buffer_bytes: usize,
}

impl Default for PagingConfig {
    fn default() -> PagingConfig {
        PagingConfig {
            segment_max_bytes: 4 * 1024 * 1024 * 1024,
            working_set: 1_000_000,
            writer_buffer_bytes: 20 * 1024 * 1024,
        }
    }
}
