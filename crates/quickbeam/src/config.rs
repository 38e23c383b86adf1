//! Engine configuration

/// Tunables shared by the heap, the cycle detector and the thread stacks.
///
/// Passed to [`crate::Engine::new`]; every program created from that engine
/// sees the same settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Slots per thread-local stack block
    pub stack_block_size: usize,

    /// Whether releases and mutations trigger RSet scans
    pub cycle_detection: bool,

    /// A scan visiting more nodes than this gives up
    pub max_scan_nodes: usize,

    /// Hard stop for alias chains, on top of the visited-set check
    pub max_alias_depth: usize,

    /// How often a scan invalidated by a concurrent mutation is restarted
    pub scan_retries: usize,

    /// Largest index a write may pad a list or binary out to
    pub max_list_index: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_block_size: 32,
            cycle_detection: true,
            max_scan_nodes: 100_000,
            max_alias_depth: 1_000,
            scan_retries: 2,
            max_list_index: 1 << 24,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of slots per stack block (at least one).
    pub fn with_stack_block_size(mut self, size: usize) -> Self {
        self.stack_block_size = size.max(1);
        self
    }

    /// Enable or disable cycle detection.
    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.cycle_detection = enabled;
        self
    }

    /// Set the node limit for a single scan.
    pub fn with_max_scan_nodes(mut self, limit: usize) -> Self {
        self.max_scan_nodes = limit;
        self
    }

    /// Set the alias hop limit.
    pub fn with_max_alias_depth(mut self, depth: usize) -> Self {
        self.max_alias_depth = depth;
        self
    }

    /// Set how many times a stale scan is retried.
    pub fn with_scan_retries(mut self, retries: usize) -> Self {
        self.scan_retries = retries;
        self
    }

    /// Set the largest index a write past the end may pad out to.
    pub fn with_max_list_index(mut self, index: usize) -> Self {
        self.max_list_index = index;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stack_block_size, 32);
        assert!(config.cycle_detection);
        assert_eq!(config.scan_retries, 2);
        assert_eq!(config.max_list_index, 16_777_216);
    }

    #[test]
    fn test_builder_clamps_block_size() {
        let config = EngineConfig::new()
            .with_stack_block_size(0)
            .with_cycle_detection(false);
        assert_eq!(config.stack_block_size, 1);
        assert!(!config.cycle_detection);
    }
}
