//! Configuration of the local engine

use dataplan_readers::csv::CsvReaderOptions;

/// Configuration for a [`LocalEngine`](crate::LocalEngine)
#[derive(Debug, Clone)]
pub struct LocalEngineConfig {
    /// Options for reading CSV locators
    pub csv: CsvReaderOptions,

    /// Minimum input size for running record functions in parallel
    pub parallel_threshold: usize,

    /// Number of worker threads
    pub worker_threads: usize,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            csv: CsvReaderOptions::default(),
            parallel_threshold: 10_000,
            worker_threads: num_cpus::get(),
        }
    }
}
