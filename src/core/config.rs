use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::errors::{GridError, Result};

/// Grid configuration with all tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    // Optimization toggles, consulted when a computer registers
    /// Let result sinks keep sub-tasks on the producing machine
    pub latency_optimization: bool,
    /// Start one worker per processor instead of a single worker
    pub multicore_optimization: bool,

    // Queue sizing
    /// Local queue capacity per processor when latency optimization is on
    pub task_queue_max_size: usize,
    /// Local queue capacity when latency optimization is off
    pub task_queue_min_size: usize,
    /// Worker count when multicore optimization is off
    pub min_processors: usize,

    // Dispatch
    /// A computer only receives a batch while its queue is below this size
    pub dispatch_low_water: usize,
    /// Idle poll cadence of the dispatch loop
    pub dispatch_interval: Duration,

    // Result sink
    /// Maximum results shipped per report call
    pub result_batch_size: usize,

    /// Processors advertised by a computer created from this config
    pub processors: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            latency_optimization: false,
            multicore_optimization: false,
            task_queue_max_size: 1000,
            task_queue_min_size: 1,
            min_processors: 1,
            dispatch_low_water: 500,
            dispatch_interval: Duration::from_millis(5),
            result_batch_size: 5,
            processors: num_cpus::get(),
        }
    }
}

/// Worker count and local queue capacity handed to a registering computer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPlan {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl GridConfig {
    /// Create a new builder for GridConfig
    pub fn builder() -> GridConfigBuilder {
        GridConfigBuilder::new()
    }

    /// Load a configuration from a JSON document
    pub fn from_json_str(doc: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML document
    pub fn from_yaml_str(doc: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.task_queue_max_size == 0 {
            return Err(GridError::configuration_field(
                "must be greater than 0",
                "task_queue_max_size",
            ));
        }
        if self.task_queue_min_size == 0 {
            return Err(GridError::configuration_field(
                "must be greater than 0",
                "task_queue_min_size",
            ));
        }
        if self.task_queue_min_size > self.task_queue_max_size {
            return Err(GridError::configuration(
                "task_queue_min_size cannot exceed task_queue_max_size",
            ));
        }
        if self.min_processors == 0 {
            return Err(GridError::configuration_field(
                "must be greater than 0",
                "min_processors",
            ));
        }
        if self.dispatch_low_water == 0 {
            return Err(GridError::configuration_field(
                "must be greater than 0",
                "dispatch_low_water",
            ));
        }
        if self.result_batch_size == 0 {
            return Err(GridError::configuration_field(
                "must be greater than 0",
                "result_batch_size",
            ));
        }
        if self.processors == 0 {
            return Err(GridError::configuration_field(
                "must be greater than 0",
                "processors",
            ));
        }
        Ok(())
    }

    /// Decide worker count and queue capacity for a machine with
    /// `processors` processing units.
    pub fn worker_plan(&self, processors: usize) -> WorkerPlan {
        let large_queue = processors.saturating_mul(self.task_queue_max_size);
        match (self.latency_optimization, self.multicore_optimization) {
            (true, true) => WorkerPlan {
                workers: processors,
                queue_capacity: large_queue,
            },
            (true, false) => WorkerPlan {
                workers: self.min_processors,
                queue_capacity: large_queue,
            },
            (false, true) => WorkerPlan {
                workers: processors,
                queue_capacity: self.task_queue_min_size,
            },
            (false, false) => WorkerPlan {
                workers: self.min_processors,
                queue_capacity: self.task_queue_min_size,
            },
        }
    }

    /// Create a configuration suited to tests and local runs
    pub fn development() -> Self {
        Self {
            processors: 2,
            dispatch_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    /// Create a configuration with both optimizations enabled
    pub fn production() -> Self {
        Self {
            latency_optimization: true,
            multicore_optimization: true,
            ..Default::default()
        }
    }
}

/// Builder for GridConfig
pub struct GridConfigBuilder {
    config: GridConfig,
}

impl GridConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GridConfig::default(),
        }
    }

    pub fn latency_optimization(mut self, enabled: bool) -> Self {
        self.config.latency_optimization = enabled;
        self
    }

    pub fn multicore_optimization(mut self, enabled: bool) -> Self {
        self.config.multicore_optimization = enabled;
        self
    }

    /// Set the large and minimal local queue capacities
    pub fn queue_sizes(mut self, min: usize, max: usize) -> Self {
        self.config.task_queue_min_size = min;
        self.config.task_queue_max_size = max;
        self
    }

    pub fn dispatch_low_water(mut self, low_water: usize) -> Self {
        self.config.dispatch_low_water = low_water;
        self
    }

    pub fn dispatch_interval(mut self, interval: Duration) -> Self {
        self.config.dispatch_interval = interval;
        self
    }

    pub fn result_batch_size(mut self, size: usize) -> Self {
        self.config.result_batch_size = size;
        self
    }

    pub fn processors(mut self, processors: usize) -> Self {
        self.config.processors = processors;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<GridConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for GridConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.result_batch_size, 5);
        assert_eq!(config.dispatch_low_water, 500);
    }

    #[test]
    fn test_worker_plan_combinations() {
        let mut config = GridConfig::default();

        assert_eq!(
            config.worker_plan(4),
            WorkerPlan { workers: 1, queue_capacity: 1 }
        );

        config.multicore_optimization = true;
        assert_eq!(
            config.worker_plan(4),
            WorkerPlan { workers: 4, queue_capacity: 1 }
        );

        config.latency_optimization = true;
        assert_eq!(
            config.worker_plan(4),
            WorkerPlan { workers: 4, queue_capacity: 4000 }
        );

        config.multicore_optimization = false;
        assert_eq!(
            config.worker_plan(4),
            WorkerPlan { workers: 1, queue_capacity: 4000 }
        );
    }

    #[test]
    fn test_worker_plan_caps_huge_processor_counts() {
        let mut config = GridConfig::default();
        config.latency_optimization = true;
        config.multicore_optimization = true;
        assert_eq!(
            config.worker_plan(usize::MAX),
            WorkerPlan { workers: usize::MAX, queue_capacity: usize::MAX }
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = GridConfig::default();

        config.processors = 0;
        assert!(config.validate().is_err());
        config.processors = 2;

        config.task_queue_min_size = 2000;
        assert!(config.validate().is_err());
        config.task_queue_min_size = 1;

        config.result_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = GridConfig::builder()
            .latency_optimization(true)
            .queue_sizes(2, 50)
            .result_batch_size(3)
            .processors(8)
            .build()
            .unwrap();

        assert!(config.latency_optimization);
        assert!(!config.multicore_optimization);
        assert_eq!(config.task_queue_min_size, 2);
        assert_eq!(config.task_queue_max_size, 50);
        assert_eq!(config.result_batch_size, 3);
        assert_eq!(config.processors, 8);
    }

    #[test]
    fn test_load_from_documents() {
        let config = GridConfig::from_json_str(
            r#"{"latency_optimization": true, "processors": 3}"#,
        )
        .unwrap();
        assert!(config.latency_optimization);
        assert_eq!(config.processors, 3);
        assert_eq!(config.task_queue_max_size, 1000);

        let config = GridConfig::from_yaml_str("multicore_optimization: true\nresult_batch_size: 7\n")
            .unwrap();
        assert!(config.multicore_optimization);
        assert_eq!(config.result_batch_size, 7);

        assert!(GridConfig::from_yaml_str("processors: 0\n").is_err());
    }
}
