#![deny(warnings)]

//! Genetic technology-assignment optimizer.
//!
//! Searches the joint space of partition count, partition assignment, and
//! per-partition technology node. Individuals are repaired to dense IDs
//! and matching tech arity after every operator, fitness is memoized
//! under a canonical key, and the single best validated individual always
//! survives a generation.

mod individual;
mod operators;
mod optimizer;

pub use individual::{canonical_key, canonicalize, repair, Individual};
pub use operators::{crossover, mutate};
pub use optimizer::{run_ga, GaContext, GaReport};

use serde::{Deserialize, Serialize};

/// Genetic loop configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    pub num_generations: usize,
    pub population_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    /// Validated individuals copied unchanged into the next generation.
    pub elite_count: usize,
    /// Stop after this many generations without a 0.1% relative
    /// improvement of the best cost.
    pub max_no_improvement: usize,
    pub min_parts: usize,
    pub max_parts: usize,
    /// Canonicalize offspring to deduplicate symmetric individuals.
    pub canonical: bool,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            num_generations: 50,
            population_size: 50,
            mutation_rate: 0.2,
            crossover_rate: 0.65,
            tournament_size: 3,
            elite_count: 1,
            max_no_improvement: 10,
            min_parts: 1,
            max_parts: 8,
            canonical: false,
        }
    }
}

/// Defaults baked in from the assets directory.
pub const OPTIMIZER_DEFAULTS_YAML: &str =
    include_str!("../../../assets/data/optimizer_defaults.yaml");

/// Wrapper matching the YAML layout.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerDefaults {
    pub ga: GaConfig,
}

impl GaConfig {
    /// Load the baked-in YAML defaults.
    pub fn from_default_yaml() -> Result<GaConfig, serde_yaml::Error> {
        let defaults: OptimizerDefaults = serde_yaml::from_str(OPTIMIZER_DEFAULTS_YAML)?;
        Ok(defaults.ga)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults_match_struct_defaults() {
        let from_yaml = GaConfig::from_default_yaml().unwrap();
        let built_in = GaConfig::default();
        assert_eq!(from_yaml.num_generations, built_in.num_generations);
        assert_eq!(from_yaml.population_size, built_in.population_size);
        assert_eq!(from_yaml.mutation_rate, built_in.mutation_rate);
        assert_eq!(from_yaml.crossover_rate, built_in.crossover_rate);
        assert_eq!(from_yaml.max_no_improvement, built_in.max_no_improvement);
    }
}
