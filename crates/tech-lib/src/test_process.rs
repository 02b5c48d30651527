use crate::{guarded_setters, is_nonneg, is_pos, is_unit, LibraryError};
use serde::{Deserialize, Serialize};

/// Parameters for one test phase (self-test of a bare die, or test of an
/// assembled stack).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TestPhase {
    /// Fraction of defects this phase catches, in [0,1].
    pub defect_coverage: Option<f64>,
    /// How many dies share one test-pattern load.
    pub test_reuse: Option<f64>,
    /// Scan chain length in flops.
    pub scan_chain_length: Option<f64>,
    /// Number of parallel scan chains.
    pub scan_chain_count: Option<f64>,
    /// Overrides the derived pattern count when present.
    pub pattern_count: Option<f64>,
    /// Failure distribution tag ("normal", "exponential", ...).
    pub failure_dist: String,
}

impl TestPhase {
    /// Pattern count: the override when present, else derived from the
    /// gate count pushed through the scan chains.
    pub fn patterns(&self, gates: f64) -> f64 {
        if let Some(p) = self.pattern_count {
            return p;
        }
        let len = self.scan_chain_length.unwrap_or(1.0).max(1.0);
        let count = self.scan_chain_count.unwrap_or(1.0).max(1.0);
        (gates / (len * count)).ceil().max(1.0)
    }

    fn defined(&self) -> bool {
        is_unit(&self.defect_coverage)
            && is_pos(&self.test_reuse)
            && is_pos(&self.scan_chain_length)
            && is_pos(&self.scan_chain_count)
    }
}

/// A test process: shared cycle economics plus independent self and
/// assembly phase configurations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub name: String,
    pub time_per_test_cycle_s: Option<f64>,
    pub cost_per_second: Option<f64>,
    /// Test samples applied per scan input.
    pub samples_per_input: Option<f64>,
    pub self_phase: TestPhase,
    pub assembly_phase: TestPhase,
    #[serde(default)]
    static_latched: bool,
}

impl Test {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    guarded_setters!(
        "Test",
        set_time_per_test_cycle => time_per_test_cycle_s: f64,
        set_cost_per_second => cost_per_second: f64,
        set_samples_per_input => samples_per_input: f64,
    );

    /// Latch-guarded phase replacement.
    pub fn set_self_phase(&mut self, phase: TestPhase) -> Result<(), LibraryError> {
        if self.static_latched {
            return Err(LibraryError::StaticMutation {
                entity: "Test",
                field: "self_phase",
            });
        }
        self.self_phase = phase;
        Ok(())
    }

    /// Latch-guarded phase replacement.
    pub fn set_assembly_phase(&mut self, phase: TestPhase) -> Result<(), LibraryError> {
        if self.static_latched {
            return Err(LibraryError::StaticMutation {
                entity: "Test",
                field: "assembly_phase",
            });
        }
        self.assembly_phase = phase;
        Ok(())
    }

    /// All required fields present and in range.
    pub fn fully_defined(&self) -> bool {
        !self.name.is_empty()
            && is_nonneg(&self.time_per_test_cycle_s)
            && is_nonneg(&self.cost_per_second)
            && is_pos(&self.samples_per_input)
            && self.self_phase.defined()
            && self.assembly_phase.defined()
    }

    /// Latch the entity read-only.
    pub fn make_static(&mut self) {
        self.static_latched = true;
    }

    /// Whether the latch has been set.
    pub fn is_static(&self) -> bool {
        self.static_latched
    }

    /// Observed yield after testing a die whose manufactured (true) yield
    /// is `true_yield`: escapes are defects the coverage misses.
    pub fn test_yield(phase: &TestPhase, true_yield: f64) -> f64 {
        let coverage = phase.defect_coverage.unwrap_or(0.0);
        1.0 - (1.0 - true_yield.clamp(0.0, 1.0)) * coverage
    }

    /// Fraction of test-passing dies that are actually good. Zero when the
    /// test yield is zero.
    pub fn quality(phase: &TestPhase, true_yield: f64) -> f64 {
        let ty = Self::test_yield(phase, true_yield);
        if ty == 0.0 {
            0.0
        } else {
            true_yield.clamp(0.0, 1.0) / ty
        }
    }

    /// Wall-clock test time for one die of `gates` gates in `phase`.
    pub fn test_time_s(&self, phase: &TestPhase, gates: f64) -> f64 {
        let cycle = self.time_per_test_cycle_s.unwrap_or(0.0);
        let samples = self.samples_per_input.unwrap_or(1.0);
        let reuse = phase.test_reuse.unwrap_or(1.0).max(1.0);
        let scan_len = phase.scan_chain_length.unwrap_or(1.0).max(1.0);
        phase.patterns(gates) * scan_len * cycle * samples / reuse
    }

    /// Test cost for one die of `gates` gates in `phase`.
    pub fn test_cost(&self, phase: &TestPhase, gates: f64) -> f64 {
        self.test_time_s(phase, gates) * self.cost_per_second.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn phase() -> TestPhase {
        TestPhase {
            defect_coverage: Some(0.9),
            test_reuse: Some(1.0),
            scan_chain_length: Some(1000.0),
            scan_chain_count: Some(10.0),
            pattern_count: None,
            failure_dist: "normal".to_string(),
        }
    }

    fn test_proc() -> Test {
        let mut t = Test::new("KGD");
        t.set_time_per_test_cycle(1e-8).unwrap();
        t.set_cost_per_second(0.01).unwrap();
        t.set_samples_per_input(2.0).unwrap();
        t.set_self_phase(phase()).unwrap();
        t.set_assembly_phase(phase()).unwrap();
        t
    }

    #[test]
    fn test_yield_and_quality() {
        let p = phase();
        // true yield 0.8, coverage 0.9: test yield = 1 - 0.2*0.9 = 0.82
        let ty = Test::test_yield(&p, 0.8);
        assert!((ty - 0.82).abs() < 1e-12);
        let q = Test::quality(&p, 0.8);
        assert!((q - 0.8 / 0.82).abs() < 1e-12);
    }

    #[test]
    fn zero_test_yield_gives_zero_quality() {
        let p = TestPhase {
            defect_coverage: Some(1.0),
            ..phase()
        };
        assert_eq!(Test::test_yield(&p, 0.0), 0.0);
        assert_eq!(Test::quality(&p, 0.0), 0.0);
    }

    #[test]
    fn pattern_override_wins() {
        let mut p = phase();
        assert_eq!(p.patterns(1.0e6), 100.0);
        p.pattern_count = Some(42.0);
        assert_eq!(p.patterns(1.0e6), 42.0);
    }

    #[test]
    fn test_time_scales_with_gates() {
        let t = test_proc();
        let short = t.test_time_s(&t.self_phase, 1.0e5);
        let long = t.test_time_s(&t.self_phase, 1.0e7);
        assert!(long > short);
    }

    #[test]
    fn latch_blocks_phase_swap() {
        let mut t = test_proc();
        assert!(t.fully_defined());
        t.make_static();
        assert!(t.set_self_phase(phase()).is_err());
        assert!(t.set_cost_per_second(1.0).is_err());
    }

    proptest! {
        #[test]
        fn quality_in_unit_interval(y in 0.0f64..=1.0, cov in 0.0f64..=1.0) {
            let p = TestPhase { defect_coverage: Some(cov), ..phase() };
            let q = Test::quality(&p, y);
            prop_assert!((0.0..=1.0).contains(&q));
        }
    }
}
