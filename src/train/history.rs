use serde::{Serialize, Deserialize};

/// Cost and classification error of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Mean negative log-probability of the true class.
    pub cost: f64,
    /// Fraction of cases whose arg-max class is wrong.
    pub error: f64,
    pub num_cases: usize,
}

/// Result of one evaluation round on the validation batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub epoch: usize,
    pub batch: usize,
    pub logprob: BatchStats,
}

/// Everything the trainer has recorded so far. Schedulers read this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_outputs: Vec<BatchStats>,
    pub test_outputs: Vec<TestRecord>,
}

impl TrainingHistory {
    pub fn new() -> TrainingHistory {
        TrainingHistory::default()
    }

    pub fn last_test(&self) -> Option<&TestRecord> {
        self.test_outputs.last()
    }

    /// Mean cost and error over the trained batches from `from` onward.
    pub fn train_summary(&self, from: usize) -> Option<BatchStats> {
        let slice = self.train_outputs.get(from..)?;
        if slice.is_empty() {
            return None;
        }
        let cases: usize = slice.iter().map(|s| s.num_cases).sum();
        let weight = |f: fn(&BatchStats) -> f64| {
            slice.iter().map(|s| f(s) * s.num_cases as f64).sum::<f64>() / cases as f64
        };
        Some(BatchStats { cost: weight(|s| s.cost), error: weight(|s| s.error), num_cases: cases })
    }
}
