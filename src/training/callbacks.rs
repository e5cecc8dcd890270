//! Training callbacks
//!
//! Early stopping and learning-rate reduction, both monitoring validation
//! loss. Each callback tracks its own best value and patience counter, so
//! the learning rate can drop several times before training finally stops.

use serde::{Deserialize, Serialize};

/// Configuration for early stopping on a validation-loss plateau
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    /// Epochs without improvement before stopping
    pub patience: usize,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self { patience: 10 }
    }
}

/// Early stopping state
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    /// Create a new early stopping monitor
    pub fn new(config: &EarlyStoppingConfig) -> Self {
        Self {
            patience: config.patience,
            best_loss: f64::INFINITY,
            epochs_without_improvement: 0,
        }
    }

    /// Record a validation loss; returns true when training should stop
    pub fn observe(&mut self, val_loss: f64) -> bool {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.epochs_without_improvement = 0;
            return false;
        }

        self.epochs_without_improvement += 1;
        self.epochs_without_improvement >= self.patience
    }

    /// Configured patience
    pub fn patience(&self) -> usize {
        self.patience
    }
}

/// Configuration for learning-rate reduction on a validation-loss plateau
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceLrConfig {
    /// Multiplier applied to the learning rate on plateau
    pub factor: f64,
    /// Epochs without improvement before reducing
    pub patience: usize,
    /// Lower bound for the learning rate
    pub min_lr: f64,
}

impl Default for ReduceLrConfig {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 2,
            min_lr: 1e-6,
        }
    }
}

/// Reduce-on-plateau state
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_lr: f64,
    current_lr: f64,
    best_loss: f64,
    epochs_without_improvement: usize,
}

impl ReduceLrOnPlateau {
    /// Create a new monitor starting at the given learning rate
    pub fn new(config: &ReduceLrConfig, initial_lr: f64) -> Self {
        Self {
            factor: config.factor,
            patience: config.patience,
            min_lr: config.min_lr,
            current_lr: initial_lr,
            best_loss: f64::INFINITY,
            epochs_without_improvement: 0,
        }
    }

    /// Record a validation loss and return (learning rate, was_reduced)
    pub fn step(&mut self, val_loss: f64) -> (f64, bool) {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.epochs_without_improvement = 0;
            return (self.current_lr, false);
        }

        self.epochs_without_improvement += 1;

        if self.epochs_without_improvement >= self.patience {
            let new_lr = (self.current_lr * self.factor).max(self.min_lr);
            let reduced = new_lr < self.current_lr;
            if reduced {
                self.current_lr = new_lr;
                self.epochs_without_improvement = 0;
            }
            return (self.current_lr, reduced);
        }

        (self.current_lr, false)
    }

    /// Current learning rate
    pub fn learning_rate(&self) -> f64 {
        self.current_lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_stopping_triggers_after_patience() {
        let mut es = EarlyStopping::new(&EarlyStoppingConfig { patience: 3 });

        assert!(!es.observe(1.0));
        assert!(!es.observe(0.9));
        // Three stagnating epochs
        assert!(!es.observe(0.95));
        assert!(!es.observe(0.95));
        assert!(es.observe(0.95));
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let mut es = EarlyStopping::new(&EarlyStoppingConfig { patience: 2 });

        assert!(!es.observe(1.0));
        assert!(!es.observe(1.1));
        assert!(!es.observe(0.8)); // improvement resets the counter
        assert!(!es.observe(0.9));
        assert!(es.observe(0.9));
    }

    #[test]
    fn test_reduce_lr_on_plateau() {
        let config = ReduceLrConfig {
            factor: 0.5,
            patience: 2,
            min_lr: 1e-6,
        };
        let mut rlr = ReduceLrOnPlateau::new(&config, 1e-4);

        assert_eq!(rlr.step(1.0), (1e-4, false));
        assert_eq!(rlr.step(0.9), (1e-4, false));
        // Plateau: two epochs without improvement, then reduce
        assert_eq!(rlr.step(0.95), (1e-4, false));
        let (lr, reduced) = rlr.step(0.95);
        assert!(reduced);
        assert!((lr - 5e-5).abs() < 1e-12);
    }

    #[test]
    fn test_reduce_lr_respects_min() {
        let config = ReduceLrConfig {
            factor: 0.1,
            patience: 1,
            min_lr: 1e-5,
        };
        let mut rlr = ReduceLrOnPlateau::new(&config, 2e-5);

        rlr.step(1.0);
        let (lr, reduced) = rlr.step(1.0);
        assert!(reduced);
        assert!((lr - 1e-5).abs() < 1e-12);

        // Already at the floor; no further reduction is reported
        rlr.step(1.0);
        let (lr, reduced) = rlr.step(1.0);
        assert!(!reduced);
        assert!((lr - 1e-5).abs() < 1e-12);
    }
}
