//! Tests for the step decay learning rate schedule

#[cfg(test)]
mod tests {
    use hintgan::nn::optimizer::{Adam, AdamConfig};
    use hintgan::nn::scheduler::StepDecay;

    // Tests the rate decays by gamma once per step_size epochs
    // Verified by using ceiling instead of floor division
    #[test]
    fn test_step_decay_boundaries() {
        let mut schedule = StepDecay::new(2e-4, 50, 0.1).expect("valid schedule");
        assert!((schedule.learning_rate() - 2e-4).abs() < f32::EPSILON);
        for _ in 0..49 {
            schedule.step();
        }
        assert!((schedule.learning_rate() - 2e-4).abs() < f32::EPSILON);
        schedule.step();
        assert_eq!(schedule.epoch(), 50);
        assert!((schedule.learning_rate() / 2e-5 - 1.0).abs() < 1e-5);

        let resumed = StepDecay::at_epoch(2e-4, 50, 0.1, 120).expect("valid schedule");
        assert!((resumed.learning_rate() / 2e-6 - 1.0).abs() < 1e-5);
    }

    // Tests invalid schedules are rejected
    #[test]
    fn test_step_decay_validation() {
        assert!(StepDecay::new(1e-3, 0, 0.5).is_err());
        assert!(StepDecay::new(1e-3, 10, 0.0).is_err());
        assert!(StepDecay::new(1e-3, 10, 1.5).is_err());
        assert!(StepDecay::new(1e-3, 10, 1.0).is_ok());
    }

    // Tests apply writes the current rate into the optimizer
    #[test]
    fn test_apply_sets_optimizer_rate() {
        let config = AdamConfig {
            learning_rate: 1.0,
            beta1: 0.5,
            beta2: 0.999,
            epsilon: 1e-8,
        };
        let mut adam = Adam::new(config, 0).expect("valid config");
        let schedule = StepDecay::at_epoch(1.0, 1, 0.5, 3).expect("valid schedule");
        schedule.apply(&mut adam);
        assert!((adam.learning_rate() - 0.125).abs() < f32::EPSILON);
    }
}
