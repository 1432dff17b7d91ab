//! Tests for Adam updates and optimizer state handling

#[cfg(test)]
mod tests {
    use hintgan::TrainingError;
    use hintgan::autodiff::{Gradients, Var, backward};
    use hintgan::nn::optimizer::{Adam, AdamConfig};
    use hintgan::nn::parameter::{Access, ParameterGroup};
    use ndarray::{ArrayD, IxDyn};

    fn vector(values: &[f32]) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).expect("1-d")
    }

    fn config(learning_rate: f32) -> AdamConfig {
        AdamConfig {
            learning_rate,
            beta1: 0.5,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    // Gradients of sum(param * slope) for the first parameter of `group`
    fn linear_gradients(group: &ParameterGroup, slope: &[f32]) -> Gradients {
        let param = group.get(0).expect("parameter");
        let loss = param
            .mul(&Var::constant(vector(slope)))
            .and_then(|l| l.sum())
            .expect("forward");
        backward(&loss).expect("tracked")
    }

    // Tests the first bias-corrected step moves each weight by the learning rate against its gradient sign
    // Verified by omitting first-moment bias correction
    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut group = ParameterGroup::new("g", Access::Trainable);
        group.push("w", vector(&[1.0, -1.0]));
        let mut adam = Adam::new(config(0.1), 1).expect("valid config");

        let gradients = linear_gradients(&group, &[0.5, -2.0]);
        assert_eq!(adam.step(&mut group, &gradients).expect("step"), 1);

        let value = group.get(0).expect("parameter").value();
        assert!((value[[0]] - 0.9).abs() < 1e-6);
        assert!((value[[1]] + 0.9).abs() < 1e-6);
        assert!(group.get(0).expect("parameter").requires_grad());
    }

    // Tests frozen groups are refused
    #[test]
    fn test_step_refuses_frozen_group() {
        let mut group = ParameterGroup::new("frozen", Access::Trainable);
        group.push("w", vector(&[1.0]));
        let gradients = linear_gradients(&group, &[1.0]);
        group.set_access(Access::Frozen);

        let mut adam = Adam::new(config(0.1), 1).expect("valid config");
        let result = adam.step(&mut group, &gradients);
        assert!(matches!(result, Err(TrainingError::FrozenParameters { .. })));
        assert!((group.get(0).expect("parameter").value()[[0]] - 1.0).abs() < f32::EPSILON);
    }

    // Tests parameters without gradients keep their value and moments
    #[test]
    fn test_parameters_without_gradient_are_untouched() {
        let mut group = ParameterGroup::new("g", Access::Trainable);
        group.push("used", vector(&[1.0]));
        group.push("unused", vector(&[5.0]));
        let mut adam = Adam::new(config(0.1), 2).expect("valid config");

        let gradients = linear_gradients(&group, &[1.0]);
        assert_eq!(adam.step(&mut group, &gradients).expect("step"), 1);
        assert!((group.get(1).expect("parameter").value()[[0]] - 5.0).abs() < f32::EPSILON);

        let state = adam.state();
        assert!(state.moments.first().is_some_and(Option::is_some));
        assert!(state.moments.get(1).is_some_and(Option::is_none));
    }

    // Tests layout mismatches between optimizer and group
    #[test]
    fn test_step_layout_mismatch() {
        let mut group = ParameterGroup::new("g", Access::Trainable);
        group.push("w", vector(&[1.0]));
        let gradients = linear_gradients(&group, &[1.0]);
        let mut adam = Adam::new(config(0.1), 3).expect("valid config");
        assert!(adam.step(&mut group, &gradients).is_err());
    }

    // Tests hyperparameter validation
    #[test]
    fn test_config_validation() {
        assert!(Adam::new(config(-1.0), 1).is_err());
        assert!(Adam::new(config(f32::NAN), 1).is_err());
        assert!(Adam::new(AdamConfig { beta1: 1.0, ..config(0.1) }, 1).is_err());
        assert!(Adam::new(AdamConfig { epsilon: 0.0, ..config(0.1) }, 1).is_err());
    }

    // Tests a restored optimizer continues identically to the original
    // Verified by resetting step counters on load
    #[test]
    fn test_state_roundtrip_continues_identically() {
        let mut group = ParameterGroup::new("g", Access::Trainable);
        group.push("w", vector(&[0.3, -0.7]));
        let mut adam = Adam::new(config(0.05), 1).expect("valid config");
        let gradients = linear_gradients(&group, &[0.2, 0.4]);
        adam.step(&mut group, &gradients).expect("step");

        let mut restored = Adam::new(config(1.0), 1).expect("valid config");
        restored.load_state(adam.state(), &group).expect("same layout");
        assert!((restored.learning_rate() - 0.05).abs() < f32::EPSILON);

        let mut twin = group.clone();
        let next = linear_gradients(&group, &[-0.1, 0.3]);
        let twin_next = linear_gradients(&twin, &[-0.1, 0.3]);
        adam.step(&mut group, &next).expect("step");
        restored.step(&mut twin, &twin_next).expect("step");
        assert_eq!(
            group.get(0).expect("parameter").value(),
            twin.get(0).expect("parameter").value()
        );

        let mut wrong = Adam::new(config(0.1), 2).expect("valid config");
        assert!(wrong.load_state(adam.state(), &group).is_err());
    }

    // Tests stored moments shaped unlike their parameter are refused at load
    // Verified by checking only the slot count on load
    #[test]
    fn test_load_state_rejects_misshapen_moments() {
        let mut group = ParameterGroup::new("g", Access::Trainable);
        group.push("w", vector(&[0.3, -0.7]));
        let mut adam = Adam::new(config(0.05), 1).expect("valid config");
        let gradients = linear_gradients(&group, &[0.2, 0.4]);
        adam.step(&mut group, &gradients).expect("step");

        let mut state = adam.state();
        if let Some(Some(moments)) = state.moments.first_mut() {
            moments.first = vector(&[0.0]);
            moments.second = vector(&[0.0]);
        }

        let mut restored = Adam::new(config(0.05), 1).expect("valid config");
        let result = restored.load_state(state, &group);
        assert!(matches!(result, Err(TrainingError::ShapeMismatch { .. })));

        let next = linear_gradients(&group, &[0.1, 0.1]);
        restored.step(&mut group, &next).expect("untouched state still steps");
    }
}
