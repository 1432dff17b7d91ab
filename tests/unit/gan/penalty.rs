//! Tests for the gradient penalty and its differentiability

#[cfg(test)]
mod tests {
    use hintgan::Result;
    use hintgan::TrainingError;
    use hintgan::autodiff::{Var, backward};
    use hintgan::gan::penalty::{gradient_penalty, gradient_penalty_at};
    use hintgan::nn::network::{Critic, Network};
    use hintgan::nn::parameter::{Access, ParameterGroup};
    use hintgan::nn::reference::{CriticShape, PixelCritic};
    use ndarray::{ArrayD, IxDyn};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Scores each sample by a dot product with a fixed weight vector
    struct LinearCritic {
        params: ParameterGroup,
    }

    impl LinearCritic {
        fn new(weights: &[f32], access: Access) -> Self {
            let mut params = ParameterGroup::new("linear", access);
            params.push(
                "w",
                ArrayD::from_shape_vec(IxDyn(&[weights.len(), 1]), weights.to_vec()).expect("column"),
            );
            Self { params }
        }
    }

    impl Network for LinearCritic {
        fn parameters(&self) -> &ParameterGroup {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut ParameterGroup {
            &mut self.params
        }
    }

    impl Critic for LinearCritic {
        fn forward(&self, image: &Var, _features: &Var) -> Result<Var> {
            let batch = image.shape().first().copied().unwrap_or(0);
            let per = image.value().len() / batch.max(1);
            image.reshape(&[batch, per])?.matmul(self.params.get(0)?)
        }
    }

    /// Ignores the image entirely
    struct BlindCritic {
        params: ParameterGroup,
    }

    impl Network for BlindCritic {
        fn parameters(&self) -> &ParameterGroup {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut ParameterGroup {
            &mut self.params
        }
    }

    impl Critic for BlindCritic {
        fn forward(&self, _image: &Var, features: &Var) -> Result<Var> {
            features.mul(self.params.get(0)?)
        }
    }

    fn images(batch: usize, seed: f32) -> Var {
        Var::constant(ArrayD::from_shape_fn(IxDyn(&[batch, 1, 2, 2]), |d| {
            seed + d[0] as f32 - 0.3 * d[3] as f32
        }))
    }

    // Tests a linear critic gives coefficient * (|w| - 1)^2 for any interpolate
    // Verified by taking the norm over the whole batch instead of per sample
    #[test]
    fn test_linear_critic_closed_form() {
        let critic = LinearCritic::new(&[0.0, 3.0, 0.0, 4.0], Access::Frozen);
        let condition = Var::constant(ArrayD::zeros(IxDyn(&[3, 1])));
        let penalty = gradient_penalty(
            &critic,
            &images(3, 0.1),
            &images(3, -0.5),
            &condition,
            10.0,
            &mut StdRng::seed_from_u64(4),
        )
        .expect("differentiable critic");
        assert!((penalty.item().expect("scalar") - 160.0).abs() < 1e-3);
    }

    // Tests real == fake reproduces the penalty at that point, independent of the drawn alpha
    #[test]
    fn test_identical_inputs_match_direct_expression() {
        let critic = PixelCritic::new(
            CriticShape {
                image_channels: 1,
                feature_channels: 2,
                hidden_channels: 6,
            },
            &mut StdRng::seed_from_u64(5),
        )
        .expect("valid shape");
        let x = images(2, 0.25);
        let condition = Var::constant(ArrayD::from_elem(IxDyn(&[2, 2, 1, 1]), 0.4));

        let via_interpolation =
            gradient_penalty(&critic, &x, &x, &condition, 10.0, &mut StdRng::seed_from_u64(6))
                .and_then(|p| p.item())
                .expect("differentiable critic");
        let direct = gradient_penalty_at(&critic, &x, &condition, 10.0)
            .and_then(|p| p.item())
            .expect("differentiable critic");
        assert!(
            (via_interpolation - direct).abs() <= 1e-6 * direct.abs().max(1.0),
            "{via_interpolation} vs {direct}"
        );
    }

    // Tests the penalty carries gradients into the critic weights
    #[test]
    fn test_penalty_is_differentiable_in_critic_weights() {
        let unit = LinearCritic::new(&[0.0, 0.6, 0.0, 0.8], Access::Trainable);
        let condition = Var::constant(ArrayD::zeros(IxDyn(&[1, 1])));

        // |w| = 1 sits at the minimum, so the gradient vanishes
        let penalty = gradient_penalty_at(&unit, &images(1, 0.0), &condition, 10.0).expect("penalty");
        let gradients = backward(&penalty).expect("tracked");
        let w = unit.parameters().get(0).expect("weight");
        assert!(gradients.get(w).expect("weight gradient").iter().all(|g| g.abs() < 1e-4));

        // |w| = 2: d/dw 10 (|w| - 1)^2 = 20 (|w| - 1) w / |w| = 10 w
        let doubled = LinearCritic::new(&[0.0, 1.2, 0.0, 1.6], Access::Trainable);
        let penalty = gradient_penalty_at(&doubled, &images(1, 0.0), &condition, 10.0).expect("penalty");
        let gradients = backward(&penalty).expect("tracked");
        let w = doubled.parameters().get(0).expect("weight");
        let expected = w.value().mapv(|v| 10.0 * v);
        for (g, e) in gradients.get(w).expect("weight gradient").iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-3, "{g} vs {e}");
        }
    }

    // Tests error cases
    #[test]
    fn test_penalty_errors() {
        let critic = LinearCritic::new(&[1.0, 0.0, 0.0, 0.0], Access::Frozen);
        let condition = Var::constant(ArrayD::zeros(IxDyn(&[1, 1])));
        let mismatch = gradient_penalty(
            &critic,
            &images(1, 0.0),
            &images(2, 0.0),
            &condition,
            10.0,
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(mismatch, Err(TrainingError::ShapeMismatch { .. })));

        let mut params = ParameterGroup::new("blind", Access::Trainable);
        params.push("w", ArrayD::ones(IxDyn(&[1, 1])));
        let blind = BlindCritic { params };
        let result = gradient_penalty_at(&blind, &images(1, 0.0), &Var::constant(ArrayD::ones(IxDyn(&[1, 1]))), 10.0);
        assert!(matches!(result, Err(TrainingError::NotDifferentiable { .. })));
    }
}
