//! Tests for standalone generation from a checkpoint

#[cfg(test)]
mod tests {
    use crate::train::fixture::{SIZE, colorization};
    use hintgan::TrainingError;
    use hintgan::io::configuration::InferenceConfig;
    use hintgan::io::image::load_image;
    use hintgan::train::inference::run_inference;
    use hintgan::train::orchestrator::train;

    // Tests every input produces a result image, its hint, input and target, and a strip
    // Verified by rendering only the sketch and result panels
    fn test_inference_writes_results() {
        let workspace = colorization("infer", 1);
        train(workspace.config.clone(), false, Vec::new()).expect("training succeeds");

        let common = &workspace.config.common;
        let output_dir = workspace.dir.path().join("out");
        let config = InferenceConfig {
            checkpoint: common.checkpoint_dir.join("infer").join("epoch-0.json"),
            input_dir: common.dataset_root.join("val"),
            output_dir: output_dir.clone(),
            hint_mask: true,
            hint_multiplier: 1.0,
            seed: 3,
        };

        assert_eq!(run_inference(&config).expect("inference succeeds"), 2);
        for name in ["s0", "s1"] {
            let result = load_image(&output_dir.join(format!("{name}_result.png")))
                .expect("result written");
            assert_eq!((result.width(), result.height()), (SIZE, SIZE));
            assert!(result.as_rgb8().is_some());

            let target = load_image(&output_dir.join(format!("{name}_target.png")))
                .expect("target written");
            assert_eq!((target.width(), target.height()), (SIZE, SIZE));
            let input = load_image(&output_dir.join(format!("{name}_input.png")))
                .expect("input written");
            assert!(input.as_luma8().is_some());
            let hint = load_image(&output_dir.join(format!("{name}_hint.png")))
                .expect("hint written");
            assert_eq!((hint.width(), hint.height()), (SIZE / 4, SIZE / 4));

            // Input, hint, mask, target and output panels at full height
            let strip = load_image(&output_dir.join("strips").join(format!("{name}.png")))
                .expect("strip written");
            assert_eq!(strip.height(), SIZE);
            assert_eq!(strip.width(), 5 * SIZE + 4 * 4);
        }

        // Without hints the result does not depend on the seed
        let unhinted = |seed, dir: &str| {
            let config = InferenceConfig {
                hint_mask: false,
                seed,
                output_dir: workspace.dir.path().join(dir),
                ..config.clone()
            };
            run_inference(&config).expect("inference succeeds");
            assert!(!config.output_dir.join("s0_hint.png").exists());
            load_image(&config.output_dir.join("s0_result.png"))
                .expect("result written")
                .to_rgb8()
        };
        assert_eq!(unhinted(1, "a"), unhinted(2, "b"));
    }

    // Tests a missing checkpoint is reported as such
    #[test]
    fn test_missing_checkpoint() {
        let workspace = colorization("nocheckpoint", 1);
        let config = InferenceConfig {
            checkpoint: workspace.dir.path().join("absent.json"),
            input_dir: workspace.config.common.dataset_root.join("val"),
            output_dir: workspace.dir.path().join("out"),
            hint_mask: false,
            hint_multiplier: 1.0,
            seed: 0,
        };
        assert!(matches!(
            run_inference(&config),
            Err(TrainingError::Checkpoint { .. })
        ));
    }
}
