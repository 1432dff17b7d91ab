//! Tests for run configuration parsing, defaults and validation

#[cfg(test)]
mod tests {
    use hintgan::TrainingError;
    use hintgan::gan::mask::MaskPolicy;
    use hintgan::io::configuration::{
        AugmentationConfig, DEFAULT_BATCH_SIZE, DEFAULT_GRADIENT_PENALTY_WEIGHT,
        DEFAULT_HINT_MULTIPLIER, DEFAULT_IMAGE_SIZE, DEFAULT_LEARNING_RATE, DEFAULT_SEED,
        InferenceConfig, MASK_DOWNSCALE, TaskConfig, TrainingConfig,
    };
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn minimal() -> serde_json::Value {
        json!({
            "common": {
                "run_id": "demo",
                "end_epoch": 3,
                "dataset_root": "data",
                "checkpoint_dir": "checkpoints",
                "eval_output_dir": "samples"
            },
            "task": {
                "kind": "colorization",
                "use_hint": true,
                "train_mask": "half",
                "eval_mask": "all"
            },
            "backbones": {
                "sketch_encoder": "sketch.json",
                "content_encoder": "content.json"
            }
        })
    }

    fn parse(value: serde_json::Value) -> TrainingConfig {
        serde_json::from_value(value).expect("well-formed configuration")
    }

    fn invalid_field(config: &TrainingConfig) -> &'static str {
        match config.validate() {
            Err(TrainingError::InvalidParameter { parameter, .. }) => parameter,
            other => unreachable!("expected InvalidParameter, got {other:?}"),
        }
    }

    // Tests omitted fields take their documented defaults
    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = parse(minimal());
        config.validate().expect("defaults are valid");

        assert_eq!(config.common.seed, DEFAULT_SEED);
        assert_eq!(config.common.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.common.image_size, DEFAULT_IMAGE_SIZE);
        assert_eq!(config.common.start_epoch, 0);
        assert!((config.common.learning_rate - DEFAULT_LEARNING_RATE).abs() < f32::EPSILON);
        assert!(
            (config.adversarial.gradient_penalty_weight - DEFAULT_GRADIENT_PENALTY_WEIGHT).abs()
                < f32::EPSILON
        );
        assert_eq!(config.mask_size(), DEFAULT_IMAGE_SIZE / MASK_DOWNSCALE);
    }

    // Tests task-derived channel counts and mask policies
    #[test]
    fn test_task_properties() {
        let colorization = parse(minimal()).task;
        assert_eq!(colorization.target_channels(), 3);
        assert!(colorization.uses_hint());
        assert_eq!(colorization.hint_channels(), 4);
        assert_eq!(colorization.train_mask(), MaskPolicy::Half);
        assert_eq!(colorization.eval_mask(), MaskPolicy::All);

        let sketch = TaskConfig::SketchSimplification {
            a_to_b: true,
            augmentation: AugmentationConfig::default(),
        };
        assert_eq!(sketch.target_channels(), 1);
        assert!(!sketch.uses_hint());
        assert_eq!(sketch.hint_channels(), 0);
        assert_eq!(sketch.train_mask(), MaskPolicy::None);

        let mut value = minimal();
        value["task"] = json!({ "kind": "sketch_simplification", "a_to_b": false });
        match parse(value).task {
            TaskConfig::SketchSimplification { augmentation, a_to_b } => {
                assert!(!a_to_b);
                assert_eq!(augmentation, AugmentationConfig::default());
            }
            TaskConfig::Colorization { .. } => unreachable!("parsed the wrong task"),
        }
    }

    // Tests unknown keys are rejected rather than ignored
    // Verified by removing deny_unknown_fields from the common block
    #[test]
    fn test_unknown_fields_rejected() {
        let mut value = minimal();
        value["common"]["learning_rat"] = json!(0.1);
        assert!(serde_json::from_value::<TrainingConfig>(value).is_err());

        let mut value = minimal();
        value["task"]["augmentation"] = json!({});
        assert!(serde_json::from_value::<TrainingConfig>(value).is_err());
    }

    // Tests each range check names the offending field
    #[test]
    fn test_validation_names_field() {
        let base = parse(minimal());

        let mut config = base.clone();
        config.common.run_id = "a/b".to_string();
        assert_eq!(invalid_field(&config), "run_id");

        let mut config = base.clone();
        config.common.image_size = 30;
        assert_eq!(invalid_field(&config), "image_size");

        let mut config = base.clone();
        config.common.start_epoch = 3;
        assert_eq!(invalid_field(&config), "end_epoch");

        let mut config = base.clone();
        config.common.beta1 = 1.0;
        assert_eq!(invalid_field(&config), "beta1");

        let mut config = base.clone();
        config.common.scheduler_gamma = 0.0;
        assert_eq!(invalid_field(&config), "scheduler_gamma");

        let mut config = base.clone();
        config.common.save_freq = 0;
        assert_eq!(invalid_field(&config), "save_freq");

        let mut config = base.clone();
        config.adversarial.real_score_stabilizer = -1.0;
        assert_eq!(invalid_field(&config), "real_score_stabilizer");

        let mut config = base;
        config.task = TaskConfig::SketchSimplification {
            a_to_b: true,
            augmentation: AugmentationConfig {
                crop_scale: (0.5, 0.2),
                ..AugmentationConfig::default()
            },
        };
        assert_eq!(invalid_field(&config), "crop_scale");
    }

    // Tests augmentation bounds
    #[test]
    fn test_augmentation_validation() {
        AugmentationConfig::default().validate().expect("defaults valid");
        let rotation = AugmentationConfig {
            max_rotation_degrees: 361,
            ..AugmentationConfig::default()
        };
        assert!(rotation.validate().is_err());
        let identity = AugmentationConfig {
            identity_probability: -0.1,
            ..AugmentationConfig::default()
        };
        assert!(identity.validate().is_err());
    }

    // Tests a saved configuration loads back unchanged and invalid files are refused
    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("run.json");
        let mut config = parse(minimal());
        config.common.learning_rate = 0.000_123_4;
        config.save(&path).expect("writable");
        assert_eq!(TrainingConfig::load(&path).expect("readable"), config);

        config.common.batch_size = 0;
        config.save(&path).expect("writable");
        assert!(matches!(
            TrainingConfig::load(&path),
            Err(TrainingError::InvalidParameter { .. })
        ));

        assert!(matches!(
            TrainingConfig::load(&dir.path().join("absent.json")),
            Err(TrainingError::FileSystem { .. })
        ));
    }

    // Tests a configuration write that fails on the final flush is reported
    #[cfg(target_os = "linux")]
    #[test]
    fn test_save_reports_failed_flush() {
        let full = std::path::Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        assert!(parse(minimal()).save(full).is_err());
    }

    // Tests inference defaults, the mask switch and directory checks
    #[test]
    fn test_inference_config() {
        let config: InferenceConfig = serde_json::from_value(json!({
            "checkpoint": "run/epoch-4.json",
            "input_dir": "in",
            "output_dir": "out"
        }))
        .expect("well-formed");
        config.validate().expect("valid");
        assert!(!config.hint_mask);
        assert_eq!(config.mask_policy(), MaskPolicy::None);
        assert!((config.hint_multiplier - DEFAULT_HINT_MULTIPLIER).abs() < f32::EPSILON);

        let hinted = InferenceConfig {
            hint_mask: true,
            ..config.clone()
        };
        assert_eq!(hinted.mask_policy(), MaskPolicy::All);

        let overwrite = InferenceConfig {
            output_dir: PathBuf::from("in"),
            ..config.clone()
        };
        assert!(matches!(
            overwrite.validate(),
            Err(TrainingError::InvalidDataset { .. })
        ));

        let infinite = InferenceConfig {
            hint_multiplier: f32::INFINITY,
            ..config
        };
        assert!(infinite.validate().is_err());
    }
}
