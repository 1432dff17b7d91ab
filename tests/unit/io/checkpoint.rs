//! Tests for checkpoint records and the per-run store

#[cfg(test)]
mod tests {
    use hintgan::TrainingError;
    use hintgan::io::checkpoint::{Checkpoint, CheckpointStore};
    use hintgan::io::configuration::TrainingConfig;
    use hintgan::nn::optimizer::{AdamConfig, AdamState, Moments};
    use hintgan::nn::parameter::NamedTensor;
    use ndarray::{ArrayD, IxDyn};
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> TrainingConfig {
        serde_json::from_value(json!({
            "common": {
                "run_id": "store",
                "end_epoch": 10,
                "dataset_root": "data",
                "checkpoint_dir": "checkpoints",
                "eval_output_dir": "samples"
            },
            "task": { "kind": "sketch_simplification", "a_to_b": true },
            "backbones": {
                "sketch_encoder": "sketch.json",
                "content_encoder": "content.json"
            }
        }))
        .expect("well-formed configuration")
    }

    fn adam_state(step: u64) -> AdamState {
        AdamState {
            config: AdamConfig {
                learning_rate: 2e-4,
                beta1: 0.5,
                beta2: 0.999,
                epsilon: 1e-8,
            },
            moments: vec![
                Some(Moments {
                    step,
                    first: ArrayD::from_elem(IxDyn(&[2]), 0.1),
                    second: ArrayD::from_elem(IxDyn(&[2]), 0.01),
                }),
                None,
            ],
        }
    }

    fn checkpoint(epoch: usize) -> Checkpoint {
        let tensor = |name: &str, value: f32| NamedTensor {
            name: name.to_string(),
            value: ArrayD::from_elem(IxDyn(&[2]), value),
        };
        Checkpoint {
            net_g: vec![tensor("weight", 0.3), tensor("bias", -0.7)],
            net_d: vec![tensor("weight", 1.0 / 3.0)],
            opt_g: adam_state(epoch as u64 + 1),
            opt_d: adam_state(1),
            config: config(),
            epoch,
        }
    }

    // Tests a stored checkpoint reloads bit-exactly
    #[test]
    fn test_checkpoint_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("c.json");
        let original = checkpoint(4);
        original.save(&path).expect("writable");
        assert_eq!(Checkpoint::load(&path).expect("readable"), original);
    }

    // Tests a write that fails on the final flush is reported
    // Verified by letting the buffered writer flush on drop
    #[cfg(target_os = "linux")]
    #[test]
    fn test_save_reports_failed_flush() {
        let full = std::path::Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        assert!(checkpoint(1).save(full).is_err());
    }

    // Tests the store names files by epoch and finds the most recent
    // Verified by sorting epochs as strings
    #[test]
    fn test_store_lists_epochs_numerically() {
        let root = TempDir::new().expect("temp dir");
        let store = CheckpointStore::new(root.path(), "run");
        assert_eq!(store.epochs().expect("missing dir is empty"), Vec::<usize>::new());
        assert_eq!(store.latest().expect("readable"), None);

        for epoch in [2, 10, 9] {
            let path = store.save(&checkpoint(epoch)).expect("writable");
            assert_eq!(path, store.path_for(epoch));
        }
        std::fs::write(store.dir().join("notes.json"), "{}").expect("write");
        std::fs::write(store.dir().join("epoch-11.txt"), "").expect("write");

        assert_eq!(store.epochs().expect("readable"), vec![2, 9, 10]);
        assert_eq!(store.latest().expect("readable"), Some(store.path_for(10)));
        assert!(store.path_for(10).ends_with("run/epoch-10.json"));
        assert_eq!(store.load_latest().expect("readable").epoch, 10);
    }

    // Tests loading with nothing stored reports a checkpoint error
    #[test]
    fn test_load_latest_without_checkpoints() {
        let root = TempDir::new().expect("temp dir");
        let store = CheckpointStore::new(root.path(), "empty");
        assert!(matches!(
            store.load_latest(),
            Err(TrainingError::Checkpoint { .. })
        ));
    }

    // Tests records with missing, extra or invalid entries are rejected
    #[test]
    fn test_malformed_records_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("bad.json");

        let mut value = serde_json::to_value(checkpoint(1)).expect("serializable");
        value["extra"] = json!(1);
        std::fs::write(&path, value.to_string()).expect("write");
        assert!(matches!(Checkpoint::load(&path), Err(TrainingError::Checkpoint { .. })));

        let mut value = serde_json::to_value(checkpoint(1)).expect("serializable");
        if let Some(object) = value.as_object_mut() {
            object.remove("opt_d");
        }
        std::fs::write(&path, value.to_string()).expect("write");
        assert!(matches!(Checkpoint::load(&path), Err(TrainingError::Checkpoint { .. })));

        let mut invalid = checkpoint(1);
        invalid.config.common.batch_size = 0;
        invalid.save(&path).expect("writable");
        assert!(matches!(Checkpoint::load(&path), Err(TrainingError::Checkpoint { .. })));

        assert!(Checkpoint::load(&dir.path().join("absent.json")).is_err());
    }
}
