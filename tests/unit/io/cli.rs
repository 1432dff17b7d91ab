//! Tests for command-line parsing and the backbone initialisation command

#[cfg(test)]
mod tests {
    use clap::Parser;
    use hintgan::io::cli::{Cli, Command};
    use hintgan::io::configuration::DEFAULT_SEED;
    use hintgan::io::logging::Verbosity;
    use hintgan::nn::reference::BackboneWeights;
    use std::path::PathBuf;
    use tempfile::TempDir;

    // Tests train arguments and optional overrides
    #[test]
    fn test_parse_train() {
        let cli = Cli::try_parse_from([
            "hintgan", "train", "--config", "run.json", "--epochs", "12", "--lr", "0.001", "--resume",
        ])
        .expect("valid arguments");
        assert_eq!(cli.verbosity(), Verbosity::Normal);
        match cli.command {
            Command::Train {
                config,
                epochs,
                lr,
                seed,
                resume,
            } => {
                assert_eq!(config, PathBuf::from("run.json"));
                assert_eq!(epochs, Some(12));
                assert_eq!(lr, Some(0.001));
                assert_eq!(seed, None);
                assert!(resume);
            }
            other => unreachable!("parsed {other:?}"),
        }
    }

    // Tests global verbosity flags and their conflict
    // Verified by removing conflicts_with from the quiet flag
    #[test]
    fn test_verbosity_flags() {
        let quiet = Cli::try_parse_from(["hintgan", "-q", "infer", "-c", "infer.json"])
            .expect("valid arguments");
        assert_eq!(quiet.verbosity(), Verbosity::Quiet);

        let verbose = Cli::try_parse_from(["hintgan", "infer", "-c", "infer.json", "--verbose"])
            .expect("global flag after subcommand");
        assert_eq!(verbose.verbosity(), Verbosity::Verbose);

        assert!(Cli::try_parse_from(["hintgan", "-q", "-v", "infer", "-c", "x.json"]).is_err());
        assert!(Cli::try_parse_from(["hintgan", "train"]).is_err());
        assert!(Cli::try_parse_from(["hintgan"]).is_err());
    }

    // Tests backbone initialisation writes loadable weights and never overwrites
    #[test]
    fn test_init_backbone_command() {
        let dir = TempDir::new().expect("temp dir");
        let output = dir.path().join("sketch.json");
        let path = output.to_string_lossy().to_string();

        let cli = Cli::try_parse_from([
            "hintgan", "-q", "init-backbone", "--output", path.as_str(), "--in-channels", "1",
            "--out-channels", "6",
        ])
        .expect("valid arguments");
        match &cli.command {
            Command::InitBackbone { seed, .. } => assert_eq!(*seed, DEFAULT_SEED),
            other => unreachable!("parsed {other:?}"),
        }
        cli.execute().expect("fresh output");

        let weights = BackboneWeights::load(&output).expect("readable weights");
        assert_eq!((weights.in_channels, weights.out_channels), (1, 6));
        assert_eq!(weights.weight.shape(), &[1, 6]);

        let again = Cli::try_parse_from([
            "hintgan", "-q", "init-backbone", "-o", path.as_str(), "--in-channels", "1",
            "--out-channels", "6",
        ])
        .expect("valid arguments");
        assert!(again.execute().is_err());
    }

    // Tests missing configuration files surface as errors
    #[test]
    fn test_missing_config_fails() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("absent.json").to_string_lossy().to_string();
        let cli = Cli::try_parse_from(["hintgan", "-q", "infer", "-c", missing.as_str()])
            .expect("valid arguments");
        assert!(cli.execute().is_err());
    }
}
