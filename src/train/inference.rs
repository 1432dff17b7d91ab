//! Standalone generation from a trained checkpoint

use crate::data::loader::DataLoader;
use crate::io::checkpoint::Checkpoint;
use crate::gan::mask::hint_colors;
use crate::io::configuration::{
    HINT_SUFFIX, INPUT_SUFFIX, InferenceConfig, OUTPUT_SUFFIX, TARGET_SUFFIX,
};
use crate::io::error::{Result, TrainingError};
use crate::io::visualization::{Panel, PngStripSink, SampleSink, save_raw};
use crate::train::orchestrator::{build_reference_engine, open_split};
use ndarray::Axis;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

/// Generate an image for every sample in the input directory
///
/// Each result is written as `<name>_result.png` in the output directory,
/// next to the input sketch, the target and, when hints are used, the hint
/// colours. A strip of input, hint, mask, target and result goes under
/// `strips/`. Returns the number of images written.
///
/// # Errors
///
/// Returns an error if the checkpoint or inputs cannot be read, or an
/// output cannot be written
pub fn run_inference(config: &InferenceConfig) -> Result<usize> {
    config.validate()?;
    let checkpoint = Checkpoint::load(&config.checkpoint)?;
    let training = checkpoint.config.clone();

    let mut engine = build_reference_engine(&training)?;
    engine
        .restore(
            &checkpoint.net_g,
            &checkpoint.net_d,
            checkpoint.opt_g,
            checkpoint.opt_d,
        )
        .map_err(|e| TrainingError::Checkpoint {
            path: config.checkpoint.clone(),
            reason: e.to_string(),
        })?;

    let loader = DataLoader::new(
        open_split(&training, &config.input_dir, false)?,
        training.common.batch_size,
        false,
    )?;
    let policy = config.mask_policy();
    let mut data_rng = StdRng::seed_from_u64(config.seed);
    let mut mask_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let mut sink = PngStripSink::default();
    let strips = config.output_dir.join("strips");
    let grayscale = training.task.target_channels() == 1;

    let mut written = 0;
    for batch in loader.epoch(&mut data_rng) {
        let batch = batch?;
        let hint = engine.hint_for(&batch.reference, policy, config.hint_multiplier, &mut mask_rng)?;
        let fake = engine.generate(&batch.sketch, hint.as_ref().map(|(_, hint)| hint))?;
        let shown = match &hint {
            Some((mask, hint)) => Some((mask, hint_colors(hint)?)),
            None => None,
        };

        for (index, name) in batch.names.iter().enumerate() {
            let sketch = batch.sketch.index_axis(Axis(0), index).to_owned();
            let target = batch.content.index_axis(Axis(0), index).to_owned();
            let result = fake.index_axis(Axis(0), index).to_owned();
            let output = |suffix: &str| config.output_dir.join(format!("{name}{suffix}.png"));

            save_raw(&sketch, &output(INPUT_SUFFIX))?;
            save_raw(&target, &output(TARGET_SUFFIX))?;
            save_raw(&result, &output(OUTPUT_SUFFIX))?;

            let mut panels = vec![Panel::image(sketch, "input", true)];
            if let Some((mask, colors)) = &shown {
                let colors = colors.index_axis(Axis(0), index).to_owned();
                save_raw(&colors, &output(HINT_SUFFIX))?;
                panels.push(Panel::image(colors, "hint", grayscale));
                panels.push(Panel::mask(mask.index_axis(Axis(0), index).to_owned(), "mask"));
            }
            panels.push(Panel::image(target, "target", grayscale));
            panels.push(Panel::image(result, "output", grayscale));
            sink.render(&panels, &strips.join(format!("{name}.png")))?;
            written += 1;
        }
    }

    info!(written, output = %config.output_dir.display(), "inference finished");
    Ok(written)
}
