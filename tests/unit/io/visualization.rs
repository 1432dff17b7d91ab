//! Tests for sample strip rendering

#[cfg(test)]
mod tests {
    use hintgan::io::image::load_image;
    use hintgan::io::visualization::{Panel, PngStripSink, SampleSink, save_raw};
    use ndarray::{ArrayD, IxDyn};
    use tempfile::TempDir;

    // Tests panels are laid out left to right with spacing and scaled to a common height
    // Verified by dropping the spacing from the strip width
    #[test]
    fn test_strip_layout() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("strip.png");
        let image = ArrayD::from_elem(IxDyn(&[3, 8, 8]), -1.0);
        let mask = ArrayD::from_elem(IxDyn(&[1, 2, 2]), 1.0);
        let panels = vec![Panel::image(image, "generated", false), Panel::mask(mask, "mask")];

        PngStripSink::new(3).render(&panels, &path).expect("writable");
        let strip = load_image(&path).expect("readable").to_rgb8();
        assert_eq!(strip.dimensions(), (8 + 3 + 8, 8));
        assert_eq!(strip.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(strip.get_pixel(9, 4).0, [255, 255, 255]);
        assert_eq!(strip.get_pixel(18, 7).0, [255, 255, 255]);
    }

    // Tests grayscale panels render only the first channel
    #[test]
    fn test_grayscale_panel_uses_first_channel() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("gray.png");
        let mut tensor = ArrayD::from_elem(IxDyn(&[3, 2, 2]), 1.0);
        tensor.index_axis_mut(ndarray::Axis(0), 0).fill(-1.0);

        PngStripSink::default()
            .render(&[Panel::image(tensor, "sketch", true)], &path)
            .expect("writable");
        let strip = load_image(&path).expect("readable").to_rgb8();
        assert!(strip.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    // Tests an empty strip is refused
    #[test]
    fn test_empty_strip_rejected() {
        let dir = TempDir::new().expect("temp dir");
        assert!(PngStripSink::default().render(&[], &dir.path().join("x.png")).is_err());
    }

    // Tests raw output keeps the tensor resolution and channel count
    #[test]
    fn test_save_raw() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("raw.png");
        save_raw(&ArrayD::from_elem(IxDyn(&[1, 5, 3]), 1.0), &path).expect("writable");
        let image = load_image(&path).expect("readable");
        assert_eq!((image.width(), image.height()), (3, 5));
        assert!(image.to_luma8().pixels().all(|p| p.0[0] == 255));

        assert!(save_raw(&ArrayD::zeros(IxDyn(&[2, 5, 3])), &path).is_err());
    }
}
