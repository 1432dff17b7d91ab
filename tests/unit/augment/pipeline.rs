//! Tests for shared random decisions across an augmented pair

#[cfg(test)]
mod tests {
    use hintgan::augment::pipeline::PairAugmenter;
    use hintgan::io::configuration::AugmentationConfig;
    use image::{GrayImage, Luma};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const SIZE: u32 = 48;

    fn in_marker(x: u32, y: u32) -> bool {
        (8..20).contains(&x) && (28..40).contains(&y)
    }

    // Source is black with a white marker; target is grey with the same white marker
    fn marked_pair() -> (GrayImage, GrayImage) {
        let source = GrayImage::from_fn(SIZE, SIZE, |x, y| Luma([if in_marker(x, y) { 255 } else { 0 }]));
        let target = GrayImage::from_fn(SIZE, SIZE, |x, y| Luma([if in_marker(x, y) { 255 } else { 100 }]));
        (source, target)
    }

    // Tests the marker lands on the same pixels of source and target under random decisions
    // Verified by drawing a separate flip decision for the target
    #[test]
    fn test_marker_correspondence_across_pair() {
        let augmenter = PairAugmenter::new(AugmentationConfig::default(), 32).expect("valid config");
        let (source, target) = marked_pair();
        let mut flips = 0;

        for seed in 0..40 {
            let pair = augmenter
                .transform(&source, &target, &mut StdRng::seed_from_u64(seed))
                .expect("equal sizes");
            assert_eq!(pair.source.dimensions(), (32, 32));
            assert_eq!(pair.target.dimensions(), (32, 32));
            flips += usize::from(pair.decisions.flipped);

            if pair.decisions.identity {
                assert_eq!(pair.source, pair.target);
                continue;
            }
            // Interpolation is affine, so target = 100 + source * 155 / 255 up to rounding
            for (s, t) in pair.source.pixels().zip(pair.target.pixels()) {
                let expected = f64::from(s.0[0]).mul_add(155.0 / 255.0, 100.0);
                assert!(
                    (f64::from(t.0[0]) - expected).abs() <= 3.0,
                    "seed {seed}: source {} target {}",
                    s.0[0],
                    t.0[0]
                );
            }
        }
        assert!(flips > 0 && flips < 40);
    }

    // Tests a forced flip with no rotation and a full crop mirrors the marker exactly
    #[test]
    fn test_forced_flip_moves_marker() {
        let config = AugmentationConfig {
            crop_scale: (1.0, 1.0),
            identity_probability: 0.0,
            flip_probability: 1.0,
            max_rotation_degrees: 0,
        };
        let augmenter = PairAugmenter::new(config, SIZE).expect("valid config");
        let (source, target) = marked_pair();
        let pair = augmenter
            .transform(&source, &target, &mut StdRng::seed_from_u64(3))
            .expect("equal sizes");

        assert!(pair.decisions.flipped && !pair.decisions.identity);
        assert_eq!(pair.decisions.angle_degrees, 0);
        for (x, y, pixel) in pair.source.enumerate_pixels() {
            let marked = in_marker(SIZE - 1 - x, y);
            assert_eq!(pixel.0[0] == 255, marked, "pixel ({x}, {y})");
            assert_eq!(pair.target.get_pixel(x, y).0[0] == 255, marked);
        }
    }

    // Tests the identity branch replaces the source with the target
    #[test]
    fn test_identity_branch() {
        let config = AugmentationConfig {
            identity_probability: 1.0,
            ..AugmentationConfig::default()
        };
        let augmenter = PairAugmenter::new(config, 16).expect("valid config");
        let (source, target) = marked_pair();
        let pair = augmenter
            .transform(&source, &target, &mut StdRng::seed_from_u64(5))
            .expect("equal sizes");
        assert!(pair.decisions.identity);
        assert_eq!(pair.source, pair.target);
    }

    // Tests tensors are normalised single-channel images and mismatched pairs are rejected
    #[test]
    fn test_augment_outputs_and_errors() {
        let augmenter = PairAugmenter::new(AugmentationConfig::default(), 16).expect("valid config");
        let (source, target) = marked_pair();
        let (a, b) = augmenter
            .augment(&source, &target, &mut StdRng::seed_from_u64(8))
            .expect("equal sizes");
        assert_eq!(a.shape(), &[1, 16, 16]);
        assert_eq!(b.shape(), &[1, 16, 16]);
        assert!(a.iter().chain(b.iter()).all(|v| (-1.0..=1.0).contains(v)));

        let small = GrayImage::new(10, 10);
        assert!(augmenter.transform(&source, &small, &mut StdRng::seed_from_u64(0)).is_err());

        let invalid = AugmentationConfig {
            flip_probability: 1.5,
            ..AugmentationConfig::default()
        };
        assert!(PairAugmenter::new(invalid, 16).is_err());
    }
}
