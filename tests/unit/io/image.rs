//! Tests for tensor and image conversions

#[cfg(test)]
mod tests {
    use hintgan::TrainingError;
    use hintgan::io::image::{
        denormalize_intensity, gray_to_tensor, load_image, normalize_intensity, resize_square,
        rgb_to_tensor, save_image, split_side_by_side, tensor_to_gray, tensor_to_image,
        tensor_to_rgb,
    };
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
    use ndarray::{ArrayD, IxDyn};
    use tempfile::TempDir;

    // Tests the intensity mapping endpoints and clamping
    #[test]
    fn test_intensity_mapping() {
        assert!((normalize_intensity(0) + 1.0).abs() < f32::EPSILON);
        assert!((normalize_intensity(255) - 1.0).abs() < f32::EPSILON);
        for value in [0, 1, 127, 128, 254, 255] {
            assert_eq!(denormalize_intensity(normalize_intensity(value)), value);
        }
        assert_eq!(denormalize_intensity(3.0), 255);
        assert_eq!(denormalize_intensity(-3.0), 0);
    }

    // Tests tensors use channel-first layout with row-major pixels
    // Verified by swapping x and y in the conversion
    #[test]
    fn test_tensor_layout() {
        let image = RgbImage::from_fn(3, 2, |x, y| Rgb([(x * 100) as u8, (y * 255) as u8, 0]));
        let tensor = rgb_to_tensor(&image);
        assert_eq!(tensor.shape(), &[3, 2, 3]);
        assert!((tensor[[0, 0, 2]] - normalize_intensity(200)).abs() < f32::EPSILON);
        assert!((tensor[[1, 1, 0]] - 1.0).abs() < f32::EPSILON);
        assert!((tensor[[2, 1, 2]] + 1.0).abs() < f32::EPSILON);
        assert_eq!(tensor_to_rgb(&tensor, true).expect("three channels"), image);

        let gray = GrayImage::from_fn(4, 3, |x, y| Luma([(x + 10 * y) as u8]));
        let tensor = gray_to_tensor(&gray);
        assert_eq!(tensor.shape(), &[1, 3, 4]);
        assert_eq!(tensor_to_gray(&tensor, true).expect("one channel"), gray);
    }

    // Tests masks render from [0, 1] and grey tensors replicate to RGB
    #[test]
    fn test_mask_and_grey_rendering() {
        let mut mask = ArrayD::zeros(IxDyn(&[1, 1, 2]));
        mask[[0, 0, 1]] = 1.0;
        let rendered = tensor_to_gray(&mask, false).expect("one channel");
        assert_eq!(rendered.as_raw(), &vec![0, 255]);

        let rgb = tensor_to_rgb(&mask, false).expect("one channel");
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 255, 255]));

        let two = ArrayD::zeros(IxDyn(&[2, 1, 1]));
        assert!(tensor_to_rgb(&two, true).is_err());
        assert!(tensor_to_image(&two, true).is_err());
        assert!(tensor_to_gray(&ArrayD::zeros(IxDyn(&[4, 4])), true).is_err());
        assert!(matches!(
            tensor_to_image(&mask, false).expect("one channel"),
            DynamicImage::ImageLuma8(_)
        ));
    }

    // Tests side-by-side splitting and odd widths
    #[test]
    fn test_split_side_by_side() {
        let image = GrayImage::from_fn(6, 2, |x, _| Luma([x as u8]));
        let (left, right) = split_side_by_side(&image).expect("even width");
        assert_eq!(left.as_raw(), &vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(right.as_raw(), &vec![3, 4, 5, 3, 4, 5]);

        assert!(matches!(
            split_side_by_side(&GrayImage::new(5, 2)),
            Err(TrainingError::InvalidDataset { .. })
        ));
        assert!(split_side_by_side(&GrayImage::new(0, 2)).is_err());
    }

    // Tests resizing and the save/load path
    #[test]
    fn test_resize_save_and_load() {
        let image = GrayImage::from_pixel(10, 7, Luma([90]));
        let resized = resize_square(&image, 4);
        assert_eq!(resized.dimensions(), (4, 4));
        assert!(resized.pixels().all(|p| p.0[0] == 90));

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("deep").join("out.png");
        save_image(&DynamicImage::ImageLuma8(resized.clone()), &path).expect("writable");
        assert_eq!(load_image(&path).expect("readable").to_luma8(), resized);

        assert!(matches!(
            load_image(&dir.path().join("missing.png")),
            Err(TrainingError::ImageLoad { .. })
        ));
    }
}
