use crate::models::Contour;
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};

/// Find the outermost borders of the white regions in a binary image.
/// Borders nested inside holes of other regions are skipped.
pub fn find_external_contours(binary: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points))
        .collect()
}

/// The external contour enclosing the largest area, if any
pub fn largest_external_contour(binary: &GrayImage) -> Option<Contour> {
    find_external_contours(binary)
        .into_iter()
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_picks_largest_region() {
        let mut binary = GrayImage::new(40, 40);
        for y in 2..6 {
            for x in 2..6 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 15..35 {
            for x in 10..30 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }

        assert_eq!(find_external_contours(&binary).len(), 2);
        let largest = largest_external_contour(&binary).unwrap();
        assert_eq!(largest.width(), 20);
        assert_eq!(largest.height(), 20);
        assert!((largest.area() - 361.0).abs() < 1e-9);
    }

    #[test]
    fn test_hole_interior_is_not_external() {
        // Ring with a blob inside its hole
        let mut binary = GrayImage::new(30, 30);
        for y in 0..30 {
            for x in 0..30 {
                let outer = (2..28).contains(&x) && (2..28).contains(&y);
                let inner = (6..24).contains(&x) && (6..24).contains(&y);
                let ring = outer && !inner;
                let blob = (12..16).contains(&x) && (12..16).contains(&y);
                if ring || blob {
                    binary.put_pixel(x, y, Luma([255]));
                }
            }
        }
        assert_eq!(find_external_contours(&binary).len(), 1);
    }

    #[test]
    fn test_empty_image_has_no_contours() {
        let binary = GrayImage::new(16, 16);
        assert!(largest_external_contour(&binary).is_none());
    }
}
