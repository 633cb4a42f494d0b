use crate::error::{CaptureError, CaptureResult};

/// A crop rectangle in output-local pixel coordinates, half-open on the
/// right and bottom edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Region {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> CaptureResult<Self> {
        if left >= right || top >= bottom {
            return Err(CaptureError::InvalidRegion(format!(
                "region must satisfy left < right and top < bottom, got \
                 {{{left}, {top}, {right}, {bottom}}}"
            )));
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// The default region: the full output rectangle.
    pub fn full_output(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top) as u32
    }

    /// Whether this region covers exactly the full `width` x `height`
    /// output rectangle, in which case cropping is a no-op.
    pub fn covers_output(&self, width: u32, height: u32) -> bool {
        self.left == 0 && self.top == 0 && self.right == width as i32 && self.bottom == height as i32
    }

    /// Whether this region lies entirely inside the `width` x `height`
    /// output rectangle.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left >= 0 && self.top >= 0 && self.right <= width as i32 && self.bottom <= height as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_and_inverted_rectangles() {
        assert!(Region::new(10, 10, 5, 20).is_err());
        assert!(Region::new(0, 0, 0, 100).is_err());
        assert!(Region::new(0, 50, 100, 50).is_err());
        assert!(Region::new(7, 7, 7, 7).is_err());
    }

    #[test]
    fn accepts_proper_rectangles() {
        let region = Region::new(0, 0, 100, 100).unwrap();
        assert_eq!(region.width(), 100);
        assert_eq!(region.height(), 100);

        let offset = Region::new(-10, -20, 30, 40).unwrap();
        assert_eq!(offset.width(), 40);
        assert_eq!(offset.height(), 60);
    }

    #[test]
    fn full_output_covers_and_fits() {
        let region = Region::full_output(1920, 1080);
        assert!(region.covers_output(1920, 1080));
        assert!(region.fits_within(1920, 1080));
        assert!(!region.covers_output(1280, 720));
    }

    #[test]
    fn sub_rectangle_fits_but_does_not_cover() {
        let region = Region::new(100, 100, 740, 460).unwrap();
        assert!(region.fits_within(1920, 1080));
        assert!(!region.covers_output(1920, 1080));
        assert!(!Region::new(0, 0, 2000, 100).unwrap().fits_within(1920, 1080));
        assert!(!Region::new(-1, 0, 100, 100).unwrap().fits_within(1920, 1080));
    }
}
