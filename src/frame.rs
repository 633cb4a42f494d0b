use crate::error::{CaptureError, CaptureResult};
use crate::region::Region;

pub const BYTES_PER_PIXEL: usize = 4;

/// One captured frame: an immutable BGRA8 pixel buffer tagged with its
/// dimensions and row stride. Frames built by this crate are tightly
/// packed (`stride == width * 4`); the stride is carried explicitly so
/// readers never have to assume it.
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    /// Monotonic publication number, stamped by the cache on push.
    /// Zero until the frame has been published.
    pub(crate) sequence: u64,
}

impl Frame {
    /// Build a frame from a tightly packed BGRA8 buffer.
    pub fn from_bgra8(width: u32, height: u32, data: Vec<u8>) -> CaptureResult<Self> {
        let stride = bgra_stride(width)?;
        let expected = stride
            .checked_mul(height as usize)
            .ok_or_else(|| size_overflow(width, height))?;
        if data.len() != expected {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "BGRA frame data length mismatch: got {}, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
            sequence: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Publication sequence number assigned by the frame cache, starting
    /// at 1 for the first published frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn as_bgra_bytes(&self) -> &[u8] {
        &self.data
    }

    /// One row of pixels, `width * 4` bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }

    /// Copy the pixels inside `region` into a new, independently owned
    /// frame. The region must lie within this frame's bounds. Cropping to
    /// the full frame rectangle yields a pixel-identical copy.
    pub fn crop(&self, region: &Region) -> CaptureResult<Frame> {
        if !region.fits_within(self.width, self.height) {
            return Err(CaptureError::InvalidRegion(format!(
                "region {{{}, {}, {}, {}}} exceeds frame bounds {}x{}",
                region.left, region.top, region.right, region.bottom, self.width, self.height
            )));
        }

        let out_width = region.width();
        let out_height = region.height();
        let out_stride = bgra_stride(out_width)?;
        let mut data = Vec::with_capacity(out_stride * out_height as usize);

        let x_offset = region.left as usize * BYTES_PER_PIXEL;
        for y in region.top..region.bottom {
            let src = self.row(y as u32);
            data.extend_from_slice(&src[x_offset..x_offset + out_stride]);
        }

        Frame::from_bgra8(out_width, out_height, data)
    }
}

fn bgra_stride(width: u32) -> CaptureResult<usize> {
    (width as usize)
        .checked_mul(BYTES_PER_PIXEL)
        .ok_or_else(|| size_overflow(width, 1))
}

fn size_overflow(width: u32, height: u32) -> CaptureError {
    CaptureError::Platform(anyhow::anyhow!(
        "frame buffer size overflow for {width}x{height}"
    ))
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("sequence", &self.sequence)
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A w x h frame whose pixel (x, y) encodes its own coordinates,
    /// so crops can be checked pixel-exactly.
    fn coordinate_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height) as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, (x ^ y) as u8, 0xff]);
            }
        }
        Frame::from_bgra8(width, height, data).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer_length() {
        assert!(Frame::from_bgra8(4, 4, vec![0u8; 63]).is_err());
        assert!(Frame::from_bgra8(4, 4, vec![0u8; 64]).is_ok());
    }

    #[test]
    fn crop_to_full_rectangle_is_identity() {
        let frame = coordinate_frame(16, 9);
        let full = Region::full_output(16, 9);
        let cropped = frame.crop(&full).unwrap();
        assert_eq!(cropped.dimensions(), (16, 9));
        assert_eq!(cropped.as_bgra_bytes(), frame.as_bgra_bytes());
    }

    #[test]
    fn crop_to_sub_rectangle_has_region_dimensions_and_pixels() {
        let frame = coordinate_frame(32, 24);
        let region = Region::new(5, 3, 13, 10).unwrap();
        let cropped = frame.crop(&region).unwrap();
        assert_eq!(cropped.width(), region.width());
        assert_eq!(cropped.height(), region.height());
        assert_eq!(cropped.stride(), region.width() as usize * BYTES_PER_PIXEL);

        // Spot-check the corners against the source coordinates.
        assert_eq!(&cropped.row(0)[..4], &[5, 3, 5 ^ 3, 0xff]);
        let last_row = cropped.row(cropped.height() - 1);
        let last_px = &last_row[last_row.len() - 4..];
        assert_eq!(last_px, &[12, 9, 12 ^ 9, 0xff]);
    }

    #[test]
    fn crop_outside_bounds_is_rejected() {
        let frame = coordinate_frame(8, 8);
        let too_wide = Region::new(0, 0, 9, 8).unwrap();
        assert!(frame.crop(&too_wide).is_err());
        let negative = Region::new(-1, 0, 4, 4).unwrap();
        assert!(frame.crop(&negative).is_err());
    }
}
