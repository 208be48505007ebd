//! Client-side copy of the remote screen.

use image::{Rgb, RgbImage, imageops};

use super::RfbError;
use super::protocol::{PixelFormat, Rect};

/// The last known contents of the remote framebuffer.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    image: RgbImage,
}

impl Framebuffer {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            image: RgbImage::new(u32::from(width), u32::from(height)),
        }
    }

    pub fn width(&self) -> u16 {
        self.image.width() as u16
    }

    pub fn height(&self) -> u16 {
        self.image.height() as u16
    }

    /// Paint raw pixel data covering `rect`, row-major.
    ///
    /// Pixels falling outside the framebuffer are dropped.
    pub fn paint_raw(&mut self, rect: Rect, data: &[u8], format: &PixelFormat) {
        let bpp = format.bytes_per_pixel();
        if rect.width == 0 || bpp == 0 {
            return;
        }

        let row_len = usize::from(rect.width);
        for (i, pixel) in data.chunks_exact(bpp).enumerate() {
            let x = u32::from(rect.x) + (i % row_len) as u32;
            let y = u32::from(rect.y) + (i / row_len) as u32;
            if x < self.image.width() && y < self.image.height() {
                self.image.put_pixel(x, y, Rgb(format.decode(pixel)));
            }
        }
    }

    /// Copy out a region.
    pub fn crop(&self, rect: Rect) -> Result<RgbImage, RfbError> {
        if !rect.fits_within(self.width(), self.height()) {
            return Err(RfbError::OutOfBounds {
                rect,
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(imageops::crop_imm(
            &self.image,
            u32::from(rect.x),
            u32::from(rect.y),
            u32::from(rect.width),
            u32::from(rect.height),
        )
        .to_image())
    }

    /// Copy of the whole screen.
    pub fn snapshot(&self) -> RgbImage {
        self.image.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgrx(r: u8, g: u8, b: u8) -> [u8; 4] {
        [b, g, r, 0]
    }

    #[test]
    fn test_paint_and_crop() {
        let mut fb = Framebuffer::new(4, 3);
        let mut data = Vec::new();
        for y in 0..2u8 {
            for x in 0..2u8 {
                data.extend_from_slice(&bgrx(x * 10, y * 10, 7));
            }
        }
        fb.paint_raw(Rect::new(1, 1, 2, 2), &data, &PixelFormat::RGB888);

        let crop = fb.crop(Rect::new(1, 1, 2, 2)).unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([0, 0, 7]));
        assert_eq!(crop.get_pixel(1, 1), &Rgb([10, 10, 7]));

        // Untouched pixels stay black.
        assert_eq!(fb.snapshot().get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_paint_clips_to_screen() {
        let mut fb = Framebuffer::new(2, 2);
        let data: Vec<u8> = (0..9).flat_map(|_| bgrx(255, 255, 255)).collect();
        fb.paint_raw(Rect::new(1, 1, 3, 3), &data, &PixelFormat::RGB888);
        assert_eq!(fb.snapshot().get_pixel(1, 1), &Rgb([255, 255, 255]));
        assert_eq!(fb.snapshot().get_pixel(0, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let fb = Framebuffer::new(100, 50);
        assert!(matches!(
            fb.crop(Rect::new(60, 30, 80, 25)),
            Err(RfbError::OutOfBounds { .. })
        ));
    }
}
