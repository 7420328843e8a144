//! Frame type and pixel handling: grayscale conversion, dark-frame detection and still encoding.

use image::{GrayImage, ImageFormat};
use posecap_core::EncodedImage;
use std::io::Cursor;

/// Pixels darker than this count towards the dark-frame fraction.
const DARK_PIXEL_LEVEL: u8 = 32;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Average pixel brightness (0 to 255).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// Encode as PNG for hand-off to the perception service and capture store.
    pub fn encode_png(&self) -> Result<EncodedImage, FrameError> {
        let gray = GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: (self.width * self.height) as usize,
                actual: self.data.len(),
            },
        )?;
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png)?;
        Ok(EncodedImage::png(buf.into_inner()))
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale to 8 bits (keep the high byte).
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: y16.len(),
        });
    }
    Ok(y16[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

/// True if more than `threshold_pct` of pixels are near black.
///
/// Covers a lens cap, a covered camera, or the first frames before
/// auto-exposure settles. Empty input counts as dark.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < DARK_PIXEL_LEVEL).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
            is_dark: false,
        }
    }

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_grayscale(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // Two pixels: 0x12ff and 0x8001 little-endian.
        let y16 = vec![0xff, 0x12, 0x01, 0x80];
        assert_eq!(y16_to_grayscale(&y16, 2, 1).unwrap(), vec![0x12, 0x80]);
        assert!(y16_to_grayscale(&y16[..3], 2, 1).is_err());
    }

    #[test]
    fn test_dark_frame_detection() {
        assert!(is_dark_frame(&[0u8; 1000], 0.95));
        assert!(!is_dark_frame(&[128u8; 1000], 0.95));
        assert!(is_dark_frame(&[], 0.95));

        // 96% dark, 4% bright → dark
        let mut gray = vec![10u8; 960];
        gray.extend(vec![128u8; 40]);
        assert!(is_dark_frame(&gray, 0.95));

        // 94% dark, 6% bright → not dark
        let mut gray = vec![10u8; 940];
        gray.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&gray, 0.95));
    }

    #[test]
    fn test_avg_brightness() {
        assert_eq!(frame(vec![0, 100, 200], 3, 1).avg_brightness(), 100.0);
        assert_eq!(frame(vec![], 0, 0).avg_brightness(), 0.0);
    }

    #[test]
    fn test_encode_png_produces_decodable_still() {
        let data: Vec<u8> = (0..64).map(|i| (i * 4) as u8).collect();
        let encoded = frame(data.clone(), 8, 8).encode_png().unwrap();
        assert_eq!(encoded.mime, "image/png");
        assert_eq!(&encoded.data[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&encoded.data).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.into_raw(), data);
    }

    #[test]
    fn test_encode_png_rejects_short_buffer() {
        let err = frame(vec![0; 10], 8, 8).encode_png().unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { expected: 64, actual: 10 }));
    }
}
