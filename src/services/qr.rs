use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::{FestError, Result};
use crate::models::Participant;

/// Square grid of QR modules, `true` meaning a dark module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    width: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.modules[y * self.width + x]
    }

    /// Dark modules as (x, y) pairs, row by row.
    pub fn dark_modules(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, dark)| **dark)
            .map(|(index, _)| (index % self.width, index / self.width))
    }
}

pub fn qr_payload(participant: &Participant) -> String {
    participant.chest_number.to_string()
}

pub fn encode_matrix(payload: &str) -> Result<QrMatrix> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H).map_err(|err| {
        FestError::Qr {
            payload: payload.to_string(),
            message: err.to_string(),
        }
    })?;

    Ok(QrMatrix {
        width: code.width(),
        modules: code
            .to_colors()
            .into_iter()
            .map(|color| color == Color::Dark)
            .collect(),
    })
}

/// Largest PNG edge, in pixels, that `render_png` will allocate.
pub const MAX_PNG_SIDE: u32 = 8192;

pub fn render_png(matrix: &QrMatrix, module_px: u32, quiet_zone: u32) -> Result<Vec<u8>> {
    let module_px = module_px.max(1);
    let side = u32::try_from(matrix.width())
        .ok()
        .and_then(|width| quiet_zone.checked_mul(2)?.checked_add(width))
        .and_then(|modules| modules.checked_mul(module_px))
        .filter(|side| *side <= MAX_PNG_SIDE)
        .ok_or_else(|| {
            FestError::Config(format!(
                "QR image of {} modules at {module_px}px with quiet zone {quiet_zone} exceeds {MAX_PNG_SIDE}px",
                matrix.width()
            ))
        })?;
    let mut canvas = GrayImage::from_pixel(side, side, Luma([255u8]));

    for (x, y) in matrix.dark_modules() {
        let left = (x as u32 + quiet_zone) * module_px;
        let top = (y as u32 + quiet_zone) * module_px;
        for dy in 0..module_px {
            for dx in 0..module_px {
                canvas.put_pixel(left + dx, top + dy, Luma([0u8]));
            }
        }
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(canvas).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(chest_number: u32) -> Participant {
        Participant {
            id: "s1".to_string(),
            name: "Amal".to_string(),
            team_id: "t1".to_string(),
            category_id: "junior".to_string(),
            chest_number,
        }
    }

    #[test]
    fn payload_is_the_chest_number_literal() {
        assert_eq!(qr_payload(&participant(42)), "42");
        assert_eq!(qr_payload(&participant(1007)), "1007");
    }

    #[test]
    fn matrix_has_finder_pattern_corners() {
        let matrix = encode_matrix("42").expect("short payload should encode");
        // Version 1 is 21x21 modules.
        assert_eq!(matrix.width(), 21);
        assert!(matrix.is_dark(0, 0));
        assert!(matrix.is_dark(20, 0));
        assert!(matrix.is_dark(0, 20));
        assert!(!matrix.is_dark(7, 7));
    }

    #[test]
    fn oversized_payload_is_an_error() {
        let payload = "9".repeat(8000);
        assert!(matches!(encode_matrix(&payload), Err(FestError::Qr { .. })));
    }

    #[test]
    fn png_has_expected_dimensions() {
        let matrix = encode_matrix("42").expect("encode");
        let png = render_png(&matrix, 4, 2).expect("png");
        let decoded = image::load_from_memory(&png).expect("png should decode");
        assert_eq!(decoded.width(), (21 + 4) * 4);
        assert_eq!(decoded.height(), (21 + 4) * 4);
    }

    #[test]
    fn oversized_png_is_refused_before_allocating() {
        let matrix = encode_matrix("42").expect("encode");
        assert!(matches!(render_png(&matrix, u32::MAX, 4), Err(FestError::Config(_))));
        assert!(matches!(render_png(&matrix, 10, u32::MAX), Err(FestError::Config(_))));
    }
}
