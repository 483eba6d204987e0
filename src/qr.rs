use crate::error::QrError;
use image::{GrayImage, ImageBuffer, Luma};
use qrcode::{EcLevel, QrCode};

/// Width of the quiet zone, in modules.
pub const QUIET_ZONE_MODULES: u32 = 4;
/// Largest accepted module edge, in pixels.
pub const MAX_MODULE_SIZE: u32 = 100;

/// Fixed symbol parameters for regenerated codes.
#[derive(Clone, Copy, Debug)]
pub struct QrStyle {
    pub ec_level: EcLevel,
    /// Edge length of one module, in pixels.
    pub module_size: u32,
    pub quiet_zone: bool,
}

impl Default for QrStyle {
    fn default() -> Self {
        Self {
            ec_level: EcLevel::M,
            module_size: 10,
            quiet_zone: true,
        }
    }
}

pub fn generate_qr_data(text: &str, ec_level: EcLevel) -> Result<Vec<Vec<bool>>, QrError> {
    let code = QrCode::with_error_correction_level(text, ec_level)
        .map_err(|e| QrError::EncodeFailure(e.to_string()))?;

    let modules = code.to_colors();
    let width = code.width();

    let mut qr_data = vec![vec![false; width]; width];
    for y in 0..width {
        for x in 0..width {
            qr_data[y][x] = matches!(modules[y * width + x], qrcode::Color::Dark);
        }
    }

    Ok(qr_data)
}

/// Encode `text` as a black-on-white symbol.
pub fn render_qr(text: &str, style: &QrStyle) -> Result<GrayImage, QrError> {
    if !(1..=MAX_MODULE_SIZE).contains(&style.module_size) {
        return Err(QrError::InvalidSetting(format!(
            "module size must be between 1 and {MAX_MODULE_SIZE} pixels, got {}",
            style.module_size
        )));
    }

    let qr_data = generate_qr_data(text, style.ec_level)?;
    let modules = qr_data.len() as u32;
    let border = if style.quiet_zone { QUIET_ZONE_MODULES } else { 0 };
    let side = modules
        .checked_add(2 * border)
        .and_then(|span| span.checked_mul(style.module_size))
        .ok_or_else(|| {
            QrError::InvalidSetting(format!(
                "a {modules}-module symbol at {}px per module is too large",
                style.module_size
            ))
        })?;

    Ok(ImageBuffer::from_fn(side, side, |x, y| {
        let mx = (x / style.module_size).checked_sub(border);
        let my = (y / style.module_size).checked_sub(border);
        let is_black = match (mx, my) {
            (Some(mx), Some(my)) if mx < modules && my < modules => {
                qr_data[my as usize][mx as usize]
            }
            _ => false,
        };

        if is_black {
            Luma([0])
        } else {
            Luma([255])
        }
    }))
}
