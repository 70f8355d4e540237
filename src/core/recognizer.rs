use anyhow::{Context, Result};
use leptess::{LepTess, Variable};
use log::warn;
use opencv::{core, imgcodecs, imgproc, prelude::*};

use crate::core::region::{Preprocessing, Region};
use crate::core::video_source::Frame;

/// Characters that can appear in the date/time/geocoordinate overlays.
pub const DEFAULT_WHITELIST: &str = "NW0123456789/.: ";

/// Page segmentation mode 6: a single uniform block of text. The overlay is
/// one or two short lines, which mode 6 handles better than full-page layout
/// analysis.
pub const DEFAULT_PSM: u32 = 6;

pub const DEFAULT_THRESHOLD: f64 = 127.0;
pub const DEFAULT_THRESHOLD_MAX: f64 = 255.0;

/// Tesseract wrapper tuned for overlay text.
///
/// Holds one `LepTess` instance; Tesseract state is not thread-safe, so each
/// worker builds its own recognizer.
pub struct TextRecognizer {
    engine: LepTess,
    threshold: f64,
    threshold_max: f64,
}

impl TextRecognizer {
    pub fn new(whitelist: &str, psm: u32, threshold: f64, threshold_max: f64) -> Result<Self> {
        let mut engine = LepTess::new(None, "eng").context("failed to initialize tesseract")?;
        engine
            .set_variable(Variable::TesseditCharWhitelist, whitelist)
            .context("failed to set tesseract character whitelist")?;
        engine
            .set_variable(Variable::TesseditPagesegMode, &psm.to_string())
            .context("failed to set tesseract page segmentation mode")?;
        Ok(Self {
            engine,
            threshold,
            threshold_max,
        })
    }

    /// Runs OCR over `region` of `frame` and returns the recognized lines.
    ///
    /// An empty region, a recognizer hiccup, or simply no text all yield an
    /// empty list; "nothing readable" is a normal outcome here.
    pub fn recognize(&mut self, frame: &Frame, region: &Region) -> Result<Vec<String>> {
        let clamped = region.clamp_to(frame.width, frame.height);
        if clamped.width <= 0 || clamped.height <= 0 {
            return Ok(vec![]);
        }

        let rect = core::Rect::new(clamped.x, clamped.y, clamped.width, clamped.height);
        let crop = Mat::roi(&frame.mat, rect)?;

        let prepared = match clamped.preprocessing {
            Preprocessing::GrayscaleThreshold => {
                let mut grey = Mat::default();
                imgproc::cvt_color(
                    &crop,
                    &mut grey,
                    imgproc::COLOR_BGR2GRAY,
                    0,
                )?;
                let mut binary = Mat::default();
                // Fixed threshold; the overlay is rendered white-on-scene so
                // a hard cut at mid-grey isolates it well enough.
                imgproc::threshold(
                    &grey,
                    &mut binary,
                    self.threshold,
                    self.threshold_max,
                    imgproc::THRESH_BINARY,
                )?;
                binary
            }
            Preprocessing::None => crop.try_clone()?,
        };

        // Tesseract takes an encoded image; PNG keeps the binarized crop
        // lossless.
        let mut encoded = core::Vector::<u8>::new();
        imgcodecs::imencode(".png", &prepared, &mut encoded, &core::Vector::new())?;

        if let Err(e) = self.engine.set_image_from_mem(encoded.as_slice()) {
            warn!("tesseract rejected frame {} crop: {}", frame.index, e);
            return Ok(vec![]);
        }
        let text = match self.engine.get_utf8_text() {
            Ok(text) => text,
            Err(e) => {
                warn!("tesseract failed on frame {}: {}", frame.index, e);
                return Ok(vec![]);
            }
        };

        Ok(split_lines(&text))
    }
}

/// Splits recognizer output into trimmed, non-empty lines. The second line,
/// when present, is usually the geocoordinate overlay; fewer lines than that
/// is normal.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_line_order_and_drops_blanks() {
        let lines = split_lines("10/26/2024 16:18:42.482\nN 47.6062 W 122.3321\n\n");
        assert_eq!(
            lines,
            vec!["10/26/2024 16:18:42.482", "N 47.6062 W 122.3321"]
        );
    }

    #[test]
    fn split_tolerates_missing_geocoordinate_line() {
        assert_eq!(split_lines("15.10.1993\n"), vec!["15.10.1993"]);
    }

    #[test]
    fn split_of_empty_output_is_empty() {
        assert!(split_lines("").is_empty());
        assert!(split_lines("  \n \n").is_empty());
    }
}
