//! Region text reader.
//!
//! Thin policy layer over the OCR engine: crop a HUD box out of a frame,
//! recognize it, and blank the text when the engine is not confident enough.
//! Callers must treat empty text as "no new information", never as zero.

use ie::{Ie, OwnedImage};

use crate::layout::Rect;
use crate::scene::CONF_THRESHOLD;

pub trait TextReader {
    /// Read a capture-space region. The confidence is reported even when the
    /// text has been blanked by the threshold.
    fn read(&self, frame: &OwnedImage, rect: Rect) -> (String, f32);
}

/// OCR-backed reader used by the binary.
pub struct IeReader {
    ie: Ie,
}

impl IeReader {
    pub fn new(ie: Ie) -> Self {
        Self { ie }
    }
}

impl TextReader for IeReader {
    fn read(&self, frame: &OwnedImage, rect: Rect) -> (String, f32) {
        let roi = frame.as_image().sub_image(rect.x, rect.y, rect.w, rect.h);
        let (text, conf) = self.ie.read_text(roi);
        if conf < CONF_THRESHOLD {
            return (String::new(), conf);
        }
        (text, conf)
    }
}
