//! OCR wrapper.
//!
//! The crate relies on `ocr-rs` (Rust PaddleOCR bindings). OCR engines are
//! sensitive to input quality, so most preprocessing is done in
//! `Image::read_text(...)` before calling into this module.

use std::path::Path;

use anyhow::Context;

pub struct Ocr {
    engine: ocr_rs::OcrEngine,
}

impl Ocr {
    /// Initialize the OCR engine with the given model paths.
    pub fn try_new(
        detection: impl AsRef<Path>,
        recognition: impl AsRef<Path>,
        charsset: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        let thread_count: i32 = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(1);

        let engine = ocr_rs::OcrEngine::new(
            detection,
            recognition,
            charsset,
            Some(ocr_rs::OcrEngineConfig {
                backend: ocr_rs::Backend::CPU,
                thread_count,
                // Accuracy-focused: preprocessing is usually more important than
                // the precision mode, but High generally improves results on
                // small stylized fonts at a CPU cost.
                precision_mode: ocr_rs::PrecisionMode::High,
                enable_parallel: thread_count > 1,
                // Confidence gating is the caller's policy; report everything.
                min_result_confidence: 0.0,
                ..Default::default()
            }),
        )
        .context("failed to initialize OCR engine")?;

        Ok(Self { engine })
    }

    /// Recognize text from an RGB image view.
    ///
    /// Returns the top result's text and confidence; `("", 0.0)` when the
    /// engine produced nothing.
    pub fn get_text(&self, image: crate::Image) -> (String, f32) {
        let image = ocr_rs::preprocess::rgb_to_image(&image.get_bytes(), image.width(), image.height());

        match self.engine.recognize(&image) {
            Ok(results) => results
                .into_iter()
                .next()
                .map(|v| (v.text, v.confidence))
                .unwrap_or_default(),
            Err(_) => (String::new(), 0.0),
        }
    }
}
