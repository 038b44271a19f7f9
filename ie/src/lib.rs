mod image;
pub use image::*;
mod ocr;

pub struct Ie {
	ocr: ocr::Ocr,
}

impl Ie {
	pub fn try_new(
		ocr_detection: impl AsRef<std::path::Path>,
		ocr_recognition: impl AsRef<std::path::Path>,
		ocr_charsset: impl AsRef<std::path::Path>,
	) -> anyhow::Result<Self> {
		Ok(Self {
			ocr: ocr::Ocr::try_new(ocr_detection, ocr_recognition, ocr_charsset)?,
		})
	}

	/// OCR a region with preprocessing; returns the text and its confidence.
	pub fn read_text(&self, image: Image) -> (String, f32) {
		image.read_text(&self.ocr)
	}
}
