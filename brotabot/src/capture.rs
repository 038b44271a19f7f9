//! Window capture.
//!
//! Frames are normalized before anything reads them: center-cropped to 16:9
//! (windowed mode adds letterboxing) and resized into the fixed 960x540
//! capture space the HUD geometry is calibrated against.

use ie::OwnedImage;
use xcap::image::EncodableLayout;

use crate::layout::{FRAME_HEIGHT, FRAME_WIDTH};

pub const ASPECT_RATIO: f32 = 16.0 / 9.0;

/// Frame producer. `None` is a legitimate answer: the target window may be
/// absent or minimized, and the caller retries on a fixed interval.
pub trait FrameSource {
	fn grab(&mut self) -> Option<OwnedImage>;
	/// Human-readable source label for retry diagnostics.
	fn name(&self) -> &str;
}

pub fn find_window(app_name: &str) -> Option<xcap::Window> {
	let windows = xcap::Window::all().ok()?;
	windows
		.into_iter()
		.find(|window| window.app_name().ok().as_deref() == Some(app_name))
}

/// Captures the game window by application name.
pub struct WindowCapture {
	app_name: String,
}

impl WindowCapture {
	pub fn new(app_name: String) -> Self {
		Self { app_name }
	}
}

impl FrameSource for WindowCapture {
	fn grab(&mut self) -> Option<OwnedImage> {
		let window = find_window(&self.app_name)?;
		if window.is_minimized().ok()? {
			return None;
		}
		let img = window.capture_image().ok()?;
		let frame = OwnedImage::from_rgba(img.width() as usize, img.as_bytes());
		Some(normalize_frame(frame))
	}

	fn name(&self) -> &str {
		&self.app_name
	}
}

/// Center-crop to 16:9 and resize into the capture space.
pub fn normalize_frame(frame: OwnedImage) -> OwnedImage {
	let w = frame.width();
	let h = frame.height();

	let target_w = (h as f32 * ASPECT_RATIO) as u32;
	let view = frame.as_image();

	let cropped = if w > target_w {
		let off = (w - target_w) / 2;
		view.sub_image(off, 0, target_w, h)
	} else if w < target_w {
		let target_h = (w as f32 / ASPECT_RATIO) as u32;
		let off = (h.saturating_sub(target_h)) / 2;
		view.sub_image(0, off, w, target_h)
	} else {
		view
	};

	cropped.to_owned_image().resized_to(FRAME_WIDTH, FRAME_HEIGHT)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn blank(width: u32, height: u32) -> OwnedImage {
		OwnedImage::from_rgba(width as usize, &vec![0u8; (width * height * 4) as usize])
	}

	#[test]
	fn normalize_fixes_the_capture_space() {
		// Too wide (ultrawide letterboxing), too tall, and exact.
		for (w, h) in [(2560, 1080), (1024, 768), (1920, 1080)] {
			let frame = normalize_frame(blank(w, h));
			assert_eq!(frame.width(), FRAME_WIDTH);
			assert_eq!(frame.height(), FRAME_HEIGHT);
		}
	}
}
