//! Synthetic input actuation.
//!
//! The game reads raw scancodes, so injection goes through `SendInput` with
//! `KEYEVENTF_SCANCODE` rather than virtual-key events. Presses are
//! fire-and-forget with a fixed hold duration.

use std::time::Duration;

/// Logical keys the agent is allowed to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
	Up,
	Down,
	Left,
	Right,
	/// Enter: confirm dialogs, retry a failed wave, leave the pause menu.
	Confirm,
	/// Escape: open the pause menu.
	Pause,
}

impl Key {
	/// Keyboard scan code (set 1) injected for this logical key.
	pub fn scan_code(self) -> u16 {
		match self {
			Key::Up => 0x11,      // w
			Key::Left => 0x1E,    // a
			Key::Down => 0x1F,    // s
			Key::Right => 0x20,   // d
			Key::Pause => 0x01,   // esc
			Key::Confirm => 0x1C, // enter
		}
	}
}

pub trait Actuator {
	/// Fire-and-forget key press with a fixed hold duration.
	fn press(&mut self, key: Key);
}

/// Scancode injection through the Win32 `SendInput` API.
#[cfg(windows)]
pub struct SendInputActuator {
	hold: Duration,
}

#[cfg(windows)]
impl SendInputActuator {
	pub fn new(hold: Duration) -> Self {
		Self { hold }
	}

	fn send(input: &mut windows::Win32::UI::Input::KeyboardAndMouse::INPUT) {
		use windows::Win32::UI::Input::KeyboardAndMouse::{INPUT, SendInput};
		unsafe {
			SendInput(std::slice::from_ref(input), std::mem::size_of::<INPUT>() as i32);
		}
	}
}

#[cfg(windows)]
impl Actuator for SendInputActuator {
	fn press(&mut self, key: Key) {
		use windows::Win32::UI::Input::KeyboardAndMouse::{
			INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, KEYEVENTF_SCANCODE, VIRTUAL_KEY,
		};

		let mut input = INPUT {
			r#type: INPUT_KEYBOARD,
			Anonymous: INPUT_0 {
				ki: KEYBDINPUT {
					wVk: VIRTUAL_KEY(0),
					wScan: key.scan_code(),
					dwFlags: KEYEVENTF_SCANCODE,
					time: 0,
					dwExtraInfo: 0,
				},
			},
		};
		Self::send(&mut input);

		std::thread::sleep(self.hold);

		unsafe {
			input.Anonymous.ki.dwFlags = KEYEVENTF_SCANCODE | KEYEVENTF_KEYUP;
		}
		Self::send(&mut input);
	}
}

/// Logging stand-in for platforms without an injection backend.
pub struct NullActuator;

impl Actuator for NullActuator {
	fn press(&mut self, key: Key) {
		tracing::debug!(?key, "no input backend, key press dropped");
	}
}

/// Platform-default actuator.
pub fn default_actuator(hold: Duration) -> Box<dyn Actuator> {
	#[cfg(windows)]
	{
		Box::new(SendInputActuator::new(hold))
	}
	#[cfg(not(windows))]
	{
		let _ = hold;
		Box::new(NullActuator)
	}
}

/// External quit signal, polled by the outer loop between steps.
pub fn quit_requested() -> bool {
	#[cfg(windows)]
	{
		use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
		// 'Q' is held down.
		let state = unsafe { GetAsyncKeyState(0x51) };
		(state as u16) & 0x8000 != 0
	}
	#[cfg(not(windows))]
	{
		false
	}
}
