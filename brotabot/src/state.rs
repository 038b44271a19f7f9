//! Episode-scoped game state.

use crate::hud::WAVE_TIMER_DEFAULT;

/// The corrected HUD state carried across steps.
///
/// Owned exclusively by the episode state machine; the HUD estimators are the
/// only writers (one field each), and the whole record is rebuilt at episode
/// reset. Invariants held for the lifetime of an episode: `hp <= total_hp`,
/// `material` never decreases, `countdown` never increases outside reset and
/// the final-wave boss stall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub hp: u32,
    pub total_hp: u32,
    pub material: u32,
    pub countdown: u32,

    /// Wave number read once at reset.
    pub wave: u32,
    /// Starting countdown for this wave (the calibration baseline).
    pub wave_timer: u32,

    /// Material balance at reset; total gain is reported relative to it.
    pub init_material: u32,
    /// Last banner text long enough to mean something.
    pub end_text: String,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            hp: 0,
            total_hp: 0,
            material: 0,
            countdown: WAVE_TIMER_DEFAULT,
            wave: 1,
            wave_timer: WAVE_TIMER_DEFAULT,
            init_material: 0,
            end_text: String::new(),
        }
    }
}
