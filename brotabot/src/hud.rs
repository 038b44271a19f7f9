//! HUD field estimators.
//!
//! The OCR stream is noisy and intermittently wrong: digits get dropped,
//! concatenated, or swapped for lookalikes. Each estimator here reconciles a
//! fresh raw reading with the previous corrected value under the game's
//! invariants (hp never exceeds max hp, material never decreases mid-wave,
//! the countdown never increases). The shared policy: never trust a single
//! outlier reading; prefer the previous value whenever a reading violates a
//! plausibility bound.
//!
//! All numeric bounds in this module are calibrated against observed OCR
//! failure modes. Do not change them without new calibration data.

use std::sync::LazyLock;

use ie::OwnedImage;
use regex::Regex;

use crate::layout::{HP_BOXES, TIMER_BOXES, WAVE_BOX};
use crate::reader::TextReader;

/// Starting countdown assumed when the timer cannot be read at reset.
pub const WAVE_TIMER_DEFAULT: u32 = 20;
/// Max-HP stand-in for degenerate reward terms.
pub const TOTAL_HP_DEFAULT: u32 = 10;
/// The final wave; the boss-death sequence bends the timer rules there.
pub const LAST_WAVE: u32 = 20;

/// Max plausible max-HP change between consecutive observations.
pub const TOTAL_HP_CHANGE_RANGE: u32 = 3;
/// Max countdown drop accepted without wall-clock corroboration.
pub const TIMER_CHANGE_RANGE: u32 = 3;
/// A reading this many times the previous nonzero material is a
/// digit-concatenation misread.
pub const MATERIAL_MISREAD_FACTOR: u32 = 10;
/// Below this OCR confidence, lookalike digits (5 for 2/3, 6 for 0) are
/// suspect.
pub const SUSPECT_CONF: f32 = 0.6;

static HP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*/\s*(\d+)").expect("hp regex"));

/// Leading digit run after stripping any leading non-digit junk. OCR likes to
/// hallucinate symbols in front of HUD numbers.
static LEADING_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\D*(\d+)").expect("number regex"));

/// Corrected-reading combinator: accept `candidate` only when present and
/// plausible against the previous value, otherwise keep `prev`.
pub fn corrected<T: Copy>(prev: T, candidate: Option<T>, plausible: impl FnOnce(T, T) -> bool) -> T {
    match candidate {
        Some(value) if plausible(prev, value) => value,
        _ => prev,
    }
}

// ---------- HP / max HP ----------

pub fn parse_hp(text: &str) -> Option<(u32, u32)> {
    let caps = HP_RE.captures(text)?;
    let hp = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some((hp, total))
}

/// Reconcile a freshly parsed `hp/max` pair with the previous corrected pair.
///
/// Max HP only moves within [`TOTAL_HP_CHANGE_RANGE`] of its previous value
/// (a real max-HP increase event is rare enough that ignoring it beats
/// accepting misreads), and hp may never exceed max.
pub fn correct_hp(parsed: Option<(u32, u32)>, prev_hp: u32, prev_total: u32) -> (u32, u32) {
    let total = corrected(prev_total, parsed.map(|p| p.1), |prev, new| {
        if new + TOTAL_HP_CHANGE_RANGE < prev {
            tracing::warn!(total_hp = new, prev_total_hp = prev, "implausible max-hp drop, keeping previous");
            return false;
        }
        if new > prev + TOTAL_HP_CHANGE_RANGE && prev > 0 {
            tracing::warn!(total_hp = new, prev_total_hp = prev, "implausible max-hp rise, keeping previous");
            return false;
        }
        true
    });

    // When max HP was rejected the hp digits are suspect too. The final
    // clamp covers the corner where a legitimate small max drop undercuts
    // the carried-over hp.
    let hp = match parsed {
        Some((hp, t)) if t == total && hp <= total => hp,
        _ => prev_hp,
    };

    (hp.min(total), total)
}

/// Read and correct the `hp/max` readout.
///
/// Two candidate boxes exist because the digit layout shifts between 2- and
/// 3-digit max HP; the previous corrected max picks the box.
pub fn read_hp(
    reader: &dyn TextReader,
    frame: &OwnedImage,
    prev_hp: u32,
    prev_total: u32,
    reset: bool,
) -> (u32, u32) {
    let narrow = !reset && prev_total > 0 && prev_total < 100;
    let (text, _conf) = reader.read(frame, HP_BOXES[usize::from(narrow)]);
    correct_hp(parse_hp(&text), prev_hp, prev_total)
}

// ---------- Material ----------

/// Box keyed by the expected digit count, from the previous magnitude. Reset
/// reads use the widest box since there is no trusted prior.
pub fn material_box_index(prev_material: u32, reset: bool) -> usize {
    if reset {
        3
    } else if prev_material >= 1000 {
        3
    } else if prev_material >= 100 {
        2
    } else if prev_material >= 10 {
        1
    } else {
        0
    }
}

/// Digit-level guards applied to one material read. Returns the previous
/// value when nothing trustworthy was parsed.
///
/// A parsed value with a leading '0' forces 0: the reset frame reads the
/// fresh counter as e.g. "02".
fn match_material(text: &str, conf: f32, prev: u32) -> u32 {
    let Some(caps) = LEADING_NUM_RE.captures(text) else {
        return prev;
    };
    let digits = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    if digits.starts_with('0') {
        return 0;
    }
    let Ok(next) = digits.parse::<u32>() else {
        return prev;
    };

    // Lookalike guards at low confidence: a trailing 5 in the same decade is
    // usually a misread 2/3, and a lone 6 at zero is a misread 0.
    if conf < SUSPECT_CONF && next % 10 == 5 && next / 10 == prev / 10 && next > prev {
        tracing::debug!(material = next, prev_material = prev, conf, "suspect trailing-5 read, keeping previous");
        return prev;
    }
    if conf < SUSPECT_CONF && next == 6 && prev == 0 {
        tracing::debug!(conf, "suspect 6-for-0 read, keeping previous");
        return prev;
    }

    next
}

/// Read and correct the material counter.
///
/// `read_box` performs the OCR for a given box index; it is a closure so the
/// box-boundary re-read path stays testable without an OCR engine.
///
/// Material is non-decreasing mid-wave. A drop matching a known box-boundary
/// collapse signature (the counter just outgrew its box) triggers one re-read
/// with the next wider box; any other drop, and any >=10x jump from a nonzero
/// value, keeps the previous value.
pub fn read_material(read_box: &mut dyn FnMut(usize) -> (String, f32), prev: u32, reset: bool) -> u32 {
    let mut box_index = material_box_index(prev, reset);
    let (text, conf) = read_box(box_index);
    let mut material = match_material(&text, conf, prev);

    if material < prev {
        tracing::warn!(material, prev_material = prev, "material decreased");
        let boundary_collapse = (box_index == 0 && prev >= 4 && material <= 2)
            || (box_index == 1 && prev >= 85 && material <= 12)
            || (box_index == 2 && prev >= 980 && material <= 102);
        if boundary_collapse {
            box_index += 1;
            let (text, conf) = read_box(box_index);
            material = match_material(&text, conf, prev);
            tracing::debug!(box_index, material, "re-read with wider box");
        }
    } else if prev > 0 && material >= prev.saturating_mul(MATERIAL_MISREAD_FACTOR) {
        tracing::warn!(material, prev_material = prev, "digit-concatenation misread, keeping previous");
        material = prev;
    }

    material.max(prev)
}

// ---------- Countdown timer ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRead {
    pub value: u32,
    /// The scripted boss-death sequence is holding the timer at 1; the caller
    /// should wait briefly before the next read.
    pub stall: bool,
}

/// Reconcile a timer digit run with the previous countdown.
///
/// `reset_default` switches to the reset rules: no monotonicity history
/// exists yet, so only a zero/absent reading falls back to the default.
/// During normal play a drop of more than [`TIMER_CHANGE_RANGE`] must be
/// corroborated by wall-clock seconds since reset, and the timer never
/// increases.
pub fn correct_timer(
    digits: Option<&str>,
    prev_countdown: u32,
    reset_default: Option<u32>,
    wave: u32,
    wave_timer: u32,
    elapsed_secs: u64,
) -> TimerRead {
    let expected = reset_default.unwrap_or(prev_countdown);
    let mut timer = expected;
    let mut stall = false;

    if let Some(digits) = digits {
        // At the 10 -> 9 transition the trailing digit box bleeds in and "9"
        // reads as "94"/"95"; the leading 9 is the real value.
        if digits.starts_with('9') && prev_countdown == 10 {
            timer = 9;
        } else if let Ok(value) = digits.parse::<u32>() {
            timer = value;
        }
    }

    if reset_default.is_some() {
        return TimerRead {
            value: corrected(expected, Some(timer), |fallback, value| {
                if value == 0 {
                    tracing::warn!(reset_timer = fallback, "unreadable timer at reset, using default");
                    return false;
                }
                true
            }),
            stall: false,
        };
    }

    if timer + TIMER_CHANGE_RANGE < prev_countdown {
        if wave == LAST_WAVE && timer == 0 {
            // Scripted boss death drops straight to 0; accept it.
        } else if wave == LAST_WAVE && timer == 1 {
            tracing::info!(prev_countdown, "timer stalled at 1 before boss death");
            timer = prev_countdown;
            stall = true;
        } else {
            // Corroborate a large drop against wall-clock time since reset.
            let timer_elapsed = wave_timer.saturating_sub(timer) as u64;
            let agrees = timer_elapsed <= elapsed_secs + 1 && timer_elapsed + 1 >= elapsed_secs;
            if agrees {
                tracing::info!(timer, prev_countdown, elapsed_secs, "timer calibration jump accepted");
            } else {
                tracing::warn!(timer, prev_countdown, elapsed_secs, "implausible timer drop, keeping previous");
                timer = prev_countdown;
            }
        }
    } else if timer > prev_countdown {
        tracing::warn!(timer, prev_countdown, "timer increased, keeping previous");
        timer = prev_countdown;
    }

    TimerRead { value: timer, stall }
}

/// Read and correct the countdown. The expected magnitude picks the box (the
/// single-digit box is narrower).
pub fn read_timer(
    reader: &dyn TextReader,
    frame: &OwnedImage,
    prev_countdown: u32,
    reset_default: Option<u32>,
    wave: u32,
    wave_timer: u32,
    elapsed_secs: u64,
) -> TimerRead {
    let expected = reset_default.unwrap_or(prev_countdown);
    let (text, _conf) = reader.read(frame, TIMER_BOXES[usize::from(expected < 10)]);
    let digits = LEADING_NUM_RE
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    correct_timer(digits.as_deref(), prev_countdown, reset_default, wave, wave_timer, elapsed_secs)
}

// ---------- Wave number ----------

pub fn parse_wave(text: &str) -> u32 {
    let wave = LEADING_NUM_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(1);
    wave.max(1)
}

/// Read the wave number off the wave label. Only used at reset; defaults to
/// wave 1 when unreadable.
pub fn read_wave(reader: &dyn TextReader, frame: &OwnedImage) -> u32 {
    let (text, _conf) = reader.read(frame, WAVE_BOX);
    parse_wave(&text)
}
