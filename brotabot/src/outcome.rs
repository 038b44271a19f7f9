//! Wave outcome detection.
//!
//! The result banner fades in over several frames, so reads arrive partial
//! and garbled. Matching is anchored on the leading glyphs of the three known
//! outcome phrases and tolerates one misread glyph; anything shorter than the
//! match prefix means the banner is still forming.

use std::sync::LazyLock;

use ie::OwnedImage;
use regex::Regex;

use crate::layout::WAVE_RESULT_BOX;
use crate::reader::TextReader;
use crate::scene::WaveOutcome;

pub const WAVE_COMPLETED_TEXT: &str = "completed";
pub const WAVE_WON_TEXT: &str = "won";
pub const WAVE_LOST_TEXT: &str = "lost";

/// Shortest leading glyph run that distinguishes the three phrases.
pub const WAVE_TEXT_MATCH_LEN: usize = 3;

static LEADING_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S*)").expect("banner regex"));

/// Result of one banner read: the outcome plus the raw leading run (kept for
/// diagnostics once it is long enough to mean anything).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerRead {
    pub outcome: WaveOutcome,
    pub end_text: Option<String>,
}

/// Classify banner text.
pub fn match_outcome(text: &str) -> BannerRead {
    let run = LEADING_RUN_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");

    let glyphs: Vec<char> = run.chars().collect();
    if glyphs.len() < WAVE_TEXT_MATCH_LEN {
        return BannerRead {
            outcome: WaveOutcome::Continuing,
            end_text: None,
        };
    }

    let prefix: String = glyphs[..WAVE_TEXT_MATCH_LEN].iter().collect::<String>().to_lowercase();

    let outcome = match_prefix(&prefix).unwrap_or(WaveOutcome::Unknown);
    BannerRead {
        outcome,
        end_text: Some(run.to_string()),
    }
}

fn match_prefix(prefix: &str) -> Option<WaveOutcome> {
    let phrases = [
        (WAVE_COMPLETED_TEXT, WaveOutcome::Completed),
        (WAVE_WON_TEXT, WaveOutcome::Won),
        (WAVE_LOST_TEXT, WaveOutcome::Lost),
    ];

    // Exact prefix match first.
    for (phrase, outcome) in phrases {
        if phrase.chars().take(WAVE_TEXT_MATCH_LEN).collect::<String>() == prefix {
            return Some(outcome);
        }
    }

    // One misread glyph is common mid-fade; accept a unique distance-1 match.
    let mut best: Option<WaveOutcome> = None;
    for (phrase, outcome) in phrases {
        let target: String = phrase.chars().take(WAVE_TEXT_MATCH_LEN).collect();
        if levenshtein::levenshtein(prefix, &target) <= 1 {
            if best.is_some() {
                return None; // ambiguous
            }
            best = Some(outcome);
        }
    }
    best
}

/// Read the banner region and classify it.
pub fn read_outcome(reader: &dyn TextReader, frame: &OwnedImage) -> BannerRead {
    let (text, _conf) = reader.read(frame, WAVE_RESULT_BOX);
    match_outcome(&text)
}
