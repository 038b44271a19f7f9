//! Scene labels and the classifier adapter.
//!
//! The classifier itself is an external collaborator behind [`SceneModel`];
//! this module owns the closed label set and the confidence policy. Anything
//! the model cannot vouch for degrades to [`Scene::Unknown`], never to an
//! error.

use ie::OwnedImage;

/// Confidence floor shared by the scene classifier and the region text
/// reader. Digit crops legitimately score low, hence the permissive value.
pub const CONF_THRESHOLD: f32 = 0.2;

/// The game screen inferred from a single frame.
///
/// The discriminants are the class ordinals of the trained classifier; keep
/// them in sync with the model's label order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    MainMenu = 0,
    CharacterSelection = 1,
    WeaponSelection = 2,
    DifficultySelection = 3,

    Wave = 4,
    WaveEnd = 5,
    Shop = 6,
    LevelUp = 7,
    ItemFound = 8,
    RunEnd = 9,

    PauseMenu = 10,
    OptionsMenu = 11,
    GeneralMenu = 12,
    GameplayMenu = 13,
    ConfirmMenu = 14,

    Unknown = 99,
}

impl Scene {
    /// Map a classifier ordinal to a scene. Fails closed: an out-of-range
    /// index is treated as an unrecognized frame, not an error.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Scene::MainMenu,
            1 => Scene::CharacterSelection,
            2 => Scene::WeaponSelection,
            3 => Scene::DifficultySelection,
            4 => Scene::Wave,
            5 => Scene::WaveEnd,
            6 => Scene::Shop,
            7 => Scene::LevelUp,
            8 => Scene::ItemFound,
            9 => Scene::RunEnd,
            10 => Scene::PauseMenu,
            11 => Scene::OptionsMenu,
            12 => Scene::GeneralMenu,
            13 => Scene::GameplayMenu,
            14 => Scene::ConfirmMenu,
            _ => Scene::Unknown,
        }
    }
}

/// Outcome of a finished wave, read off the result banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveOutcome {
    /// The banner is absent or still fading in; keep observing.
    Continuing,
    /// Survived until the timer ran out.
    Completed,
    /// Boss defeated on the final wave.
    Won,
    /// Player died.
    Lost,
    /// Banner text present but unrecognized.
    Unknown,
}

impl WaveOutcome {
    /// True for the outcomes that end an episode.
    pub fn is_terminal(self) -> bool {
        matches!(self, WaveOutcome::Completed | WaveOutcome::Won | WaveOutcome::Lost)
    }
}

/// External top-1 classifier contract: label ordinal plus confidence.
pub trait SceneModel {
    fn classify(&mut self, frame: &OwnedImage) -> Option<(usize, f32)>;
}

/// Applies the confidence policy on top of a [`SceneModel`].
pub struct SceneClassifier {
    model: Box<dyn SceneModel>,
}

impl SceneClassifier {
    pub fn new(model: Box<dyn SceneModel>) -> Self {
        Self { model }
    }

    /// Classify a frame; anything at or below the confidence floor is
    /// [`Scene::Unknown`].
    pub fn classify(&mut self, frame: &OwnedImage) -> Scene {
        match self.model.classify(frame) {
            Some((index, conf)) if conf > CONF_THRESHOLD => Scene::from_index(index),
            _ => Scene::Unknown,
        }
    }
}
