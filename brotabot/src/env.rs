//! Episode state machine.
//!
//! The top-level driver exposed to the RL loop as a `reset`/`step` pair. One
//! step is one capture, one scene classification, and (while a wave is on
//! screen) the HUD reads and reward computation, all sequential. Perception
//! glitches never crash an episode: every recoverable condition degrades to
//! "reuse the last known good state".

use std::time::{Duration, Instant};

use ie::OwnedImage;

use crate::capture::FrameSource;
use crate::clock::Clock;
use crate::hud::{self, WAVE_TIMER_DEFAULT};
use crate::input::{Actuator, Key};
use crate::layout::{MAP_AREA, MATERIAL_BOXES, OBSERVATION_HEIGHT, OBSERVATION_WIDTH};
use crate::outcome;
use crate::reader::TextReader;
use crate::reward::RewardEngine;
use crate::scene::{Scene, SceneClassifier};
use crate::state::GameState;

/// The agent's action space: movement only. Menus are handled by the reset
/// protocol, not the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    pub const COUNT: usize = 4;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Action::Up),
            1 => Some(Action::Down),
            2 => Some(Action::Left),
            3 => Some(Action::Right),
            _ => None,
        }
    }

    fn key(self) -> Key {
        match self {
            Action::Up => Key::Up,
            Action::Down => Key::Down,
            Action::Left => Key::Left,
            Action::Right => Key::Right,
        }
    }
}

/// Diagnostic fields exposed to the driver; filled per scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepInfo {
    pub wave: Option<u32>,
    pub timer: Option<u32>,
    pub hp: Option<u32>,
    pub total_hp: Option<u32>,
    pub material: Option<u32>,
    /// Material gained since reset; reported on wave-end steps.
    pub total_material: Option<u32>,
    pub end_text: Option<String>,
}

pub struct StepResult {
    pub observation: OwnedImage,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

/// Sleep durations for the explicit wait points of the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub window_retry: Duration,
    pub pause: Duration,
    pub reset: Duration,
    pub boss_stall: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            window_retry: Duration::from_secs(1),
            pause: Duration::from_secs(3),
            reset: Duration::from_millis(500),
            boss_stall: Duration::from_millis(200),
        }
    }
}

pub struct BrotatoEnv {
    frames: Box<dyn FrameSource>,
    classifier: SceneClassifier,
    reader: Box<dyn TextReader>,
    input: Box<dyn Actuator>,
    clock: Box<dyn Clock>,
    intervals: PollIntervals,

    state: GameState,
    rewards: RewardEngine,
    prev_scene: Scene,

    step_count: u32,
    global_step_count: u64,
    reset_count: u32,
    reset_at: Instant,
    step_elapsed_sum: Duration,
}

impl BrotatoEnv {
    pub fn new(
        frames: Box<dyn FrameSource>,
        classifier: SceneClassifier,
        reader: Box<dyn TextReader>,
        input: Box<dyn Actuator>,
        clock: Box<dyn Clock>,
        intervals: PollIntervals,
    ) -> Self {
        let reset_at = clock.now();
        Self {
            frames,
            classifier,
            reader,
            input,
            clock,
            intervals,
            state: GameState::default(),
            rewards: RewardEngine::default(),
            prev_scene: Scene::Unknown,
            step_count: 0,
            global_step_count: 0,
            reset_count: 0,
            reset_at,
            step_elapsed_sum: Duration::ZERO,
        }
    }

    /// Last corrected HUD state (diagnostics).
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Per-episode reward component sums (diagnostics).
    pub fn reward_accumulators(&self) -> crate::reward::RewardAccumulators {
        self.rewards.accum
    }

    /// Advance one step. Only acts when the previous scene was a running
    /// wave; always re-observes and re-classifies after acting.
    pub fn step(&mut self, action: Action) -> StepResult {
        let step_start = self.clock.now();
        self.global_step_count += 1;
        self.step_count += 1;

        let mut reward = 0.0f32;
        let mut terminated = false;
        let truncated = false;
        let mut info = StepInfo::default();

        if self.prev_scene == Scene::Wave {
            self.input.press(action.key());
        }

        let mut frame = self.wait_frame();
        let mut scene = self.classifier.classify(&frame);

        // The pause menu is transient, not terminal: block until it clears so
        // an external pause/resume around rollouts cannot corrupt an episode.
        while scene == Scene::PauseMenu {
            tracing::info!("pause menu up, waiting");
            self.clock.sleep(self.intervals.pause);
            frame = self.wait_frame();
            scene = self.classifier.classify(&frame);
        }

        if scene == Scene::Wave || scene == Scene::WaveEnd {
            let (hp, total_hp) =
                hud::read_hp(self.reader.as_ref(), &frame, self.state.hp, self.state.total_hp, false);
            let timer = hud::read_timer(
                self.reader.as_ref(),
                &frame,
                self.state.countdown,
                None,
                self.state.wave,
                self.state.wave_timer,
                self.elapsed_secs(),
            );
            if timer.stall {
                self.clock.sleep(self.intervals.boss_stall);
            }
            let countdown = timer.value;

            info.timer = Some(countdown);
            info.hp = Some(hp);
            info.total_hp = Some(total_hp);

            // The classifier fires the end-of-wave label a frame early now
            // and then; a live hp and countdown mean the wave is still
            // running. Countdown is checked against 1 because a 0 read is
            // itself unreliable.
            if scene == Scene::WaveEnd && hp > 0 && countdown > 1 {
                tracing::info!(hp, countdown, "wave-end classification overridden back to wave");
                scene = Scene::Wave;
            }

            if scene == Scene::Wave {
                let material = self.read_material(&frame, false);

                reward = self.rewards.step_reward(&self.state, hp, material, None, self.step_count);

                // Note: state commits happen after the reward, which compares
                // against the previous values. A countdown read of 0 is not
                // committed so the pre-zero value survives into the lost-wave
                // time penalty.
                if countdown > 0 {
                    self.state.countdown = countdown;
                }
                self.state.hp = hp;
                self.state.total_hp = total_hp;
                self.state.material = material;

                info.material = Some(material);
            } else {
                let banner = outcome::read_outcome(self.reader.as_ref(), &frame);
                if let Some(text) = banner.end_text {
                    self.state.end_text = text;
                }
                // An unresolved banner is still fading in; keep observing.
                if banner.outcome.is_terminal() {
                    terminated = true;
                    reward = self.rewards.step_reward(
                        &self.state,
                        hp,
                        self.state.material,
                        Some(banner.outcome),
                        self.step_count,
                    );
                }

                self.state.countdown = countdown;
                self.state.hp = hp;
                self.state.total_hp = total_hp;

                info.total_material = Some(self.state.material - self.state.init_material);
                info.end_text = Some(self.state.end_text.clone());
            }
        } else if matches!(scene, Scene::ItemFound | Scene::LevelUp | Scene::Shop | Scene::RunEnd) {
            // Outside the action space; hand control back to the reset
            // protocol.
            terminated = true;
        } else if scene == Scene::Unknown {
            // Transient classifier noise; no-op step.
        } else {
            terminated = true;
        }

        self.prev_scene = scene;

        let elapsed = self.clock.now().duration_since(step_start);
        self.step_elapsed_sum += elapsed;
        let average = self.step_elapsed_sum / self.step_count.max(1);

        tracing::info!(
            step = self.global_step_count,
            ?scene,
            ?action,
            reward,
            terminated,
            ?info,
            elapsed_ms = elapsed.as_millis() as u64,
            average_ms = average.as_millis() as u64,
            "step"
        );

        StepResult {
            observation: self.observation(&frame),
            reward,
            terminated,
            truncated,
            info,
        }
    }

    /// Block until the game shows a running wave, then rebuild the episode
    /// state from fresh baseline reads.
    pub fn reset(&mut self) -> (OwnedImage, StepInfo) {
        tracing::info!("waiting for a running wave");

        let mut frame = self.wait_frame();
        let mut scene = self.classifier.classify(&frame);
        while scene != Scene::Wave {
            if scene == Scene::ConfirmMenu || scene == Scene::WaveEnd {
                // Retry a failed wave / dismiss the result screen.
                self.input.press(Key::Confirm);
            }
            self.clock.sleep(self.intervals.reset);
            frame = self.wait_frame();
            scene = self.classifier.classify(&frame);
        }

        self.state = GameState::default();
        self.rewards.reset();
        self.step_count = 0;
        self.step_elapsed_sum = Duration::ZERO;

        // Baseline reads skip the monotonicity checks: nothing from the
        // terminated episode carries over.
        self.state.wave = hud::read_wave(self.reader.as_ref(), &frame);

        let timer = hud::read_timer(
            self.reader.as_ref(),
            &frame,
            self.state.countdown,
            Some(WAVE_TIMER_DEFAULT),
            self.state.wave,
            WAVE_TIMER_DEFAULT,
            0,
        );
        self.state.wave_timer = timer.value;
        self.state.countdown = timer.value;

        let (hp, total_hp) = hud::read_hp(self.reader.as_ref(), &frame, 0, 0, true);
        self.state.hp = hp;
        self.state.total_hp = total_hp;

        let material = self.read_material(&frame, true);
        self.state.init_material = material;
        self.state.material = material;

        self.prev_scene = scene;
        self.reset_count += 1;
        self.reset_at = self.clock.now();

        let info = StepInfo {
            wave: Some(self.state.wave),
            timer: Some(self.state.countdown),
            hp: Some(self.state.hp),
            total_hp: Some(self.state.total_hp),
            material: Some(self.state.material),
            ..StepInfo::default()
        };

        tracing::info!(reset_count = self.reset_count, ?info, "reset");
        (self.observation(&frame), info)
    }

    /// Open the pause menu unless it is already up. Used by an external
    /// training-loop callback between rollouts.
    pub fn pause(&mut self) {
        let frame = self.wait_frame();
        if self.classifier.classify(&frame) != Scene::PauseMenu {
            self.input.press(Key::Pause);
        }
    }

    /// Leave the pause menu if it is up.
    pub fn resume(&mut self) {
        let frame = self.wait_frame();
        if self.classifier.classify(&frame) == Scene::PauseMenu {
            self.input.press(Key::Confirm);
        }
    }

    fn wait_frame(&mut self) -> OwnedImage {
        loop {
            if let Some(frame) = self.frames.grab() {
                return frame;
            }
            tracing::warn!(window = self.frames.name(), "window unavailable, retrying");
            self.clock.sleep(self.intervals.window_retry);
        }
    }

    fn read_material(&self, frame: &OwnedImage, reset: bool) -> u32 {
        let prev = self.state.material;
        let reader = self.reader.as_ref();
        hud::read_material(
            &mut |box_index| reader.read(frame, MATERIAL_BOXES[box_index]),
            prev,
            reset,
        )
    }

    fn observation(&self, frame: &OwnedImage) -> OwnedImage {
        frame
            .as_image()
            .sub_image(MAP_AREA.x, MAP_AREA.y, MAP_AREA.w, MAP_AREA.h)
            .to_owned_image()
            .resized_to(OBSERVATION_WIDTH, OBSERVATION_HEIGHT)
    }

    fn elapsed_secs(&self) -> u64 {
        self.clock.now().duration_since(self.reset_at).as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::clock::FakeClock;
    use crate::layout::{HP_BOXES, Rect, TIMER_BOXES, WAVE_BOX, WAVE_RESULT_BOX};
    use crate::scene::SceneModel;

    fn frame() -> OwnedImage {
        OwnedImage::from_rgba(960, &vec![0u8; 960 * 540 * 4])
    }

    /// Frame source that fails a fixed number of grabs first.
    struct FlakyFrames {
        failures: u32,
    }

    impl FrameSource for FlakyFrames {
        fn grab(&mut self) -> Option<OwnedImage> {
            if self.failures > 0 {
                self.failures -= 1;
                return None;
            }
            Some(frame())
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    fn frames() -> Box<dyn FrameSource> {
        Box::new(FlakyFrames { failures: 0 })
    }

    /// Scene model that replays a script, repeating the last entry.
    struct ScriptedScenes {
        script: Vec<(usize, f32)>,
        at: usize,
    }

    impl SceneModel for ScriptedScenes {
        fn classify(&mut self, _frame: &OwnedImage) -> Option<(usize, f32)> {
            let entry = self.script[self.at.min(self.script.len() - 1)];
            self.at += 1;
            Some(entry)
        }
    }

    fn scenes(script: &[Scene]) -> SceneClassifier {
        SceneClassifier::new(Box::new(ScriptedScenes {
            script: script.iter().map(|s| (*s as usize, 0.9)).collect(),
            at: 0,
        }))
    }

    /// Reader answering by region; unknown regions read as empty.
    struct MapReader {
        entries: Vec<(Rect, String, f32)>,
    }

    impl TextReader for MapReader {
        fn read(&self, _frame: &OwnedImage, rect: Rect) -> (String, f32) {
            for (r, text, conf) in &self.entries {
                if *r == rect {
                    return (text.clone(), *conf);
                }
            }
            (String::new(), 0.0)
        }
    }

    fn reader(entries: &[(Rect, &str)]) -> Box<dyn TextReader> {
        Box::new(MapReader {
            entries: entries
                .iter()
                .map(|(r, t)| (*r, t.to_string(), 0.9))
                .collect(),
        })
    }

    struct RecordingActuator(Rc<RefCell<Vec<Key>>>);

    impl Actuator for RecordingActuator {
        fn press(&mut self, key: Key) {
            self.0.borrow_mut().push(key);
        }
    }

    struct Harness {
        env: BrotatoEnv,
        presses: Rc<RefCell<Vec<Key>>>,
        clock: Rc<FakeClock>,
    }

    /// Clock handle shared with the env.
    struct SharedClock(Rc<FakeClock>);

    impl Clock for SharedClock {
        fn now(&self) -> std::time::Instant {
            self.0.now()
        }

        fn sleep(&self, duration: Duration) {
            self.0.sleep(duration);
        }
    }

    fn harness(scene_script: &[Scene], read_entries: &[(Rect, &str)]) -> Harness {
        let presses = Rc::new(RefCell::new(Vec::new()));
        let clock = Rc::new(FakeClock::new());
        let env = BrotatoEnv::new(
            frames(),
            scenes(scene_script),
            reader(read_entries),
            Box::new(RecordingActuator(presses.clone())),
            Box::new(SharedClock(clock.clone())),
            PollIntervals::default(),
        );
        Harness { env, presses, clock }
    }

    /// Baseline reads for a fresh wave: wave 3, timer 20, hp 100/100,
    /// material 12 (read through the reset box).
    fn baseline() -> Vec<(Rect, &'static str)> {
        vec![
            (WAVE_BOX, "Wave 3"),
            (TIMER_BOXES[0], "20"),
            (HP_BOXES[0], "100/100"),
            (MATERIAL_BOXES[3], "12"),
            (MATERIAL_BOXES[1], "12"),
        ]
    }

    #[test]
    fn reset_reads_fresh_baselines() {
        let mut h = harness(&[Scene::Wave], &baseline());
        let (observation, info) = h.env.reset();

        assert_eq!(observation.width(), OBSERVATION_WIDTH);
        assert_eq!(observation.height(), OBSERVATION_HEIGHT);
        assert_eq!(info.wave, Some(3));
        assert_eq!(info.timer, Some(20));
        assert_eq!(info.hp, Some(100));
        assert_eq!(info.total_hp, Some(100));
        assert_eq!(info.material, Some(12));
        assert!(h.presses.borrow().is_empty());
    }

    #[test]
    fn reset_confirms_through_blocking_menus() {
        let mut h = harness(&[Scene::ConfirmMenu, Scene::WaveEnd, Scene::Shop, Scene::Wave], &baseline());
        h.env.reset();

        // Confirm pressed for the confirm menu and the wave-end screen, but
        // not for the shop poll.
        assert_eq!(*h.presses.borrow(), vec![Key::Confirm, Key::Confirm]);
        // Three poll sleeps at 0.5s each.
        assert_eq!(h.clock.slept(), Duration::from_millis(1500));
    }

    #[test]
    fn step_acts_only_from_a_running_wave() {
        let mut h = harness(&[Scene::Wave, Scene::Wave, Scene::Shop, Scene::Unknown], &baseline());
        h.env.reset();

        // prev scene is Wave: the action goes out.
        let result = h.env.step(Action::Left);
        assert!(!result.terminated);
        assert_eq!(*h.presses.borrow(), vec![Key::Left]);

        // Terminal shop step; prev scene was Wave so the action still fires.
        let result = h.env.step(Action::Up);
        assert!(result.terminated);
        assert_eq!(*h.presses.borrow(), vec![Key::Left, Key::Up]);

        // prev scene is Shop now: no action for the Unknown no-op step.
        let result = h.env.step(Action::Down);
        assert!(!result.terminated);
        assert_eq!(result.reward, 0.0);
        assert_eq!(*h.presses.borrow(), vec![Key::Left, Key::Up]);
    }

    #[test]
    fn early_wave_end_classification_is_overridden() {
        // The HUD still shows a live wave (hp 100, countdown 20) when the
        // classifier fires WaveEnd a frame early.
        let mut h = harness(
            &[Scene::Wave, Scene::WaveEnd],
            &[
                (WAVE_BOX, "Wave 3"),
                (TIMER_BOXES[0], "20"),
                (HP_BOXES[0], "100/100"),
                (MATERIAL_BOXES[3], "12"),
                (MATERIAL_BOXES[1], "14"),
            ],
        );
        h.env.reset();
        let result = h.env.step(Action::Up);

        // Treated as a running wave: the episode continues and material was
        // read, which only happens on the wave branch.
        assert!(!result.terminated);
        assert_eq!(result.info.material, Some(14));
        assert_eq!(result.info.end_text, None);
    }

    #[test]
    fn wave_end_with_resolved_banner_terminates() {
        // Died: hp reads 0 (which also blocks the early-wave-end override)
        // and the banner resolved to "lost".
        let reads: Vec<(Rect, &str)> = vec![
            (WAVE_BOX, "Wave 3"),
            (TIMER_BOXES[0], "20"),
            (HP_BOXES[0], "0/100"),
            (MATERIAL_BOXES[3], "12"),
            (WAVE_RESULT_BOX, "lost"),
        ];
        let mut h = harness(&[Scene::Wave, Scene::WaveEnd], &reads);
        // Reset reads hp 0/100 as the baseline too; that is fine for this
        // scenario (the hp component stays silent when hp does not move).
        h.env.reset();
        let result = h.env.step(Action::Up);

        assert!(result.terminated);
        assert_eq!(result.info.end_text.as_deref(), Some("lost"));
        assert_eq!(result.info.total_material, Some(0));
        // Lost penalty: -(20^(20/20) * 0.1). No hp or material terms.
        let expected = -(20.0f32.powf(1.0) * 0.1);
        assert!((result.reward - expected).abs() < 1e-5, "reward = {}", result.reward);
    }

    #[test]
    fn forming_banner_keeps_the_episode_alive() {
        let reads: Vec<(Rect, &str)> = vec![
            (WAVE_BOX, "Wave 3"),
            (TIMER_BOXES[0], "20"),
            (HP_BOXES[0], "0/100"),
            (MATERIAL_BOXES[3], "12"),
            (WAVE_RESULT_BOX, "lo"),
        ];
        let mut h = harness(&[Scene::Wave, Scene::WaveEnd], &reads);
        h.env.reset();
        let result = h.env.step(Action::Up);

        assert!(!result.terminated);
        assert_eq!(result.reward, 0.0);
        // The two-glyph run is too short to be recorded.
        assert_eq!(result.info.end_text.as_deref(), Some(""));
    }

    #[test]
    fn pause_menu_blocks_until_cleared() {
        let mut h = harness(
            &[Scene::Wave, Scene::PauseMenu, Scene::PauseMenu, Scene::Wave],
            &baseline(),
        );
        h.env.reset();
        let result = h.env.step(Action::Up);

        assert!(!result.terminated);
        // Two pause polls at 3s each.
        assert_eq!(h.clock.slept(), Duration::from_secs(6));
    }

    #[test]
    fn absent_window_retries_instead_of_failing() {
        let presses = Rc::new(RefCell::new(Vec::new()));
        let clock = Rc::new(FakeClock::new());
        let mut env = BrotatoEnv::new(
            Box::new(FlakyFrames { failures: 2 }),
            scenes(&[Scene::Wave]),
            reader(&baseline()),
            Box::new(RecordingActuator(presses)),
            Box::new(SharedClock(clock.clone())),
            PollIntervals::default(),
        );
        env.reset();

        assert_eq!(clock.slept(), Duration::from_secs(2));
    }

    #[test]
    fn unknown_scene_is_a_noop() {
        let mut h = harness(&[Scene::Wave, Scene::Unknown], &baseline());
        h.env.reset();
        let result = h.env.step(Action::Up);

        assert!(!result.terminated);
        assert_eq!(result.reward, 0.0);
        assert_eq!(result.info, StepInfo::default());
    }

    #[test]
    fn unrecognized_menu_terminates() {
        let mut h = harness(&[Scene::Wave, Scene::OptionsMenu], &baseline());
        h.env.reset();
        let result = h.env.step(Action::Up);
        assert!(result.terminated);
    }
}
