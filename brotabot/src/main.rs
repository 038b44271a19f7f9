//! Binary entry point: wires the perception pipeline (capture, scene
//! classification, OCR) into the episode state machine and runs the play
//! loop. The policy is external; a uniform random action stands in for it
//! here.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;

use brotabot::env::{Action, BrotatoEnv};
use brotabot::{capture, classifier, clock, config, input, reader, scene};

fn main() -> Result<()> {
    // Structured logging. Use `RUST_LOG=info` etc.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = config::Config::load_or_default();

    let ie = ie::Ie::try_new(&cfg.ocr_detection, &cfg.ocr_recognition, &cfg.ocr_charset)
        .context("initialize OCR engine (missing model files?)")?;
    let model = classifier::TemplateClassifier::from_dir(&cfg.scene_templates)
        .context("load scene templates")?;

    let mut env = BrotatoEnv::new(
        Box::new(capture::WindowCapture::new(cfg.app_name.clone())),
        scene::SceneClassifier::new(Box::new(model)),
        Box::new(reader::IeReader::new(ie)),
        input::default_actuator(cfg.key_hold()),
        Box::new(clock::SystemClock),
        cfg.poll_intervals(),
    );

    let mut rng = rand::rng();

    let (_observation, info) = env.reset();
    tracing::info!(?info, "episode started");

    // Hold Q to quit; the signal is only honored between steps.
    while !input::quit_requested() {
        let action = Action::from_index(rng.random_range(0..Action::COUNT))
            .expect("action index in range");

        let result = env.step(action);
        if result.terminated {
            tracing::info!(
                accumulators = ?env.reward_accumulators(),
                "episode finished"
            );
            std::thread::sleep(Duration::from_secs(3));
            let (_observation, info) = env.reset();
            tracing::info!(?info, "episode started");
        }
    }

    Ok(())
}
