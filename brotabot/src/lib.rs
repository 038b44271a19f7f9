//! Brotabot: a screen-driven agent for Brotato.
//!
//! Perception goes one way per step: raw frame, scene classification, HUD
//! field estimation, reward, episode bookkeeping. The interesting part is not
//! the capture or the key injection but turning intermittently wrong OCR
//! readings into a trustworthy game-state signal; see [`hud`] and [`env`].

pub mod capture;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod env;
pub mod hud;
pub mod input;
pub mod layout;
pub mod outcome;
pub mod reader;
pub mod reward;
pub mod scene;
pub mod state;
