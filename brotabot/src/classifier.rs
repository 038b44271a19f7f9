//! Template-matching scene model.
//!
//! The default [`SceneModel`] backend: one reference thumbnail per scene,
//! classified by minimal mean pixel deviation on downscaled frames. Menus and
//! banners in this game are static full-screen layouts, which keeps template
//! matching surprisingly competitive; a trained classifier can be substituted
//! through the trait without touching the rest of the pipeline.
//!
//! Template files are named `<ordinal>_<anything>.png`, where the ordinal is
//! the scene's classifier index (e.g. `4_wave.png`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use ie::OwnedImage;

use crate::scene::SceneModel;

const TEMPLATE_WIDTH: u32 = 96;
const TEMPLATE_HEIGHT: u32 = 54;

pub struct TemplateClassifier {
    templates: Vec<(usize, OwnedImage)>,
}

impl TemplateClassifier {
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut templates = Vec::new();

        for entry in fs::read_dir(dir).with_context(|| format!("read template dir {:?}", dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(index) = stem.split(['_', '-']).next().and_then(|v| v.parse::<usize>().ok()) else {
                tracing::warn!(path = %path.display(), "template name carries no scene ordinal, skipping");
                continue;
            };

            let bytes = fs::read(&path).with_context(|| format!("read template {:?}", path))?;
            let image = OwnedImage::from_png(&bytes)
                .with_context(|| format!("decode template {:?}", path))?
                .resized_to(TEMPLATE_WIDTH, TEMPLATE_HEIGHT);
            templates.push((index, image));
        }

        if templates.is_empty() {
            bail!("no scene templates found in {:?}", dir);
        }

        tracing::info!(count = templates.len(), "scene templates loaded");
        Ok(Self { templates })
    }
}

impl SceneModel for TemplateClassifier {
    fn classify(&mut self, frame: &OwnedImage) -> Option<(usize, f32)> {
        let small = frame.clone().resized_to(TEMPLATE_WIDTH, TEMPLATE_HEIGHT);
        let view = small.as_image();

        let mut best: Option<(usize, f32)> = None;
        for (index, template) in &self.templates {
            let deviation = view.mean_deviation(template.as_image());
            if best.map_or(true, |(_, d)| deviation < d) {
                best = Some((*index, deviation));
            }
        }

        // Deviation to confidence: identical frames land near 1.0, anything
        // past a few units of mean deviation falls under the 0.2 floor.
        best.map(|(index, deviation)| (index, 1.0 / (1.0 + deviation)))
    }
}
