//! Loading a scene and its settings, shared by every command.

use std::path::{Path, PathBuf};

use anyhow::Context;
use evalgraph_core::{Config, DefaultPathResolver, Depsgraph, OperationBinder, Scene, build_with};

use crate::colors;

/// A validated scene plus the settings to build and evaluate it with.
pub struct Session {
    pub path: PathBuf,
    pub scene: Scene,
    pub config: Config,
}

impl Session {
    /// Load and validate the scene at `scene_path`, and the optional config.
    pub fn load(scene_path: &str, config_path: Option<&str>) -> anyhow::Result<Self> {
        let path = PathBuf::from(scene_path);
        if !path.exists() {
            anyhow::bail!("Scene not found: {}", path.display());
        }

        let scene = Scene::from_path(&path)?;
        scene.validate()?;

        let config = match config_path {
            Some(config_path) => Config::from_path(config_path)
                .with_context(|| format!("failed to load config {config_path}"))?,
            None => Config::default(),
        };

        tracing::debug!(
            "loaded scene '{}' with {} entities",
            scene.name,
            scene.entities.len()
        );
        Ok(Self { path, scene, config })
    }

    /// Build the graph with the session's settings.
    pub fn build(&self, binder: &dyn OperationBinder) -> Depsgraph {
        build_with(&self.scene, binder, &DefaultPathResolver, &self.config.build)
    }

    pub fn scene_name(&self) -> &str {
        if self.scene.name.is_empty() {
            file_stem(&self.path)
        } else {
            &self.scene.name
        }
    }

    pub fn print_header(&self, action: &str) {
        println!(
            "\n{}evalgraph{} - {} {}{}{}",
            colors::BOLD,
            colors::RESET,
            action,
            colors::CYAN,
            self.scene_name(),
            colors::RESET
        );
        println!("{}", "─".repeat(50));
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("scene")
}
