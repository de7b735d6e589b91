//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Meridian command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "meridian", about = "Adaptive LOD streaming core")]
pub struct CliArgs {
    /// Screen-space error target in pixels.
    #[arg(long)]
    pub error_target: Option<f64>,

    /// Enable or disable the grazing-angle distance remap.
    #[arg(long)]
    pub dynamic_distance_remap: Option<bool>,

    /// Maximum number of in-flight decode tasks.
    #[arg(long)]
    pub max_active_tasks: Option<usize>,

    /// Number of compute units.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Precompiled compute module to load.
    #[arg(long)]
    pub module: Option<PathBuf>,

    /// Viewport width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(target) = args.error_target {
            self.lod.error_target = target;
        }
        if let Some(remap) = args.dynamic_distance_remap {
            self.lod.dynamic_distance_remap = remap;
        }
        if let Some(max) = args.max_active_tasks {
            self.dispatch.maximum_active_tasks = Some(max);
        }
        if let Some(workers) = args.workers {
            self.dispatch.worker_count = workers;
        }
        if let Some(ref module) = args.module {
            self.dispatch.module_path = Some(module.clone());
        }
        if let Some(w) = args.width {
            self.camera.viewport_width = w;
        }
        if let Some(h) = args.height {
            self.camera.viewport_height = h;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
