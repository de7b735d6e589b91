//! Headless viewer: evaluates a synthetic tile grid from two cameras and
//! decodes the tiles that need refinement on background compute units.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p meridian-viewer -- --error-target 4 --max-active-tasks 2`.

mod decoder;
mod scene;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use meridian_config::{CliArgs, Config};
use meridian_dispatch::{
    ComputeModule, ComputeModuleOptions, DispatchError, DispatcherOptions, FnEntry, ModuleSource,
    TaskDispatcher, TaskHandle, Transferable,
};
use meridian_lod::{PluginSet, ViewErrorEvaluator};
use tracing::{debug, error, info, warn};

use crate::decoder::{BUILTIN_MODULE, DecodeParameters, DecodedMesh, MeshDecoder, encode_positions};
use crate::scene::{FocusPlugin, GridTile, TILE_EXTENT};

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(10);

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meridian")
    });

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    meridian_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&config) {
        error!("viewer failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), DispatchError> {
    let tiles = scene::tile_grid();
    let cameras = scene::cameras(&config.camera);

    let mut plugins = PluginSet::new();
    plugins.register(Arc::new(FocusPlugin {
        center: glam::DVec3::ZERO,
        radius: TILE_EXTENT,
        error: config.lod.error_target * 2.0,
    }));

    let evaluator = ViewErrorEvaluator::new(config.lod.dynamic_distance_remap);
    let mut refine: Vec<(f64, &GridTile)> = Vec::new();
    let mut visible = 0;
    for grid_tile in &tiles {
        let result = evaluator.evaluate(&grid_tile.tile, &cameras, plugins.as_slice());
        if result.in_view {
            visible += 1;
        }
        if result.should_refine(config.lod.error_target) {
            debug!(
                tile = ?grid_tile.coord,
                error = result.error,
                distance = result.distance_from_camera,
                "tile needs refinement"
            );
            refine.push((result.distance_from_camera, grid_tile));
        }
    }
    // Nearest first, the way a traversal would prioritize loads.
    refine.sort_by(|a, b| a.0.total_cmp(&b.0));
    info!(
        tiles = tiles.len(),
        visible,
        refine = refine.len(),
        error_target = config.lod.error_target,
        "evaluated tile grid"
    );

    let entry = FnEntry::new("decoder", || {
        Box::new(MeshDecoder::default()) as Box<dyn ComputeModule>
    });
    let dispatcher = TaskDispatcher::with_options(
        Arc::new(entry),
        DispatcherOptions {
            maximum_active_tasks: config.dispatch.maximum_active_tasks,
            worker_count: config.dispatch.worker_count,
            base_reference_path: config.dispatch.base_reference_path.clone(),
            capabilities: None,
        },
    );
    info!(
        workers = dispatcher.worker_count(),
        max_active = ?dispatcher.maximum_active_tasks(),
        capabilities = ?dispatcher.capabilities(),
        "dispatcher ready"
    );

    let module = match &config.dispatch.module_path {
        Some(path) => ModuleSource::Path(path.clone()),
        None => ModuleSource::Bytes(Arc::from(BUILTIN_MODULE)),
    };
    dispatcher.initialize_compute_module(&ComputeModuleOptions {
        module,
        fallback_module_path: config.dispatch.fallback_module_path.clone(),
    })?;

    let completions = dispatcher.subscribe_completions();
    let mut queue: VecDeque<&GridTile> = refine.into_iter().map(|(_, t)| t).collect();
    let mut handles: Vec<TaskHandle> = Vec::with_capacity(queue.len());
    let mut rejected = 0_usize;

    while let Some(grid_tile) = queue.pop_front() {
        let parameters = DecodeParameters {
            tile: grid_tile.coord,
        };
        let payload: Transferable = Arc::from(encode_positions(&tile_positions(grid_tile)));
        match dispatcher.schedule_task(&parameters, vec![payload])? {
            Some(handle) => handles.push(handle),
            None => {
                // At capacity: wait for a slot, then retry this tile.
                rejected += 1;
                queue.push_front(grid_tile);
                if completions.recv_timeout(COMPLETION_TIMEOUT).is_err() {
                    warn!("no task completed within {COMPLETION_TIMEOUT:?}");
                    break;
                }
            }
        }
    }

    let mut decoded = 0_usize;
    let mut vertices = 0_usize;
    for handle in handles {
        let id = handle.id();
        match handle.wait_as::<DecodedMesh>() {
            Ok(mesh) => {
                decoded += 1;
                vertices += mesh.vertex_count;
                debug!(id, tile = ?mesh.tile, min = ?mesh.min, max = ?mesh.max, "tile decoded");
            }
            Err(e) => warn!(id, "decode failed: {e}"),
        }
    }

    info!(decoded, vertices, rejected, "decode pass finished");
    dispatcher.dispose();
    Ok(())
}

/// The eight corners of a tile's box as `f32` positions.
fn tile_positions(grid_tile: &GridTile) -> Vec<[f32; 3]> {
    grid_tile
        .tile
        .bounding_volume()
        .obb
        .map(|obb| {
            obb.corners()
                .iter()
                .map(|c| [c.x as f32, c.y as f32, c.z as f32])
                .collect()
        })
        .unwrap_or_default()
}
