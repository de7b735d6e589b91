//! Synthetic tile grid and cameras.

use glam::{DMat4, DVec2, DVec3};
use meridian_config::CameraConfig;
use meridian_culling::OrientedBox;
use meridian_lod::{CameraInfo, PluginViewError, Tile, TileBoundingVolume, TilesPlugin};

/// Tiles per grid side.
pub const GRID_SIZE: usize = 16;
/// Tile edge length in meters.
pub const TILE_EXTENT: f64 = 64.0;
/// Geometric error of every grid tile in meters.
pub const TILE_GEOMETRIC_ERROR: f64 = 8.0;

/// A grid tile and its position in the grid.
pub struct GridTile {
    /// Column, row.
    pub coord: [usize; 2],
    /// The tile.
    pub tile: Tile,
}

/// A flat `GRID_SIZE` x `GRID_SIZE` grid centered on the origin. Tile
/// heights ramp up toward the far edge so the boxes are not all coplanar.
pub fn tile_grid() -> Vec<GridTile> {
    let half = TILE_EXTENT * 0.5;
    let origin = -(GRID_SIZE as f64) * half;
    let mut tiles = Vec::with_capacity(GRID_SIZE * GRID_SIZE);

    for row in 0..GRID_SIZE {
        for column in 0..GRID_SIZE {
            let height = 2.0 + row as f64;
            let center = DVec3::new(
                origin + (column as f64 + 0.5) * TILE_EXTENT,
                origin + (row as f64 + 0.5) * TILE_EXTENT,
                height * 0.5,
            );
            let half_extent = DVec3::new(half, half, height * 0.5);
            let obb = OrientedBox::from_min_max(center - half_extent, center + half_extent);
            tiles.push(GridTile {
                coord: [column, row],
                tile: Tile::new(
                    TILE_GEOMETRIC_ERROR,
                    TileBoundingVolume::from_obb_with_sphere(obb),
                    DMat4::IDENTITY,
                ),
            });
        }
    }
    tiles
}

/// A low perspective camera looking across the grid toward the horizon and a
/// top-down orthographic camera over the whole grid.
pub fn cameras(config: &CameraConfig) -> Vec<CameraInfo> {
    let resolution = DVec2::new(
        f64::from(config.viewport_width.max(1)),
        f64::from(config.viewport_height.max(1)),
    );
    let aspect = resolution.x / resolution.y;
    let fov_y = config.fov_y_degrees.to_radians();
    let grid_half = GRID_SIZE as f64 * TILE_EXTENT * 0.5;

    let ground_view = DMat4::look_at_rh(
        DVec3::new(0.0, -grid_half - 50.0, 30.0),
        DVec3::new(0.0, grid_half, 0.0),
        DVec3::Z,
    );
    let ground_projection = DMat4::perspective_rh(fov_y, aspect, 0.5, 10_000.0);

    let map_view = DMat4::look_at_rh(DVec3::new(0.0, 0.0, 500.0), DVec3::ZERO, DVec3::Y);
    let map_projection = DMat4::orthographic_rh(
        -grid_half * aspect,
        grid_half * aspect,
        -grid_half,
        grid_half,
        1.0,
        1000.0,
    );

    vec![
        CameraInfo::perspective(&ground_view, &ground_projection, fov_y, resolution),
        CameraInfo::orthographic(&map_view, &map_projection, resolution, 1.0),
    ]
}

/// Marks tiles around a point of interest as visible with a fixed error, as
/// an overlay that highlights a region would.
pub struct FocusPlugin {
    /// Point of interest.
    pub center: DVec3,
    /// Radius of the highlighted region.
    pub radius: f64,
    /// Error assigned to highlighted tiles.
    pub error: f64,
}

impl TilesPlugin for FocusPlugin {
    fn name(&self) -> &str {
        "focus"
    }

    fn calculate_tile_view_error(
        &self,
        tile: &Tile,
        _cameras: &[CameraInfo],
    ) -> Option<PluginViewError> {
        (tile.bounding_volume().distance_to_point(self.center) <= self.radius).then_some(
            PluginViewError {
                in_view: true,
                error: self.error,
            },
        )
    }
}
