//! Per-frame layer orchestration
//!
//! [`TrackLayerRenderer`] is driven once per frame by the host map engine:
//! [`update`](TrackLayerRenderer::update) detects viewport movement,
//! (re)submits the background worker, polls for completion and adopts the
//! finished bucket; [`render`](TrackLayerRenderer::render) hands the compiled
//! buffers plus an MVP transform to the external draw layer.
//!
//! The transform is built relative to the map position the bucket was
//! compiled for, so the track stays attached to the map under small pans
//! without a geometry recompute.

use crate::Result;
use crate::bucket::{BucketManager, CompiledBuffers};
use crate::positions::TourPositions;
use crate::projection::{MapPosition, TILE_SIZE};
use crate::style::{LineColorMode, LineStyle, TrackConfig};
use crate::worker::GeometryWorker;

use geo::Point;
use glam::{Mat4, Vec3};
use std::sync::Arc;

/// Per-frame viewport input from the host map engine
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub position: MapPosition,
    /// View-projection matrix of the host camera
    pub view_proj: Mat4,
}

/// Everything the external shader layer needs for one draw
#[derive(Debug)]
pub struct DrawCommand<'a> {
    pub buffers: &'a CompiledBuffers,
    pub line_style: LineStyle,
    pub line_color_mode: LineColorMode,
    /// Model-view-projection transform for the compiled geometry
    pub mvp: Mat4,
    /// Viewport scale relative to the compile-time map scale, 1…2 between
    /// zoom levels
    pub scale_ratio: f32,
}

/// Consumer and orchestrator of the track geometry pipeline
pub struct TrackLayerRenderer {
    enabled: bool,
    config: TrackConfig,

    worker: GeometryWorker,

    /// Painting-side bucket slots
    buckets: BucketManager,

    /// Map position the painting bucket was compiled for
    map_position: MapPosition,

    /// Wrap the render transform around the dateline
    flip_on_dateline: bool,

    /// Tile coordinates of the last submission, to detect map movement of at
    /// least one tile
    old_x: i64,
    old_y: i64,
    old_zoom_scale: i64,

    /// Geometry was invalidated (new positions or vertex-affecting config)
    update_layer: bool,

    /// The painting bucket compiled with drawable data
    ready: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackLayerRenderer {
    pub fn new(config: TrackConfig) -> Result<Self> {
        Ok(Self {
            enabled: true,
            config,
            worker: GeometryWorker::new()?,
            buckets: BucketManager::default(),
            map_position: MapPosition::default(),
            flip_on_dateline: true,
            old_x: -1,
            old_y: -1,
            old_zoom_scale: -1,
            update_layer: false,
            ready: false,
        })
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    /// Whether a painting bucket with drawable data exists
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Replace the displayed tours. Validates the arrays, hands them to the
    /// worker and marks the geometry dirty; returns immediately.
    pub fn setup_tour_positions(
        &mut self,
        points: Vec<Point<f64>>,
        colors: Vec<u32>,
        tour_starts: Vec<usize>,
    ) -> Result<()> {
        let positions = TourPositions::new(points, colors, tour_starts)?;
        self.set_positions(positions);
        Ok(())
    }

    /// Replace the displayed tours with a pre-built input set
    pub fn set_positions(&mut self, positions: Arc<TourPositions>) {
        tracing::debug!(points = positions.len(), "tour positions replaced");

        self.worker.set_positions(positions);
        self.update_layer = true;
    }

    /// Apply a configuration change. A pure restyle (color, width) updates
    /// the painting bucket in place; a vertex-affecting change (arrow
    /// spacing, arrows on/off) schedules a recompute.
    pub fn on_modify_config(&mut self, config: TrackConfig, vertices_modified: bool) {
        self.config = config;

        if vertices_modified {
            self.update_layer = true;
        } else if let Some(bucket) = self.buckets.painter_mut() {
            bucket.line_style = config.line_style();
            bucket.line_color_mode = config.line_color_mode;
        }
    }

    /// Per-frame driver: submit on movement or invalidation, poll the
    /// worker, adopt a finished bucket. Never blocks.
    pub fn update(&mut self, viewport: &Viewport) {
        if !self.enabled {
            return;
        }

        #[cfg(feature = "profiling")]
        profiling::scope!("renderer::update");

        let zoom_scale = 1i64 << viewport.position.zoom_level;
        let current_x = (viewport.position.x * zoom_scale as f64) as i64;
        let current_y = (viewport.position.y * zoom_scale as f64) as i64;

        // recompute when the map moved by at least one tile or the geometry
        // was invalidated
        if current_x != self.old_x
            || current_y != self.old_y
            || zoom_scale != self.old_zoom_scale
            || self.update_layer
        {
            if self.update_layer {
                self.worker.cancel();
            }
            self.update_layer = false;

            if let Err(error) = self.worker.submit(viewport.position, self.config) {
                tracing::warn!(%error, "geometry submission failed");
            }

            self.old_x = current_x;
            self.old_y = current_y;
            self.old_zoom_scale = zoom_scale;
        }

        let Some(completed) = self.worker.poll() else {
            // not finished yet; keep drawing the previous bucket
            return;
        };

        // keep the position the new bucket was compiled for
        self.map_position = completed.map_position;

        self.buckets.set_painter(completed.bucket);
        self.ready = self.buckets.fill_gl_buffer_data();
    }

    /// Produce the draw for the current frame, or `None` when there is
    /// nothing to draw.
    pub fn render(&self, viewport: &Viewport) -> Option<DrawCommand<'_>> {
        if !self.enabled || !self.ready {
            return None;
        }

        let bucket = self.buckets.painter()?;
        let buffers = bucket.compiled()?;
        if !buffers.has_data() {
            return None;
        }

        Some(DrawCommand {
            buffers,
            line_style: bucket.line_style,
            line_color_mode: bucket.line_color_mode,
            mvp: self.build_matrix(viewport),
            scale_ratio: (viewport.position.scale / self.map_position.scale) as f32,
        })
    }

    /// MVP transform relative to the difference between the current map
    /// position and the position the bucket was compiled for.
    fn build_matrix(&self, viewport: &Viewport) -> Mat4 {
        let tile_scale = TILE_SIZE as f64 * viewport.position.scale;

        let mut x = self.map_position.x - viewport.position.x;
        let y = self.map_position.y - viewport.position.y;

        if self.flip_on_dateline {
            // fold the translation back into the visible ±0.5 range so the
            // geometry reappears on the near side of the seam
            while x < -0.5 {
                x += 1.0;
            }
            while x > 0.5 {
                x -= 1.0;
            }
        }

        let scale = (viewport.position.scale / self.map_position.scale) as f32;

        viewport.view_proj
            * Mat4::from_translation(Vec3::new(
                (x * tile_scale) as f32,
                (y * tile_scale) as f32,
                0.0,
            ))
            * Mat4::from_scale(Vec3::new(scale, scale, 1.0))
    }
}
