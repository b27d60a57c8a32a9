//! Tour Track Render - Background Geometry Pipeline for Map Track Overlay
//!
//! This library turns a sequence of raw GPS points into GPU-ready line
//! geometry for overlay on a slippy map, while keeping the interactive
//! render loop non-blocking. Projection, dateline wraparound, rectangle
//! clipping and decimation all happen on a dedicated background thread; the
//! render thread polls, adopts finished buckets and keeps drawing the
//! previous frame's geometry while a recompute is in flight.
//!
//! # Architecture
//!
//! - **[`LineClipper`]**: rectangle clipping against the fixed visible pixel
//!   window
//! - **[`GeometryWorker`]**: background projection, clipping, segmentation
//!   and decimation into pixel-space line strips plus arrow markers
//! - **[`TrackBucket`]** / **[`BucketManager`]**: double-buffered geometry
//!   hand-off between worker and render thread
//! - **[`TrackLayerRenderer`]**: per-frame orchestration and the MVP
//!   transform that keeps compiled geometry attached to the moving map
//!
//! # Concurrency model
//!
//! Two roles only: the host's render thread and exactly one background
//! worker. The render thread never waits; submissions are debounced and a
//! newer submission cancels the in-flight pass, so adopted geometry is
//! always computed from the most recent inputs.

mod bucket;
mod clip;
mod positions;
pub mod projection;
mod renderer;
mod style;
mod worker;

// Public API exports
pub use bucket::{
    ArrowVertex, BucketKind, BucketManager, CompiledBuffers, LineVertex, StripPoint, TrackBucket,
};
pub use clip::{ClipCode, LineClipper, MAX_VISIBLE_PIXEL};
pub use positions::TourPositions;
pub use projection::MapPosition;
pub use renderer::{DrawCommand, TrackLayerRenderer, Viewport};
pub use style::{LineCap, LineColorMode, LineStyle, TrackConfig, pack_argb};
pub use worker::{CompletedRun, GeometryWorker, RenderTask, compute_track_bucket};

/// Error types for the render pipeline
#[derive(Debug, thiserror::Error)]
pub enum TrackRenderError {
    #[error("color array length {colors} does not match point count {points}")]
    MismatchedColors { points: usize, colors: usize },

    #[error("invalid tour start indices: {0}")]
    InvalidTourStarts(String),

    #[error("geometry worker is shut down")]
    WorkerShutdown,

    #[error("failed to spawn geometry worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrackRenderError>;
