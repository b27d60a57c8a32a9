//! Background geometry worker
//!
//! A single dedicated thread turns the current tour positions plus the latest
//! viewport snapshot into pixel-space line strips and direction-arrow
//! markers, written into a task-local bucket. The render thread never waits:
//! it submits, polls, and keeps drawing the previous bucket until a new one
//! is ready.
//!
//! At most one computation is in flight. A newer submission (or a wholesale
//! input replacement) bumps a generation counter; the running pass notices at
//! its next strip boundary and abandons the partial bucket, so a stale result
//! is never published.

use crate::bucket::{BucketManager, StripPoint, TrackBucket};
use crate::clip::{ClipCode, LineClipper};
use crate::positions::TourPositions;
use crate::projection::{self, MapPosition, TILE_SIZE};
use crate::style::TrackConfig;
use crate::{Result, TrackRenderError};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// A point is appended to a strip only when it moved at least this many
/// pixels from the last kept point in either axis
const MIN_DIST: f32 = 3.0;

/// Debounce window that coalesces rapid successive submissions into one
/// computation
const DEBOUNCE: Duration = Duration::from_millis(50);

/// How often the inner loop re-checks for cancellation, in points
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// One double-buffer slot: a bucket manager plus the map position its
/// geometry was computed for. Exactly two instances exist per worker; they
/// cycle between the worker thread and the poll slot by value.
#[derive(Debug, Default)]
pub struct RenderTask {
    pub buckets: BucketManager,
    pub map_position: MapPosition,
}

/// Result of a completed worker run, handed out by [`GeometryWorker::poll`]
#[derive(Debug)]
pub struct CompletedRun {
    /// The freshly computed bucket; `None` when the input was empty and the
    /// track should be cleared from the map
    pub bucket: Option<TrackBucket>,
    /// Map position the bucket geometry is relative to
    pub map_position: MapPosition,
}

#[derive(Debug, Clone, Copy)]
struct Submission {
    generation: u64,
    viewport: MapPosition,
    config: TrackConfig,
}

struct WorkerShared {
    /// Current input; the lock is held only for the reference swap
    input: Mutex<Arc<TourPositions>>,
    /// Set when `input` was replaced and the projection cache is stale
    input_dirty: AtomicBool,
    /// Latest submitted generation; a running pass is cancelled as soon as
    /// its own generation falls behind
    generation: AtomicU64,
    /// Completed task waiting to be polled by the render thread
    finished: Mutex<Option<RenderTask>>,
    /// Free tasks of the arena of two
    recycled: Mutex<Vec<RenderTask>>,
}

/// Handle to the background geometry thread.
///
/// Dropping the handle cancels any in-flight pass and joins the thread.
pub struct GeometryWorker {
    shared: Arc<WorkerShared>,
    submit_tx: Option<Sender<Submission>>,
    thread: Option<JoinHandle<()>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryWorker {
    /// Spawn the worker thread.
    pub fn new() -> Result<Self> {
        let (submit_tx, submit_rx) = crossbeam_channel::unbounded();

        let shared = Arc::new(WorkerShared {
            input: Mutex::new(TourPositions::empty()),
            input_dirty: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            finished: Mutex::new(None),
            recycled: Mutex::new(vec![RenderTask::default(), RenderTask::default()]),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("tour-track-geometry".into())
            .spawn(move || worker_loop(thread_shared, submit_rx))?;

        Ok(Self {
            shared,
            submit_tx: Some(submit_tx),
            thread: Some(thread),
        })
    }

    /// Replace the tour input wholesale. Cancels any in-flight pass; the next
    /// submission computes against the new arrays.
    pub fn set_positions(&self, positions: Arc<TourPositions>) {
        {
            let mut input = self.shared.input.lock().unwrap();
            *input = positions;
        }

        self.cancel();
        self.shared.input_dirty.store(true, Ordering::SeqCst);
    }

    /// Invalidate any in-flight pass without submitting a new one
    pub fn cancel(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Queue a computation against the given viewport snapshot. Returns
    /// immediately; rapid successive submissions are debounced and coalesced
    /// on the worker side.
    pub fn submit(&self, viewport: MapPosition, config: TrackConfig) -> Result<()> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let submission = Submission {
            generation,
            viewport,
            config,
        };

        self.submit_tx
            .as_ref()
            .and_then(|tx| tx.send(submission).ok())
            .ok_or(TrackRenderError::WorkerShutdown)
    }

    /// Non-blocking check for a completed run. The returned task slot is
    /// recycled into the arena immediately.
    pub fn poll(&self) -> Option<CompletedRun> {
        let mut task = self.shared.finished.lock().unwrap().take()?;

        let bucket = task.buckets.take_painter();
        let map_position = task.map_position;

        self.shared.recycled.lock().unwrap().push(task);

        Some(CompletedRun {
            bucket,
            map_position,
        })
    }
}

impl Drop for GeometryWorker {
    fn drop(&mut self) {
        // cancel the in-flight pass and disconnect the channel so the
        // worker loop exits
        self.cancel();
        self.submit_tx.take();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// One synchronous geometry pass, without worker thread or cancellation.
///
/// This is the same computation the background worker runs; hosts that want
/// a blocking recompute (and benchmarks) can call it directly.
pub fn compute_track_bucket(
    positions: &TourPositions,
    viewport: MapPosition,
    config: &TrackConfig,
) -> (Option<TrackBucket>, MapPosition) {
    let generation = AtomicU64::new(0);
    let submission = Submission {
        generation: 0,
        viewport,
        config: *config,
    };

    let mut task = RenderTask::default();
    let mut scratch = Scratch::default();

    if positions.is_empty() {
        return (None, viewport.with_integer_scale());
    }

    let projected = project_points(positions);
    compute_geometry(
        positions,
        &projected,
        &submission,
        &generation,
        &mut task,
        &mut scratch,
    );

    (task.buckets.take_painter(), task.map_position)
}

/// Reusable per-thread buffers for the geometry pass
#[derive(Default)]
struct Scratch {
    strip: Vec<StripPoint>,
    arrows: Vec<[f32; 2]>,
    clipper: LineClipper,
}

/// Project every geo point onto the normalized Mercator plane. Done once per
/// input change and cached; the per-run pixel mapping is derived from it.
fn project_points(positions: &TourPositions) -> Vec<[f64; 2]> {
    #[cfg(feature = "profiling")]
    profiling::scope!("worker::project");

    positions.points().par_iter().map(projection::project).collect()
}

fn worker_loop(shared: Arc<WorkerShared>, submit_rx: Receiver<Submission>) {
    tracing::info!("geometry worker started");

    let mut positions: Arc<TourPositions> = TourPositions::empty();
    let mut projected: Vec<[f64; 2]> = Vec::new();
    let mut scratch = Scratch::default();

    while let Ok(first) = submit_rx.recv() {
        let mut submission = first;

        // debounce: wait out the window, keeping only the newest submission
        let started = instant::Instant::now();
        loop {
            let elapsed = started.elapsed();
            if elapsed >= DEBOUNCE {
                break;
            }
            match submit_rx.recv_timeout(DEBOUNCE - elapsed) {
                Ok(next) => submission = next,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        while let Ok(next) = submit_rx.try_recv() {
            submission = next;
        }

        // superseded before it started: a newer submission follows
        if submission.generation != shared.generation.load(Ordering::SeqCst) {
            continue;
        }

        // refresh the input snapshot; the lock covers only the reference swap
        if shared.input_dirty.swap(false, Ordering::SeqCst) {
            positions = Arc::clone(&shared.input.lock().unwrap());
            projected = project_points(&positions);
        }

        let mut task = acquire_task(&shared);

        if positions.is_empty() {
            // nothing to draw: publish a cleared bucket so the consumer
            // drops the previous geometry
            task.buckets.clear();
            task.map_position = submission.viewport.with_integer_scale();
            publish(&shared, task);
            continue;
        }

        let completed = compute_geometry(
            &positions,
            &projected,
            &submission,
            &shared.generation,
            &mut task,
            &mut scratch,
        );

        if completed {
            tracing::debug!(
                points = positions.len(),
                generation = submission.generation,
                "geometry pass complete"
            );
            publish(&shared, task);
        } else {
            tracing::debug!(generation = submission.generation, "geometry pass cancelled");
            task.buckets.clear();
            shared.recycled.lock().unwrap().push(task);
        }
    }

    tracing::info!("geometry worker stopped");
}

fn acquire_task(shared: &WorkerShared) -> RenderTask {
    if let Some(task) = shared.recycled.lock().unwrap().pop() {
        return task;
    }

    // the renderer did not poll between two completed runs: the slot in
    // `finished` is stale, reuse it
    if let Some(mut task) = shared.finished.lock().unwrap().take() {
        task.buckets.clear();
        return task;
    }

    RenderTask::default()
}

fn publish(shared: &WorkerShared, task: RenderTask) {
    let superseded = shared.finished.lock().unwrap().replace(task);

    if let Some(mut stale) = superseded {
        // completed but never adopted; its geometry is already outdated
        stale.buckets.clear();
        shared.recycled.lock().unwrap().push(stale);
    }
}

/// `true` when the difference exceeds `min_dist` pixels in either axis
#[inline]
fn abs_max_cmp(diff_x: f32, diff_y: f32, min_dist: f32) -> bool {
    diff_x.abs() > min_dist || diff_y.abs() > min_dist
}

/// The geometry pass: pixel mapping, dateline wraparound, multi-tour
/// segmentation, clipping and decimation, accumulated into the task bucket.
///
/// Returns false when the pass was cancelled by a newer generation; the
/// partial bucket must then be discarded by the caller.
fn compute_geometry(
    positions: &TourPositions,
    projected: &[[f64; 2]],
    submission: &Submission,
    latest_generation: &AtomicU64,
    task: &mut RenderTask,
    scratch: &mut Scratch,
) -> bool {
    #[cfg(feature = "profiling")]
    profiling::scope!("worker::geometry");

    let config = &submission.config;
    let num_points = positions.len();
    let colors = positions.colors();

    let is_cancelled =
        || latest_generation.load(Ordering::Relaxed) != submission.generation;

    task.map_position = submission.viewport.with_integer_scale();
    let map_position = task.map_position;

    let bucket = task.buckets.bucket_for_worker();
    bucket.clear();
    bucket.line_style = config.line_style();
    bucket.line_color_mode = config.line_color_mode;

    // map center on the unit plane and world size in pixels at this zoom
    let center_x = map_position.x;
    let center_y = map_position.y;
    let world_pixels = TILE_SIZE as f64 * map_position.scale;
    let half_world = world_pixels / 2.0;

    // wrap a pixel x around the dateline; the flip direction marks which
    // side of the seam the point landed on
    let wrap = |raw_x: f64| -> (f64, i8) {
        if raw_x > half_world {
            (raw_x - world_pixels, -1)
        } else if raw_x < -half_world {
            (raw_x + world_pixels, 1)
        } else {
            (raw_x, 0)
        }
    };

    let clipper = &mut scratch.clipper;
    let strip = &mut scratch.strip;
    let arrows = &mut scratch.arrows;
    strip.clear();
    arrows.clear();

    // first point seeds strip, clipper and arrow list
    let raw_x = (projected[0][0] - center_x) * world_pixels;
    let raw_y = (projected[0][1] - center_y) * world_pixels;
    let (wrapped_x, first_flip) = wrap(raw_x);
    let mut flip = first_flip;

    let px = wrapped_x as f32;
    let py = raw_y as f32;

    clipper.clip_start(px, py);
    strip.push(StripPoint {
        x: px,
        y: py,
        color: colors[0],
    });
    arrows.push([px, py]);

    let mut prev = (px, py);
    let mut prev_arrow = (px, py);

    let mut tour_index = 0usize;
    let mut next_tour_start = positions.next_tour_start(0).unwrap_or(usize::MAX);

    for point_index in 1..num_points {
        if point_index % CANCEL_CHECK_INTERVAL == 0 && is_cancelled() {
            return false;
        }

        let raw_x = (projected[point_index][0] - center_x) * world_pixels;
        let raw_y = (projected[point_index][1] - center_y) * world_pixels;
        let (wrapped_x, flip_direction) = wrap(raw_x);

        let px = wrapped_x as f32;
        let py = raw_y as f32;

        if flip_direction != flip {
            // crossing the dateline seam: never draw a segment spanning the
            // whole map, flush and restart on the other side
            flip = flip_direction;

            flush_strip(bucket, strip);
            if is_cancelled() {
                return false;
            }

            clipper.clip_start(px, py);
            strip.push(StripPoint {
                x: px,
                y: py,
                color: colors[point_index],
            });
            prev = (px, py);
            continue;
        }

        if point_index >= next_tour_start {
            // a new tour begins; tours are never visually joined
            flush_strip(bucket, strip);
            if is_cancelled() {
                return false;
            }

            tour_index += 1;
            next_tour_start = positions
                .next_tour_start(tour_index)
                .unwrap_or(usize::MAX);

            clipper.clip_start(px, py);
            strip.push(StripPoint {
                x: px,
                y: py,
                color: colors[point_index],
            });
            prev = (px, py);
            continue;
        }

        let clip_code = clipper.clip_next(px, py);

        if clip_code != ClipCode::Inside {
            flush_strip(bucket, strip);

            if clip_code == ClipCode::Intersection {
                // the visible sub-segment becomes its own two-point line
                let [x1, y1, x2, y2] = clipper.clipped_line();
                bucket.add_line(&[
                    StripPoint {
                        x: x1,
                        y: y1,
                        color: colors[point_index - 1],
                    },
                    StripPoint {
                        x: x2,
                        y: y2,
                        color: colors[point_index],
                    },
                ]);

                // resume from the real point, not the clipped boundary point
                prev = (px, py);
            }

            // when the segment re-entered the window, re-seed the strip with
            // the end point
            if clipper.is_prev_inside() {
                strip.push(StripPoint {
                    x: prev.0,
                    y: prev.1,
                    color: colors[point_index],
                });
            }

            continue;
        }

        // point is inside the window: decimate against the last kept point
        let diff_x = px - prev.0;
        let diff_y = py - prev.1;

        if strip.is_empty() || abs_max_cmp(diff_x, diff_y, MIN_DIST) {
            strip.push(StripPoint {
                x: px,
                y: py,
                color: colors[point_index],
            });
            prev = (px, py);
        }

        let diff_x_arrow = px - prev_arrow.0;
        let diff_y_arrow = py - prev_arrow.1;

        if abs_max_cmp(diff_x_arrow, diff_y_arrow, config.arrow_min_distance) {
            prev_arrow = (px, py);
            arrows.push([px, py]);
        }
    }

    flush_strip(bucket, strip);

    if config.is_show_direction_arrows {
        bucket.create_direction_arrow_vertices(arrows);
    }

    if is_cancelled() {
        return false;
    }

    task.buckets.promote_worker_bucket();
    true
}

/// Emit the accumulated strip (if it carries at least one segment) and reset
/// the accumulator
#[inline]
fn flush_strip(bucket: &mut TrackBucket, strip: &mut Vec<StripPoint>) {
    bucket.add_line(strip);
    strip.clear();
}
