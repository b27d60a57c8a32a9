//! Render buckets and the double-buffered bucket manager
//!
//! A [`TrackBucket`] accumulates the pixel-space line strips produced by one
//! worker run, then compiles them into GPU-ready byte buffers. The
//! [`BucketManager`] owns the two bucket slots of the double buffer: the
//! "painting" bucket consumed by the render thread and the "worker" bucket
//! owned by the background computation until it completes.

use crate::style::{LineColorMode, LineStyle};
use bytemuck::{Pod, Zeroable};

/// Length of a direction arrow in pixels
const ARROW_LENGTH: f32 = 18.0;

/// Half-width of a direction arrow base in pixels
const ARROW_WING: f32 = 7.0;

/// Geometry kind carried by a bucket. This subsystem only ever produces line
/// geometry, so a single tag is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketKind {
    #[default]
    Line,
}

/// One accumulated strip point: screen pixel position plus packed ARGB color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripPoint {
    pub x: f32,
    pub y: f32,
    pub color: u32,
}

/// Vertex layout of the compiled line buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 2],
    /// Packed ARGB, unpacked in the shader
    pub color: u32,
}

/// Vertex layout of the compiled direction-arrow buffer.
///
/// Barycentric coordinates are (1,0,0), (0,1,0) and (0,0,1) for the three
/// triangle vertices, which lets the shader shade arrow edges without an
/// extra attribute stream.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ArrowVertex {
    pub position: [f32; 3],
    pub barycentric: [f32; 3],
}

/// GPU-ready buffers compiled from one bucket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledBuffers {
    /// [`LineVertex`] array as raw bytes
    pub vertex_bytes: Vec<u8>,
    /// `u32` line-list indices as raw bytes, two per drawn segment
    pub index_bytes: Vec<u8>,
    /// [`ArrowVertex`] array as raw bytes
    pub arrow_bytes: Vec<u8>,

    pub num_vertices: u32,
    pub num_indices: u32,
    pub num_arrow_vertices: u32,
}

impl CompiledBuffers {
    #[inline]
    pub fn has_data(&self) -> bool {
        self.num_indices > 0 || self.num_arrow_vertices > 0
    }
}

/// CPU-side geometry accumulation for one worker run.
///
/// Born inside a worker run, promoted to "painting" exactly once, and
/// dropped when superseded by the next completed bucket.
#[derive(Debug, Clone, Default)]
pub struct TrackBucket {
    pub kind: BucketKind,

    pub line_style: LineStyle,
    pub line_color_mode: LineColorMode,

    /// Strip points, all strips back to back
    points: Vec<StripPoint>,
    /// Number of points of each strip, in emission order
    strip_lens: Vec<u32>,

    arrow_vertices: Vec<ArrowVertex>,

    compiled: Option<CompiledBuffers>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackBucket {
    /// Append one line strip. Strips with fewer than two points carry no
    /// drawable segment and are dropped.
    pub fn add_line(&mut self, strip: &[StripPoint]) {
        if strip.len() < 2 {
            return;
        }

        self.points.extend_from_slice(strip);
        self.strip_lens.push(strip.len() as u32);
    }

    /// Build oriented arrow triangles from the decimated arrow pixel list.
    ///
    /// Each arrow sits at a list point and points toward its successor.
    pub fn create_direction_arrow_vertices(&mut self, arrow_pixels: &[[f32; 2]]) {
        self.arrow_vertices.clear();

        let height = self.line_style.height_offset;

        for pair in arrow_pixels.windows(2) {
            let [ax, ay] = pair[0];
            let [bx, by] = pair[1];

            let dx = bx - ax;
            let dy = by - ay;
            let len = (dx * dx + dy * dy).sqrt();
            if len < f32::EPSILON {
                continue;
            }

            let ux = dx / len;
            let uy = dy / len;

            // perpendicular for the arrow base
            let px = -uy;
            let py = ux;

            self.arrow_vertices.push(ArrowVertex {
                position: [ax + ux * ARROW_LENGTH, ay + uy * ARROW_LENGTH, height],
                barycentric: [1.0, 0.0, 0.0],
            });
            self.arrow_vertices.push(ArrowVertex {
                position: [ax + px * ARROW_WING, ay + py * ARROW_WING, height],
                barycentric: [0.0, 1.0, 0.0],
            });
            self.arrow_vertices.push(ArrowVertex {
                position: [ax - px * ARROW_WING, ay - py * ARROW_WING, height],
                barycentric: [0.0, 0.0, 1.0],
            });
        }
    }

    /// Number of accumulated strip points
    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of accumulated strips
    #[inline]
    pub fn num_strips(&self) -> usize {
        self.strip_lens.len()
    }

    /// Strip points of strip `index`, for inspection
    pub fn strip(&self, index: usize) -> Option<&[StripPoint]> {
        let len = *self.strip_lens.get(index)? as usize;
        let start: usize = self.strip_lens[..index].iter().map(|&l| l as usize).sum();
        self.points.get(start..start + len)
    }

    /// Compiled buffers, available after [`compile`](Self::compile)
    #[inline]
    pub fn compiled(&self) -> Option<&CompiledBuffers> {
        self.compiled.as_ref()
    }

    /// Compile the accumulated CPU-side lists into GPU-ready byte buffers.
    /// Returns whether any drawable data exists.
    pub fn compile(&mut self) -> bool {
        if self.compiled.is_none() {
            let mut vertices: Vec<LineVertex> = Vec::with_capacity(self.points.len());
            let mut indices: Vec<u32> = Vec::new();

            let mut base: u32 = 0;
            for &strip_len in &self.strip_lens {
                for i in 0..strip_len {
                    let point = &self.points[(base + i) as usize];
                    vertices.push(LineVertex {
                        position: [point.x, point.y],
                        color: point.color,
                    });

                    if i + 1 < strip_len {
                        indices.push(base + i);
                        indices.push(base + i + 1);
                    }
                }
                base += strip_len;
            }

            self.compiled = Some(CompiledBuffers {
                vertex_bytes: bytemuck::cast_slice(&vertices).to_vec(),
                index_bytes: bytemuck::cast_slice(&indices).to_vec(),
                arrow_bytes: bytemuck::cast_slice(&self.arrow_vertices).to_vec(),
                num_vertices: vertices.len() as u32,
                num_indices: indices.len() as u32,
                num_arrow_vertices: self.arrow_vertices.len() as u32,
            });
        }

        self.compiled.as_ref().is_some_and(CompiledBuffers::has_data)
    }

    /// Drop all CPU and GPU data, keeping allocations for reuse
    pub fn clear(&mut self) {
        self.points.clear();
        self.strip_lens.clear();
        self.arrow_vertices.clear();
        self.compiled = None;
    }
}

/// Owner of the two bucket slots of the double buffer.
///
/// Each worker task carries its own manager; the renderer holds a separate
/// one for the painting side. A bucket moves worker slot -> painter slot on
/// completion and crosses to the renderer's manager on adoption.
#[derive(Debug, Default)]
pub struct BucketManager {
    painter: Option<TrackBucket>,
    worker: Option<TrackBucket>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl BucketManager {
    /// The worker-side bucket, created lazily for the current run
    pub fn bucket_for_worker(&mut self) -> &mut TrackBucket {
        self.worker.get_or_insert_with(TrackBucket::default)
    }

    /// Move the completed worker bucket into the painter slot
    pub fn promote_worker_bucket(&mut self) {
        if let Some(bucket) = self.worker.take() {
            self.painter = Some(bucket);
        }
    }

    /// The bucket currently published for painting
    #[inline]
    pub fn painter(&self) -> Option<&TrackBucket> {
        self.painter.as_ref()
    }

    #[inline]
    pub fn painter_mut(&mut self) -> Option<&mut TrackBucket> {
        self.painter.as_mut()
    }

    /// Take the painter bucket out, transferring ownership to the caller
    pub fn take_painter(&mut self) -> Option<TrackBucket> {
        self.painter.take()
    }

    /// Adopt a new painting bucket. The previous bucket's buffers are
    /// released only after the replacement is in place.
    pub fn set_painter(&mut self, bucket: Option<TrackBucket>) {
        let superseded = std::mem::replace(&mut self.painter, bucket);
        if superseded.is_some() {
            tracing::debug!("released superseded painting bucket");
        }
    }

    /// Dispose both slots, CPU and GPU data
    pub fn clear(&mut self) {
        self.painter = None;
        self.worker = None;
    }

    /// Compile the painting bucket into GPU buffers. Returns whether any
    /// drawable data exists, so the caller can skip the draw entirely.
    pub fn fill_gl_buffer_data(&mut self) -> bool {
        match self.painter.as_mut() {
            Some(bucket) => bucket.compile(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(points: &[(f32, f32)]) -> Vec<StripPoint> {
        points
            .iter()
            .map(|&(x, y)| StripPoint {
                x,
                y,
                color: 0xFF0000FF,
            })
            .collect()
    }

    #[test]
    fn test_short_strips_are_dropped() {
        let mut bucket = TrackBucket::default();
        bucket.add_line(&strip(&[(0.0, 0.0)]));
        bucket.add_line(&[]);

        assert_eq!(bucket.num_strips(), 0);
        assert!(!bucket.compile());
    }

    #[test]
    fn test_add_line_and_compile() {
        let mut bucket = TrackBucket::default();
        bucket.add_line(&strip(&[(0.0, 0.0), (10.0, 0.0), (20.0, 5.0)]));
        bucket.add_line(&strip(&[(100.0, 100.0), (110.0, 100.0)]));

        assert!(bucket.compile());

        let compiled = bucket.compiled().unwrap();
        assert_eq!(compiled.num_vertices, 5);
        // 2 segments in the first strip, 1 in the second
        assert_eq!(compiled.num_indices, 6);
        assert_eq!(
            compiled.vertex_bytes.len(),
            5 * std::mem::size_of::<LineVertex>()
        );

        // no index joins the two strips
        let indices: &[u32] = bytemuck::cast_slice(&compiled.index_bytes);
        assert!(!indices.chunks(2).any(|pair| pair == [2u32, 3u32].as_slice()));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let mut bucket = TrackBucket::default();
        bucket.add_line(&strip(&[(0.0, 0.0), (10.0, 0.0)]));

        bucket.compile();
        let first = bucket.compiled().unwrap().clone();
        bucket.compile();
        assert_eq!(bucket.compiled().unwrap(), &first);
    }

    #[test]
    fn test_direction_arrows() {
        let mut bucket = TrackBucket::default();
        bucket.create_direction_arrow_vertices(&[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0]]);

        // one triangle per consecutive pair
        assert_eq!(bucket.arrow_vertices.len(), 6);

        // first arrow points along +x
        assert_eq!(bucket.arrow_vertices[0].position[0], ARROW_LENGTH);
        assert_eq!(bucket.arrow_vertices[0].position[1], 0.0);

        bucket.compile();
        let compiled = bucket.compiled().unwrap();
        assert_eq!(compiled.num_arrow_vertices, 6);
        assert!(compiled.has_data());
    }

    #[test]
    fn test_coincident_arrow_points_skipped() {
        let mut bucket = TrackBucket::default();
        bucket.create_direction_arrow_vertices(&[[5.0, 5.0], [5.0, 5.0]]);
        assert!(bucket.arrow_vertices.is_empty());
    }

    #[test]
    fn test_clear_resets_compiled_state() {
        let mut bucket = TrackBucket::default();
        bucket.add_line(&strip(&[(0.0, 0.0), (10.0, 0.0)]));
        assert!(bucket.compile());

        bucket.clear();
        assert_eq!(bucket.num_points(), 0);
        assert!(bucket.compiled().is_none());
        assert!(!bucket.compile());
    }

    #[test]
    fn test_strip_accessor() {
        let mut bucket = TrackBucket::default();
        bucket.add_line(&strip(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]));
        bucket.add_line(&strip(&[(50.0, 0.0), (60.0, 0.0)]));

        assert_eq!(bucket.strip(0).unwrap().len(), 3);
        assert_eq!(bucket.strip(1).unwrap().len(), 2);
        assert_eq!(bucket.strip(1).unwrap()[0].x, 50.0);
        assert!(bucket.strip(2).is_none());
    }

    #[test]
    fn test_manager_promote_and_adopt() {
        let mut worker_side = BucketManager::default();

        {
            let bucket = worker_side.bucket_for_worker();
            bucket.add_line(&strip(&[(0.0, 0.0), (10.0, 0.0)]));
        }
        worker_side.promote_worker_bucket();
        assert!(worker_side.painter().is_some());

        // renderer adopts
        let mut painting_side = BucketManager::default();
        painting_side.set_painter(worker_side.take_painter());
        assert!(worker_side.painter().is_none());
        assert!(painting_side.fill_gl_buffer_data());
    }

    #[test]
    fn test_manager_empty_has_no_data() {
        let mut manager = BucketManager::default();
        assert!(!manager.fill_gl_buffer_data());

        manager.set_painter(None);
        assert!(!manager.fill_gl_buffer_data());
    }

    #[test]
    fn test_manager_clear() {
        let mut manager = BucketManager::default();
        manager
            .bucket_for_worker()
            .add_line(&strip(&[(0.0, 0.0), (10.0, 0.0)]));
        manager.promote_worker_bucket();

        manager.clear();
        assert!(manager.painter().is_none());
        assert!(!manager.fill_gl_buffer_data());
    }
}
