//! Tour position input model
//!
//! The host view hands the render pipeline three parallel structures: the
//! concatenated geo points of every selected tour, one packed color per
//! point, and the indices where each individual tour begins. The arrays are
//! replaced wholesale on every selection change; the worker only ever reads
//! them.

use crate::{Result, TrackRenderError};
use geo::Point;
use std::sync::Arc;

/// Immutable-once-published tour input: geo points, per-point colors and
/// tour-start indices.
#[derive(Debug, Clone, Default)]
pub struct TourPositions {
    points: Vec<Point<f64>>,
    colors: Vec<u32>,
    tour_starts: Vec<usize>,
}

impl TourPositions {
    /// Build and validate a new input set.
    ///
    /// # Errors
    /// - [`TrackRenderError::MismatchedColors`] when the color array is not
    ///   parallel to the point array
    /// - [`TrackRenderError::InvalidTourStarts`] when the start list is not
    ///   strictly increasing, does not begin at 0, or points past the data
    pub fn new(points: Vec<Point<f64>>, colors: Vec<u32>, tour_starts: Vec<usize>) -> Result<Arc<Self>> {
        if colors.len() != points.len() {
            return Err(TrackRenderError::MismatchedColors {
                points: points.len(),
                colors: colors.len(),
            });
        }

        if let Some(&first) = tour_starts.first() {
            if first != 0 {
                return Err(TrackRenderError::InvalidTourStarts(format!(
                    "first tour start is {first}, expected 0"
                )));
            }
        }

        for pair in tour_starts.windows(2) {
            if pair[1] <= pair[0] {
                return Err(TrackRenderError::InvalidTourStarts(format!(
                    "tour starts not strictly increasing: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }

        if let Some(&last) = tour_starts.last() {
            if last >= points.len() && !points.is_empty() {
                return Err(TrackRenderError::InvalidTourStarts(format!(
                    "tour start {last} is past the last point index {}",
                    points.len() - 1
                )));
            }
        }

        Ok(Arc::new(Self {
            points,
            colors,
            tour_starts,
        }))
    }

    /// The "nothing selected" input: clears the track from the map
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Build tour positions from parsed GPX data, one logical tour per track
    /// segment, with a solid color applied to every point.
    pub fn from_gpx(gpx: &gpx::Gpx, color: u32) -> Arc<Self> {
        let mut points = Vec::new();
        let mut tour_starts = Vec::new();

        for track in &gpx.tracks {
            for segment in &track.segments {
                if segment.points.is_empty() {
                    continue;
                }

                tour_starts.push(points.len());

                for waypoint in &segment.points {
                    points.push(waypoint.point());
                }
            }
        }

        let colors = vec![color; points.len()];

        Arc::new(Self {
            points,
            colors,
            tour_starts,
        })
    }

    #[inline]
    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    #[inline]
    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    /// Strictly increasing indices where each individual tour begins.
    /// Empty means a single tour.
    #[inline]
    pub fn tour_starts(&self) -> &[usize] {
        &self.tour_starts
    }

    /// Start index of the tour after `tour_index`, if any
    #[inline]
    pub(crate) fn next_tour_start(&self, tour_index: usize) -> Option<usize> {
        self.tour_starts.get(tour_index + 1).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
