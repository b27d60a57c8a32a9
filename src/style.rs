//! Line style and track rendering configuration
//!
//! Configuration is owned by the host application and read once per worker
//! run, at bucket-build time; a running computation never sees a config
//! change.

/// How line color is applied along the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineColorMode {
    /// One color for the whole track, taken from [`LineStyle::color`]
    #[default]
    Solid,
    /// Per-vertex gradient from the color array
    Gradient,
}

/// Stroke cap at line ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineCap {
    Butt,
    Square,
    #[default]
    Round,
}

/// Resolved paint parameters carried by a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineStyle {
    /// Packed ARGB line color (used in solid mode)
    pub color: u32,
    /// Stroke width in pixels
    pub stroke_width: f32,
    pub cap: LineCap,
    /// Height above the ground plane, the z axis in the shader
    pub height_offset: f32,
    /// Keep the stroke width constant across zoom levels. Without this the
    /// line width jumps when the zoom level changes.
    pub fixed_width: bool,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            color: pack_argb(0x0000FF, 0xC0),
            stroke_width: 4.0,
            cap: LineCap::Round,
            height_offset: 0.0,
            fixed_width: true,
        }
    }
}

/// Track rendering configuration, owned by the host application
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackConfig {
    pub line_color_mode: LineColorMode,
    /// Packed RGB line color, alpha applied from `line_opacity`
    pub line_color: u32,
    /// 0…255
    pub line_opacity: u8,
    /// Stroke width in pixels
    pub line_width: f32,
    pub cap: LineCap,

    pub is_vertical_offset: bool,
    /// Height above the ground plane when `is_vertical_offset` is set
    pub vertical_offset: f32,

    pub is_show_direction_arrows: bool,
    /// Minimum pixel spacing between two direction arrows
    pub arrow_min_distance: f32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            line_color_mode: LineColorMode::Solid,
            line_color: 0x0000FF,
            line_opacity: 0xC0,
            line_width: 4.0,
            cap: LineCap::Round,
            is_vertical_offset: false,
            vertical_offset: 0.0,
            is_show_direction_arrows: true,
            arrow_min_distance: 30.0,
        }
    }
}

impl TrackConfig {
    /// Resolve the paint parameters a bucket is compiled with
    pub fn line_style(&self) -> LineStyle {
        LineStyle {
            color: pack_argb(self.line_color, self.line_opacity),
            stroke_width: self.line_width,
            cap: self.cap,
            height_offset: if self.is_vertical_offset {
                self.vertical_offset
            } else {
                0.0
            },
            fixed_width: true,
        }
    }
}

/// Combine a packed RGB color with an alpha value into packed ARGB
#[inline]
pub fn pack_argb(rgb: u32, alpha: u8) -> u32 {
    ((alpha as u32) << 24) | (rgb & 0x00FF_FFFF)
}
