use serde::{Deserialize, Serialize};

/// Description of the surface a visible scene is drawn into: the container
/// element, the world-coordinate viewport and the interaction affordances.
/// The bounding box is `[left, top, right, bottom]` in world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub container_id: String,
    pub bounding_box: [f64; 4],
    pub width_px: u32,
    pub height_px: u32,
    pub pan: bool,
    pub zoom: bool,
    pub show_navigation: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            container_id: "diagram".to_string(),
            bounding_box: [-8.0, 8.0, 8.0, -8.0],
            width_px: 480,
            height_px: 480,
            pan: true,
            zoom: true,
            show_navigation: true,
        }
    }
}

impl ViewConfig {
    /// Horizontal pixels per world unit. This is the scale factor used when
    /// a dragged label's world-space delta is turned back into a pixel
    /// offset, so it must come from this transform and nothing else.
    pub fn pixels_per_unit(&self) -> f64 {
        let span = self.bounding_box[2] - self.bounding_box[0];
        if span.abs() <= f64::EPSILON {
            1.0
        } else {
            f64::from(self.width_px) / span
        }
    }
}
