use serde::{Deserialize, Serialize};

/// Fill color applied to points when none is given.
pub const DEFAULT_POINT_FILL: &str = "#ff0000";
/// Stroke color applied to lines, segments and circles when none is given.
pub const DEFAULT_STROKE_COLOR: &str = "#0000ff";
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;
pub const DEFAULT_POINT_SIZE: f64 = 2.0;
pub const DEFAULT_DASH: u32 = 0;

/// Rendering attributes of one object. `None` means "use the documented
/// default"; only `visible` has no unset state because omitted visibility
/// always means visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<u32>,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_offset: Option<[i64; 2]>,
}

impl Default for Attrs {
    fn default() -> Self {
        Self {
            name: None,
            size: None,
            fill_color: None,
            stroke_color: None,
            stroke_width: None,
            dash: None,
            visible: true,
            label_offset: None,
        }
    }
}

impl Attrs {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_stroke_color(mut self, color: impl Into<String>) -> Self {
        self.stroke_color = Some(color.into());
        self
    }

    pub fn size(&self) -> f64 {
        self.size.unwrap_or(DEFAULT_POINT_SIZE)
    }

    pub fn fill_color(&self) -> &str {
        self.fill_color.as_deref().unwrap_or(DEFAULT_POINT_FILL)
    }

    pub fn stroke_color(&self) -> &str {
        self.stroke_color.as_deref().unwrap_or(DEFAULT_STROKE_COLOR)
    }

    pub fn stroke_width(&self) -> f64 {
        self.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH)
    }

    pub fn dash(&self) -> u32 {
        self.dash.unwrap_or(DEFAULT_DASH)
    }
}
