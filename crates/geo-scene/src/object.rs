use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attrs::Attrs;

/// Identity of one object within its owning scene. Ids are allocated
/// monotonically and never reused, so a dangling reference stays dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Point,
    Line,
    Segment,
    Circle,
    Polygon,
}

impl ObjectKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ObjectKind::Point => "point",
            ObjectKind::Line => "line",
            ObjectKind::Segment => "segment",
            ObjectKind::Circle => "circle",
            ObjectKind::Polygon => "polygon",
        }
    }
}

/// Kind-specific geometry. Endpoint, center and vertex fields are relational
/// references into the owning scene, never ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    Point { x: f64, y: f64 },
    Line { from: ObjectId, to: ObjectId },
    Segment { from: ObjectId, to: ObjectId },
    Circle { center: ObjectId, radius: f64 },
    Polygon { vertices: Vec<ObjectId> },
}

impl Shape {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Shape::Point { .. } => ObjectKind::Point,
            Shape::Line { .. } => ObjectKind::Line,
            Shape::Segment { .. } => ObjectKind::Segment,
            Shape::Circle { .. } => ObjectKind::Circle,
            Shape::Polygon { .. } => ObjectKind::Polygon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoObject {
    pub id: ObjectId,
    #[serde(flatten)]
    pub shape: Shape,
    #[serde(flatten)]
    pub attrs: Attrs,
    /// World position of the attached label after a manual drag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_pos: Option<[f64; 2]>,
    pub label_draggable: bool,
}

impl GeoObject {
    pub fn kind(&self) -> ObjectKind {
        self.shape.kind()
    }

    pub fn label(&self) -> Option<&str> {
        self.attrs.name.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.attrs.visible
    }
}
