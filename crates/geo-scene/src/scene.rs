use std::collections::BTreeMap;

use thiserror::Error;

use crate::attrs::Attrs;
use crate::object::{GeoObject, ObjectId, ObjectKind, Shape};
use crate::view::ViewConfig;

/// One input to a construction: a literal number or a reference to an
/// already constructed object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    Number(f64),
    Object(ObjectId),
}

/// The construction vocabulary accepted by [`Scene::create`]. Derived
/// constructions (`Midpoint`, `Circumcircle`) compute their geometry at
/// creation time and are stored as plain points and circles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    Point,
    Line,
    Segment,
    Circle,
    Polygon,
    Midpoint,
    Circumcircle,
}

impl CreateKind {
    pub fn keyword(self) -> &'static str {
        match self {
            CreateKind::Point => "point",
            CreateKind::Line => "line",
            CreateKind::Segment => "segment",
            CreateKind::Circle => "circle",
            CreateKind::Polygon => "polygon",
            CreateKind::Midpoint => "midpoint",
            CreateKind::Circumcircle => "circumcircle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("{kind} expects {expected}, got {got} argument(s)")]
    Arity {
        kind: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("{kind} argument {position} must be {expected}")]
    InputType {
        kind: &'static str,
        position: usize,
        expected: &'static str,
    },
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),
    #[error("object {0} is not a point")]
    NotAPoint(ObjectId),
    #[error("object {0} has no label")]
    Unlabeled(ObjectId),
    #[error("{what} must be finite")]
    NonFinite { what: &'static str },
    #[error("circle radius must be positive")]
    NonPositiveRadius,
    #[error("circumcircle points are collinear")]
    CollinearPoints,
}

/// The live collection of geometric objects. A scene is either attached to a
/// rendering surface (the visible diagram) or detached (a throwaway scratch
/// scene used to validate a candidate construction).
#[derive(Debug, Clone)]
pub struct Scene {
    objects: Vec<GeoObject>,
    index: BTreeMap<ObjectId, usize>,
    next_id: u64,
    view: Option<ViewConfig>,
}

impl Scene {
    pub fn attached(view: ViewConfig) -> Self {
        Self {
            objects: Vec::new(),
            index: BTreeMap::new(),
            next_id: 0,
            view: Some(view),
        }
    }

    pub fn detached() -> Self {
        Self {
            objects: Vec::new(),
            index: BTreeMap::new(),
            next_id: 0,
            view: None,
        }
    }

    pub fn view(&self) -> Option<&ViewConfig> {
        self.view.as_ref()
    }

    /// Objects in insertion order.
    pub fn objects(&self) -> &[GeoObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object(&self, id: ObjectId) -> Option<&GeoObject> {
        self.index.get(&id).map(|&slot| &self.objects[slot])
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut GeoObject> {
        self.index.get(&id).copied().map(|slot| &mut self.objects[slot])
    }

    /// The single construction entry point. Validates arity, input types and
    /// geometry, then stores the resulting object and hands back its id.
    pub fn create(
        &mut self,
        kind: CreateKind,
        inputs: &[Input],
        attrs: Attrs,
    ) -> Result<ObjectId, SceneError> {
        let shape = match kind {
            CreateKind::Point => {
                expect_len(kind, inputs, 2, "two coordinates")?;
                let x = number(kind, inputs, 0)?;
                let y = number(kind, inputs, 1)?;
                require_finite(x, "point x")?;
                require_finite(y, "point y")?;
                Shape::Point { x, y }
            }
            CreateKind::Line => {
                expect_len(kind, inputs, 2, "two points")?;
                let from = self.point_ref(kind, inputs, 0)?;
                let to = self.point_ref(kind, inputs, 1)?;
                Shape::Line { from, to }
            }
            CreateKind::Segment => {
                expect_len(kind, inputs, 2, "two points")?;
                let from = self.point_ref(kind, inputs, 0)?;
                let to = self.point_ref(kind, inputs, 1)?;
                Shape::Segment { from, to }
            }
            CreateKind::Circle => {
                expect_len(kind, inputs, 2, "a center and a radius or point")?;
                let center = self.point_ref(kind, inputs, 0)?;
                let radius = match inputs[1] {
                    Input::Number(radius) => {
                        require_finite(radius, "circle radius")?;
                        radius
                    }
                    Input::Object(through) => {
                        let through = self.point_position_checked(through)?;
                        let center_pos = self.point_position_checked(center)?;
                        distance(center_pos, through)
                    }
                };
                if radius <= 0.0 {
                    return Err(SceneError::NonPositiveRadius);
                }
                Shape::Circle { center, radius }
            }
            CreateKind::Polygon => {
                if inputs.len() < 3 {
                    return Err(SceneError::Arity {
                        kind: kind.keyword(),
                        expected: "at least three points",
                        got: inputs.len(),
                    });
                }
                let mut vertices = Vec::with_capacity(inputs.len());
                for position in 0..inputs.len() {
                    vertices.push(self.point_ref(kind, inputs, position)?);
                }
                Shape::Polygon { vertices }
            }
            CreateKind::Midpoint => {
                expect_len(kind, inputs, 2, "two points")?;
                let a = self.point_position_checked(self.point_ref(kind, inputs, 0)?)?;
                let b = self.point_position_checked(self.point_ref(kind, inputs, 1)?)?;
                Shape::Point {
                    x: (a[0] + b[0]) / 2.0,
                    y: (a[1] + b[1]) / 2.0,
                }
            }
            CreateKind::Circumcircle => {
                expect_len(kind, inputs, 3, "three points")?;
                let a = self.point_position_checked(self.point_ref(kind, inputs, 0)?)?;
                let b = self.point_position_checked(self.point_ref(kind, inputs, 1)?)?;
                let c = self.point_position_checked(self.point_ref(kind, inputs, 2)?)?;
                let (center, radius) = circumcircle(a, b, c)?;
                let center_id = self.insert(
                    Shape::Point {
                        x: center[0],
                        y: center[1],
                    },
                    Attrs::hidden(),
                );
                Shape::Circle {
                    center: center_id,
                    radius,
                }
            }
        };

        Ok(self.insert(shape, attrs))
    }

    fn insert(&mut self, shape: Shape, attrs: Attrs) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.index.insert(id, self.objects.len());
        self.objects.push(GeoObject {
            id,
            shape,
            attrs,
            label_pos: None,
            label_draggable: false,
        });
        id
    }

    /// Direct manipulation: reposition a point. Dependent lines, segments
    /// and circles follow automatically since they only hold references.
    pub fn move_point(&mut self, id: ObjectId, x: f64, y: f64) -> Result<(), SceneError> {
        require_finite(x, "point x")?;
        require_finite(y, "point y")?;
        let object = self.object_mut(id).ok_or(SceneError::UnknownObject(id))?;
        match &mut object.shape {
            Shape::Point { x: px, y: py } => {
                *px = x;
                *py = y;
                Ok(())
            }
            _ => Err(SceneError::NotAPoint(id)),
        }
    }

    /// Direct manipulation: record where a label was dragged to, in world
    /// coordinates.
    pub fn drag_label(&mut self, id: ObjectId, x: f64, y: f64) -> Result<(), SceneError> {
        require_finite(x, "label x")?;
        require_finite(y, "label y")?;
        let object = self.object_mut(id).ok_or(SceneError::UnknownObject(id))?;
        if object.attrs.name.is_none() {
            return Err(SceneError::Unlabeled(id));
        }
        object.label_pos = Some([x, y]);
        Ok(())
    }

    /// Direct manipulation: delete an object. References held by other
    /// objects are left dangling on purpose; consumers must tolerate them.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(slot) = self.index.remove(&id) else {
            return false;
        };
        self.objects.remove(slot);
        for (_, position) in self.index.iter_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        true
    }

    /// Marks every labeled object's label as draggable. Idempotent and
    /// geometry-preserving; re-applied after each promotion.
    pub fn enable_label_dragging(&mut self) {
        for object in &mut self.objects {
            if object.attrs.name.is_some() {
                object.label_draggable = true;
            }
        }
    }

    pub fn point_position(&self, id: ObjectId) -> Option<[f64; 2]> {
        match self.object(id)?.shape {
            Shape::Point { x, y } => Some([x, y]),
            _ => None,
        }
    }

    fn point_ref(
        &self,
        kind: CreateKind,
        inputs: &[Input],
        position: usize,
    ) -> Result<ObjectId, SceneError> {
        let Input::Object(id) = inputs[position] else {
            return Err(SceneError::InputType {
                kind: kind.keyword(),
                position: position + 1,
                expected: "a point reference",
            });
        };
        let object = self.object(id).ok_or(SceneError::UnknownObject(id))?;
        if object.kind() != ObjectKind::Point {
            return Err(SceneError::NotAPoint(id));
        }
        Ok(id)
    }

    fn point_position_checked(&self, id: ObjectId) -> Result<[f64; 2], SceneError> {
        match self.object(id) {
            Some(object) => match object.shape {
                Shape::Point { x, y } => Ok([x, y]),
                _ => Err(SceneError::NotAPoint(id)),
            },
            None => Err(SceneError::UnknownObject(id)),
        }
    }
}

fn expect_len(
    kind: CreateKind,
    inputs: &[Input],
    expected: usize,
    describe: &'static str,
) -> Result<(), SceneError> {
    if inputs.len() != expected {
        return Err(SceneError::Arity {
            kind: kind.keyword(),
            expected: describe,
            got: inputs.len(),
        });
    }
    Ok(())
}

fn number(kind: CreateKind, inputs: &[Input], position: usize) -> Result<f64, SceneError> {
    match inputs[position] {
        Input::Number(value) => Ok(value),
        Input::Object(_) => Err(SceneError::InputType {
            kind: kind.keyword(),
            position: position + 1,
            expected: "a number",
        }),
    }
}

fn require_finite(value: f64, what: &'static str) -> Result<(), SceneError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SceneError::NonFinite { what })
    }
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn circumcircle(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Result<([f64; 2], f64), SceneError> {
    let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
    if d.abs() <= 1e-9 {
        return Err(SceneError::CollinearPoints);
    }
    let a_sq = a[0] * a[0] + a[1] * a[1];
    let b_sq = b[0] * b[0] + b[1] * b[1];
    let c_sq = c[0] * c[0] + c[1] * c[1];
    let ux = (a_sq * (b[1] - c[1]) + b_sq * (c[1] - a[1]) + c_sq * (a[1] - b[1])) / d;
    let uy = (a_sq * (c[0] - b[0]) + b_sq * (a[0] - c[0]) + c_sq * (b[0] - a[0])) / d;
    let center = [ux, uy];
    Ok((center, distance(center, a)))
}
