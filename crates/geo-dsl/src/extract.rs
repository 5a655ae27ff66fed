use std::collections::{BTreeMap, BTreeSet};

use geo_scene::{
    Attrs, CreateKind, DEFAULT_DASH, DEFAULT_POINT_FILL, DEFAULT_POINT_SIZE, DEFAULT_STROKE_COLOR,
    DEFAULT_STROKE_WIDTH, GeoObject, ObjectId, ObjectKind, Scene, Shape, ViewConfig,
};

use crate::{Arg, Program, Statement, is_ident_continue, is_ident_start};

/// Buckets are emitted in dependency order so that every reference a later
/// statement makes is already defined. Within a bucket, scene insertion
/// order is preserved.
const BUCKET_ORDER: [ObjectKind; 5] = [
    ObjectKind::Point,
    ObjectKind::Line,
    ObjectKind::Circle,
    ObjectKind::Segment,
    ObjectKind::Polygon,
];

/// Reconstructs a newline-joined statement sequence that reproduces the
/// scene's current state, including positions changed by direct
/// manipulation. Returns an empty string for an empty scene.
pub fn extract_source(scene: &Scene) -> String {
    extract_program(scene).to_source()
}

pub fn extract_program(scene: &Scene) -> Program {
    let pixels_per_unit = scene
        .view()
        .map(ViewConfig::pixels_per_unit)
        .unwrap_or_else(|| ViewConfig::default().pixels_per_unit());

    let mut processed: BTreeSet<ObjectId> = BTreeSet::new();
    let mut names: BTreeMap<ObjectId, String> = BTreeMap::new();
    let mut used_names: BTreeSet<String> = BTreeSet::new();
    let mut statements = Vec::new();

    for kind in BUCKET_ORDER {
        for object in scene.objects() {
            if object.kind() != kind || processed.contains(&object.id) {
                continue;
            }
            processed.insert(object.id);

            // Invisible and unlabeled: internal scaffolding, not part of the
            // reconstructed diagram.
            if !object.is_visible() && object.label().is_none() {
                continue;
            }

            match statement_for(object, pixels_per_unit, &names) {
                Ok(Some(mut statement)) => {
                    let name = unique_name(object, &mut used_names);
                    statement.name.clone_from(&name);
                    names.insert(object.id, name);
                    statements.push(statement);
                }
                Ok(None) => {
                    tracing::debug!(
                        object = %object.id,
                        "skipping object with unresolved references"
                    );
                }
                Err(reason) => {
                    tracing::warn!(
                        object = %object.id,
                        reason = %reason,
                        "could not extract object, continuing with the rest"
                    );
                }
            }
        }
    }

    Program { statements }
}

/// Builds the statement for one object (name left blank for the caller).
/// `Ok(None)` means a reference could not be resolved and the object is
/// dropped from the best-effort result; `Err` is a per-object extraction
/// fault that must not abort the surrounding iteration.
fn statement_for(
    object: &GeoObject,
    pixels_per_unit: f64,
    names: &BTreeMap<ObjectId, String>,
) -> Result<Option<Statement>, String> {
    let statement = match &object.shape {
        Shape::Point { x, y } => {
            require_finite(*x, "point x")?;
            require_finite(*y, "point y")?;

            let mut attrs = base_attrs(object)?;
            attrs.label_offset = label_offset(object, [*x, *y], pixels_per_unit);
            if let Some(size) = object.attrs.size
                && size != DEFAULT_POINT_SIZE
            {
                attrs.size = Some(size);
            }
            if let Some(color) = &object.attrs.fill_color
                && color != DEFAULT_POINT_FILL
            {
                attrs.fill_color = Some(representable(color)?.to_string());
            }

            Statement {
                name: String::new(),
                kind: CreateKind::Point,
                inputs: vec![Arg::Number(round2(*x)), Arg::Number(round2(*y))],
                attrs,
            }
        }
        Shape::Line { from, to } | Shape::Segment { from, to } => {
            let (Some(from), Some(to)) = (names.get(from), names.get(to)) else {
                return Ok(None);
            };

            let kind = match object.kind() {
                ObjectKind::Line => CreateKind::Line,
                _ => CreateKind::Segment,
            };
            Statement {
                name: String::new(),
                kind,
                inputs: vec![Arg::Reference(from.clone()), Arg::Reference(to.clone())],
                attrs: stroke_attrs(object)?,
            }
        }
        Shape::Circle { center, radius } => {
            let Some(center) = names.get(center) else {
                return Ok(None);
            };
            require_finite(*radius, "circle radius")?;

            Statement {
                name: String::new(),
                kind: CreateKind::Circle,
                inputs: vec![Arg::Reference(center.clone()), Arg::Number(round2(*radius))],
                attrs: stroke_attrs(object)?,
            }
        }
        Shape::Polygon { vertices } => {
            let mut inputs = Vec::with_capacity(vertices.len());
            for vertex in vertices {
                let Some(name) = names.get(vertex) else {
                    return Ok(None);
                };
                inputs.push(Arg::Reference(name.clone()));
            }

            let mut attrs = stroke_attrs(object)?;
            if let Some(color) = &object.attrs.fill_color {
                attrs.fill_color = Some(representable(color)?.to_string());
            }
            Statement {
                name: String::new(),
                kind: CreateKind::Polygon,
                inputs,
                attrs,
            }
        }
    };

    Ok(Some(statement))
}

fn base_attrs(object: &GeoObject) -> Result<Attrs, String> {
    let mut attrs = Attrs::default();
    if let Some(label) = object.label() {
        attrs.name = Some(representable(label)?.to_string());
    }
    attrs.visible = object.is_visible();
    Ok(attrs)
}

fn stroke_attrs(object: &GeoObject) -> Result<Attrs, String> {
    let mut attrs = base_attrs(object)?;
    if let Some(color) = &object.attrs.stroke_color
        && color != DEFAULT_STROKE_COLOR
    {
        attrs.stroke_color = Some(representable(color)?.to_string());
    }
    if let Some(width) = object.attrs.stroke_width
        && width != DEFAULT_STROKE_WIDTH
    {
        attrs.stroke_width = Some(width);
    }
    if let Some(dash) = object.attrs.dash
        && dash != DEFAULT_DASH
    {
        attrs.dash = Some(dash);
    }
    Ok(attrs)
}

/// Recovers a manually dragged label position as a pixel offset relative to
/// the object, using the owning view's coordinate transform. Falls back to
/// an explicitly configured offset.
fn label_offset(object: &GeoObject, anchor: [f64; 2], pixels_per_unit: f64) -> Option<[i64; 2]> {
    match object.label_pos {
        Some([label_x, label_y]) => Some([
            ((label_x - anchor[0]) * pixels_per_unit).round() as i64,
            ((label_y - anchor[1]) * pixels_per_unit).round() as i64,
        ]),
        None => object.attrs.label_offset,
    }
}

fn unique_name(object: &GeoObject, used: &mut BTreeSet<String>) -> String {
    if let Some(label) = object.label()
        && is_identifier(label)
        && !used.contains(label)
    {
        used.insert(label.to_string());
        return label.to_string();
    }

    let mut candidate = format!("obj{}", object.id);
    let mut counter = 2usize;
    while used.contains(&candidate) {
        candidate = format!("obj{}_{counter}", object.id);
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if is_ident_start(first) => chars.all(is_ident_continue),
        _ => false,
    }
}

/// A string attribute that cannot appear inside a quoted literal makes the
/// object unrepresentable in source form.
fn representable(text: &str) -> Result<&str, String> {
    if text.contains('"') || text.contains('\n') {
        Err(format!("attribute value {text:?} cannot be written as a string literal"))
    } else {
        Ok(text)
    }
}

fn require_finite(value: f64, what: &str) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{what} is not finite"))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
