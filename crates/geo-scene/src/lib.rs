pub mod attrs;
pub mod object;
pub mod scene;
pub mod view;

pub use attrs::{
    Attrs, DEFAULT_DASH, DEFAULT_POINT_FILL, DEFAULT_POINT_SIZE, DEFAULT_STROKE_COLOR,
    DEFAULT_STROKE_WIDTH,
};
pub use object::{GeoObject, ObjectId, ObjectKind, Shape};
pub use scene::{CreateKind, Input, Scene, SceneError};
pub use view::ViewConfig;
