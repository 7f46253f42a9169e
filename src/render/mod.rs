pub mod canvas;
pub mod scene;
