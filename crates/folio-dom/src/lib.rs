mod dom;
mod error;
mod render;
mod selection;

pub use crate::dom::*;
pub use crate::error::*;
pub use crate::render::*;
pub use crate::selection::*;
