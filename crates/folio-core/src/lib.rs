mod article;
mod component;
mod document;
mod editor;
mod error;
mod format;
mod input;
mod interpreter;
mod ops;
mod paragraph;
mod planner;
mod registry;
mod selection;

pub use crate::article::*;
pub use crate::component::*;
pub use crate::document::*;
pub use crate::editor::*;
pub use crate::error::*;
pub use crate::format::*;
pub use crate::input::*;
pub use crate::interpreter::*;
pub use crate::ops::*;
pub use crate::paragraph::*;
pub use crate::planner::*;
pub use crate::registry::*;
pub use crate::selection::*;
