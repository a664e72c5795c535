use thiserror::Error;

use folio_core::{ComponentName, EditorError};

use crate::dom::NodeId;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error("no DOM node {0:?}")]
    UnknownNode(NodeId),

    #[error("component `{0}` has no rendered node")]
    NotRendered(ComponentName),

    #[error("offset {offset} is outside the rendered text of `{component}`")]
    OffsetOutOfRange {
        component: ComponentName,
        offset: usize,
    },

    #[error("DOM node {0:?} is not inside a rendered component")]
    Detached(NodeId),
}

pub type Result<T, E = ViewError> = std::result::Result<T, E>;
