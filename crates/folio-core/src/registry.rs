use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::component::{
    ComponentName, EMBEDDED_COMPONENT, FIGURE, LAYOUT, LIST, ListTag, PARAGRAPH, SECTION,
};
use crate::editor::{Editor, RegexMatch};
use crate::error::{EditorError, Result};

/// A component type known to an editor.
///
/// `on_install` runs once when the class is installed into an editor and
/// may register regex triggers or read extension configuration.
pub trait ComponentClass: Send + Sync {
    fn class_name(&self) -> &'static str;

    fn on_install(&self, _editor: &mut Editor, _config: Option<&Value>) -> Result<()> {
        Ok(())
    }
}

/// Resolves class names found in documents and operations.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    classes: HashMap<String, Arc<dyn ComponentClass>>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ComponentRegistry")
            .field("classes", &names)
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: Arc<dyn ComponentClass>, override_existing: bool) -> Result<()> {
        let name = class.class_name();
        if self.classes.contains_key(name) && !override_existing {
            return Err(EditorError::AlreadyRegistered {
                kind: "component class",
                name: name.to_string(),
            });
        }
        self.classes.insert(name.to_string(), class);
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Arc<dyn ComponentClass>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| EditorError::UnknownComponentClass(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The classes every editor installs on construction.
pub fn builtin_classes() -> Vec<Arc<dyn ComponentClass>> {
    vec![
        Arc::new(SectionClass),
        Arc::new(LayoutClass),
        Arc::new(ParagraphClass),
        Arc::new(FigureClass),
        Arc::new(ListClass),
    ]
}

pub struct SectionClass;

impl ComponentClass for SectionClass {
    fn class_name(&self) -> &'static str {
        SECTION
    }
}

pub struct LayoutClass;

impl ComponentClass for LayoutClass {
    fn class_name(&self) -> &'static str {
        LAYOUT
    }
}

pub struct ParagraphClass;

impl ComponentClass for ParagraphClass {
    fn class_name(&self) -> &'static str {
        PARAGRAPH
    }
}

pub struct FigureClass;

impl ComponentClass for FigureClass {
    fn class_name(&self) -> &'static str {
        FIGURE
    }
}

/// Lists, plus the markdown-style triggers that start one.
pub struct ListClass;

impl ListClass {
    pub const UNORDERED_STAR: &'static str = r"^\* $";
    pub const UNORDERED_DASH: &'static str = r"^- $";
    pub const ORDERED: &'static str = r"^1\. $";
}

impl ComponentClass for ListClass {
    fn class_name(&self) -> &'static str {
        LIST
    }

    fn on_install(&self, editor: &mut Editor, _config: Option<&Value>) -> Result<()> {
        let override_existing = editor.is_reinstalling();
        for (pattern, tag) in [
            (Self::UNORDERED_STAR, ListTag::Ul),
            (Self::UNORDERED_DASH, ListTag::Ul),
            (Self::ORDERED, ListTag::Ol),
        ] {
            editor.register_regex(
                pattern,
                Arc::new(move |editor: &mut Editor, found: &RegexMatch| {
                    editor.convert_to_list_item(&found.component, found.len, tag)
                }),
                override_existing,
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct EmbedConfig {
    #[serde(default)]
    providers: Vec<String>,
}

/// Embedded third-party content. Installing it requires a non-empty
/// `providers` list of host names, e.g. `{"providers": ["youtube.com"]}`.
pub struct EmbedClass;

impl ComponentClass for EmbedClass {
    fn class_name(&self) -> &'static str {
        EMBEDDED_COMPONENT
    }

    fn on_install(&self, editor: &mut Editor, config: Option<&Value>) -> Result<()> {
        let configuration = |message: &str| EditorError::Configuration {
            extension: EMBEDDED_COMPONENT.to_string(),
            message: message.to_string(),
        };
        let config = config.ok_or_else(|| configuration("missing configuration"))?;
        let config: EmbedConfig = serde_json::from_value(config.clone())
            .map_err(|err| configuration(&err.to_string()))?;
        if config.providers.is_empty() {
            return Err(configuration("`providers` must list at least one host"));
        }
        editor.set_embed_providers(config.providers);
        Ok(())
    }
}

/// Reference to a component an asynchronous embed lookup will fill in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedTask {
    pub component: ComponentName,
    pub url: String,
    pub provider: String,
}

/// What a provider lookup resolved an embed to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct EmbedInfo {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}
