//! Per-session editing state
//!
//! The active tool, the creation properties for new annotations and the
//! clipboard belong to one editing session. Two sessions editing different
//! documents never share them.

use crate::annotation::{Annotation, AnnotationId, Color, Properties, Tool};
use crate::store::{AnnotationStore, StoreError, StoreResult};
use std::collections::HashMap;

/// Active tool and per-tool creation presets
#[derive(Debug, Clone)]
pub struct SessionSettings {
    tool: Tool,
    presets: HashMap<Tool, Properties>,
    /// PNG bytes placed by the signature tool
    signature: Option<Vec<u8>>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { tool: Tool::Selection, presets: HashMap::new(), signature: None }
    }
}

impl SessionSettings {
    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn select_tool(&mut self, tool: Tool) {
        tracing::debug!(%tool, "tool selected");
        self.tool = tool;
    }

    /// Creation properties for a new annotation of `tool`
    pub fn properties_for(&self, tool: Tool) -> Properties {
        let mut properties =
            self.presets.get(&tool).cloned().unwrap_or_else(|| Properties::for_tool(tool));
        if tool == Tool::Signature {
            properties.signature = self.signature.clone();
        }
        properties
    }

    fn current_preset(&mut self) -> &mut Properties {
        let tool = self.tool;
        self.presets.entry(tool).or_insert_with(|| Properties::for_tool(tool))
    }

    pub fn set_current_stroke_color(&mut self, color: Color) {
        self.current_preset().stroke_color = color;
    }

    pub fn set_current_fill_color(&mut self, color: Option<Color>) {
        self.current_preset().fill_color = color;
    }

    pub fn set_current_stroke_width(&mut self, width: f32) {
        if width.is_finite() && width >= 0.0 {
            self.current_preset().stroke_width = width;
        }
    }

    pub fn set_current_font_size(&mut self, size: f32) {
        if size.is_finite() && size > 0.0 {
            self.current_preset().font_size = size;
        }
    }

    pub fn set_current_font_name(&mut self, name: impl Into<String>) {
        self.current_preset().font_name = name.into();
    }

    pub fn set_current_opacity(&mut self, opacity: f32) {
        if opacity.is_finite() {
            self.current_preset().opacity = opacity.clamp(0.0, 1.0);
        }
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    pub fn set_signature(&mut self, png: Option<Vec<u8>>) {
        self.signature = png;
    }
}

/// One editing session: settings plus clipboard
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub settings: SessionSettings,
    clipboard: Option<Annotation>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy an annotation to the clipboard as a detached deep copy
    pub fn copy(&mut self, store: &AnnotationStore, id: AnnotationId) -> StoreResult<()> {
        let annotation = store.get(id).ok_or(StoreError::NotFound(id))?;
        self.clipboard = Some(annotation.copy());
        Ok(())
    }

    /// Copy to the clipboard, then remove from the store
    pub fn cut(&mut self, store: &mut AnnotationStore, id: AnnotationId) -> StoreResult<()> {
        self.copy(store, id)?;
        store.remove(id)?;
        Ok(())
    }

    /// Paste the clipboard onto a page; each paste gets a fresh identity
    pub fn paste(&self, store: &mut AnnotationStore, page_index: u32) -> Option<AnnotationId> {
        self.clipboard.as_ref().map(|clip| store.paste(clip, page_index))
    }

    pub fn has_clipboard(&self) -> bool {
        self.clipboard.is_some()
    }
}
