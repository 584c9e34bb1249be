//! Import of annotations saved by the legacy editor
//!
//! Legacy records name their kind with PDF-annotation vocabulary ("ink",
//! "freeText", "square"). Each record is converted on its own: a record that
//! cannot be read is dropped and reported while the rest of the batch
//! carries on.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pdf_markup_core::{
    normalize_degrees, now_millis, path_bounds, Annotation, AnnotationId, AnnotationParts, Color,
    EngineConfig, PathSegment, Point, Properties, Rect, Size, Tool, ValidationError,
};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("legacy export is not a JSON record list: {0}")]
    Json(#[source] serde_json::Error),
    #[error("malformed legacy record: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unknown legacy annotation type {0:?}")]
    UnknownType(String),
    #[error("legacy record has no bounds")]
    MissingBounds,
    #[error("unreadable signature image: {0}")]
    Signature(#[from] base64::DecodeError),
    #[error("unreadable color {0:?}")]
    Color(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A record as written by the legacy editor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "pageIndex")]
    pub page: u32,
    /// `[x, y, width, height]` in page space
    #[serde(default, alias = "bounds")]
    pub rect: Option<[f32; 4]>,
    #[serde(default, alias = "text")]
    pub contents: Option<String>,
    /// `#RRGGBB` or `#RRGGBBAA`
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub line_width: Option<f32>,
    #[serde(default)]
    pub ink_list: Vec<Vec<[f32; 2]>>,
    /// Base64 image bytes
    #[serde(default, alias = "imageData")]
    pub signature: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub rotation: f32,
}

#[derive(Debug, Default)]
pub struct MigrationOutcome {
    pub annotations: Vec<Annotation>,
    /// Position in the input batch and why the record was dropped
    pub dropped: Vec<(usize, MigrationError)>,
}

/// Current tool for a legacy type name
pub fn legacy_tool(kind: &str) -> Option<Tool> {
    let tool = match kind.to_ascii_lowercase().as_str() {
        "ink" | "pen" | "drawing" => Tool::Pen,
        "highlight" | "highlighter" => Tool::Highlighter,
        "freetext" | "text" | "textbox" => Tool::Text,
        "square" | "rectangle" => Tool::Rectangle,
        "oval" | "circle" | "ellipse" => Tool::Oval,
        "line" => Tool::Line,
        "arrow" => Tool::Arrow,
        "polygon" => Tool::Polygon,
        "note" | "stickynote" | "comment" => Tool::Note,
        "signature" | "stamp" => Tool::Signature,
        "magnifier" | "loupe" => Tool::Magnifier,
        _ => return None,
    };
    Some(tool)
}

fn parse_hex_color(text: &str) -> Option<Color> {
    let hex = text.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
        8 => Some(Color::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
        _ => None,
    }
}

fn ink_path(strokes: &[Vec<[f32; 2]>]) -> Vec<PathSegment> {
    let mut path = Vec::new();
    for stroke in strokes {
        let mut points = stroke.iter().map(|&[x, y]| Point::new(x, y));
        let Some(first) = points.next() else {
            continue;
        };
        path.push(PathSegment::MoveTo { to: first });
        path.extend(points.map(|to| PathSegment::LineTo { to }));
    }
    path
}

/// Convert one legacy record
pub fn migrate_record(
    record: &LegacyRecord,
    config: &EngineConfig,
) -> Result<Annotation, MigrationError> {
    let tool =
        legacy_tool(&record.kind).ok_or_else(|| MigrationError::UnknownType(record.kind.clone()))?;
    let mut properties = Properties::for_tool(tool);

    if let Some(text) = &record.color {
        let color = parse_hex_color(text).ok_or_else(|| MigrationError::Color(text.clone()))?;
        match tool {
            Tool::Note => properties.fill_color = Some(color),
            _ => properties.stroke_color = color,
        }
    }
    if let Some(opacity) = record.opacity.filter(|o| o.is_finite()) {
        properties.opacity = opacity.clamp(0.0, 1.0);
    }
    if let Some(width) = record.line_width.filter(|w| w.is_finite()) {
        properties.stroke_width = width.max(0.0);
    }
    if let Some(contents) = &record.contents {
        if matches!(tool, Tool::Text | Tool::Note) {
            properties.text = contents.clone();
        }
    }
    if tool == Tool::Signature {
        if let Some(encoded) = &record.signature {
            properties.signature = Some(BASE64.decode(encoded.trim())?);
        }
    }
    if matches!(tool, Tool::Pen | Tool::Highlighter | Tool::Line | Tool::Arrow | Tool::Polygon) {
        properties.path = ink_path(&record.ink_list);
    }

    let frame = match record.rect {
        Some([x, y, width, height]) => Rect::new(x, y, width, height).normalized(),
        None => default_frame(tool, &properties, config).ok_or(MigrationError::MissingBounds)?,
    };

    let created_at = record.created_at.unwrap_or_else(now_millis);
    let annotation = Annotation::from_parts(AnnotationParts {
        id: record
            .id
            .as_deref()
            .and_then(|id| id.parse().ok())
            .unwrap_or_else(AnnotationId::new_v4),
        tool,
        frame,
        rotation: normalize_degrees(record.rotation),
        page_index: record.page,
        z_index: 0,
        properties,
        created_at,
        modified_at: created_at,
    });
    annotation.validate()?;
    Ok(annotation)
}

/// Frame for a record without bounds: the ink envelope, or the tool's default size
fn default_frame(tool: Tool, properties: &Properties, config: &EngineConfig) -> Option<Rect> {
    if let Some(bounds) = path_bounds(&properties.path) {
        // A perfectly straight stroke still needs area
        let pad = (properties.stroke_width / 2.0).max(0.5);
        let grow = |extent: f32| if extent > 0.0 { 0.0 } else { pad };
        return Some(Rect::new(
            bounds.min_x() - grow(bounds.width()),
            bounds.min_y() - grow(bounds.height()),
            bounds.width() + 2.0 * grow(bounds.width()),
            bounds.height() + 2.0 * grow(bounds.height()),
        ));
    }
    let size: Size = match tool {
        Tool::Text => config.text_size,
        Tool::Note => config.note_size,
        Tool::Signature => config.signature_size,
        _ => return None,
    };
    Some(Rect::new(0.0, 0.0, size.width, size.height))
}

/// Convert a batch of raw legacy records, dropping the ones that fail
///
/// A record whose legacy id was already used earlier in the batch is kept
/// under a fresh id.
pub fn migrate(records: &[serde_json::Value], config: &EngineConfig) -> MigrationOutcome {
    let mut outcome = MigrationOutcome::default();
    let mut seen = HashSet::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        let converted =
            LegacyRecord::deserialize(raw).map_err(MigrationError::Decode).and_then(|mut record| {
                let annotation = migrate_record(&record, config)?;
                if !seen.contains(&annotation.id()) {
                    return Ok(annotation);
                }
                let taken = annotation.id();
                tracing::warn!(index, %taken, "repeated legacy id, assigning a fresh one");
                record.id = None;
                migrate_record(&record, config)
            });
        match converted {
            Ok(annotation) => {
                seen.insert(annotation.id());
                outcome.annotations.push(annotation);
            }
            Err(err) => {
                tracing::warn!(index, %err, "legacy record dropped");
                outcome.dropped.push((index, err));
            }
        }
    }
    tracing::info!(
        migrated = outcome.annotations.len(),
        dropped = outcome.dropped.len(),
        "legacy migration finished"
    );
    outcome
}

/// Parse a legacy export: a JSON array, or an object with an `annotations` array
pub fn migrate_json(
    bytes: &[u8],
    config: &EngineConfig,
) -> Result<MigrationOutcome, MigrationError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LegacyExport {
        List(Vec<serde_json::Value>),
        Wrapped { annotations: Vec<serde_json::Value> },
    }

    let records = match serde_json::from_slice(bytes).map_err(MigrationError::Json)? {
        LegacyExport::List(records) | LegacyExport::Wrapped { annotations: records } => records,
    };
    Ok(migrate(&records, config))
}
