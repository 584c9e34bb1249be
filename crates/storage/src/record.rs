//! Persisted annotation records
//!
//! One flat record per annotation. The frame is four comma-separated
//! numbers, the properties bag is a JSON string, and a single base64 payload
//! slot carries either the signature image or the JSON path list, which
//! never coexist on one annotation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pdf_markup_core::{
    Annotation, AnnotationId, AnnotationParts, PathSegment, Properties, Rect, Tool, UnknownTool,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    pub id: String,
    pub tool: String,
    pub page_index: u32,
    pub created_at: i64,
    #[serde(default)]
    pub modified_at: i64,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default)]
    pub rotation: f32,
    pub frame: String,
    pub properties: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Why one record could not be turned back into an annotation
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bad id: {0}")]
    Id(#[from] uuid::Error),
    #[error(transparent)]
    Tool(#[from] UnknownTool),
    #[error("malformed frame {0:?}")]
    Frame(String),
    #[error("malformed properties: {0}")]
    Properties(#[source] serde_json::Error),
    #[error("malformed payload: {0}")]
    Payload(#[from] base64::DecodeError),
    #[error("malformed path: {0}")]
    Path(#[source] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Reasons an annotation is not written
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub fn format_frame(frame: &Rect) -> String {
    format!("{},{},{},{}", frame.min_x(), frame.min_y(), frame.width(), frame.height())
}

pub fn parse_frame(text: &str) -> Option<Rect> {
    let values: Vec<f32> =
        text.split(',').map(|part| part.trim().parse::<f32>()).collect::<Result<_, _>>().ok()?;
    match values.as_slice() {
        &[x, y, w, h] if values.iter().all(|v| v.is_finite()) => Some(Rect::new(x, y, w, h)),
        _ => None,
    }
}

impl AnnotationRecord {
    pub fn from_annotation(annotation: &Annotation) -> Result<Self, EncodeError> {
        annotation.validate()?;
        let props = annotation.properties();
        let payload = match annotation.tool() {
            Tool::Signature => props.signature.as_deref().map(|bytes| BASE64.encode(bytes)),
            _ if props.path.is_empty() => None,
            _ => Some(BASE64.encode(serde_json::to_vec(&props.path)?)),
        };

        Ok(Self {
            id: annotation.id().to_string(),
            tool: annotation.tool().as_str().to_string(),
            page_index: annotation.page_index(),
            created_at: annotation.created_at(),
            modified_at: annotation.modified_at(),
            z_index: annotation.z_index(),
            rotation: annotation.rotation(),
            frame: format_frame(&annotation.frame()),
            properties: serde_json::to_string(props)?,
            payload,
        })
    }

    pub fn to_annotation(&self) -> Result<Annotation, DecodeError> {
        let id: AnnotationId = self.id.parse()?;
        let tool: Tool = self.tool.parse()?;
        let frame =
            parse_frame(&self.frame).ok_or_else(|| DecodeError::Frame(self.frame.clone()))?;
        let mut properties: Properties =
            serde_json::from_str(&self.properties).map_err(DecodeError::Properties)?;

        if let Some(encoded) = &self.payload {
            let bytes = BASE64.decode(encoded)?;
            match tool {
                Tool::Signature => properties.signature = Some(bytes),
                _ => {
                    let path: Vec<PathSegment> =
                        serde_json::from_slice(&bytes).map_err(DecodeError::Path)?;
                    properties.path = path;
                }
            }
        }

        let annotation = Annotation::from_parts(AnnotationParts {
            id,
            tool,
            frame,
            rotation: self.rotation,
            page_index: self.page_index,
            z_index: self.z_index,
            properties,
            created_at: self.created_at,
            modified_at: self.modified_at.max(self.created_at),
        });
        annotation.validate()?;
        Ok(annotation)
    }
}
