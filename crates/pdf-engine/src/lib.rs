//! PDF page provider and flattened-export writer
//!
//! [`PdfDocument`] wraps a parsed `lopdf` document. It answers page count and
//! media box queries for the viewer side and embeds rasterized annotation
//! stamps for export.

use lopdf::{dictionary, Document, Object, ObjectId};
use pdf_markup_core::Rect;
use std::fs;
use std::path::{Path, PathBuf};

mod stamp;

pub use stamp::{PageStamp, StampBlend};

/// US Letter, used when a page carries no usable MediaBox
pub const LETTER: Rect = Rect::new(0.0, 0.0, 612.0, 792.0);

/// Upper bound on Parent links followed while resolving inherited attributes
const MAX_INHERITANCE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("malformed page {page}: {reason}")]
    MalformedPage { page: u32, reason: &'static str },
}

pub type PdfResult<T> = Result<T, PdfEngineError>;

/// Page geometry supplied by the viewer
pub trait PageSource {
    fn page_count(&self) -> u32;

    /// Media box of a zero-based page in PDF units
    fn media_box(&self, page_index: u32) -> PdfResult<Rect>;
}

/// A parsed PDF with its page table resolved
#[derive(Debug)]
pub struct PdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    media_boxes: Vec<Rect>,
}

impl PdfDocument {
    pub fn open(source: OpenSource) -> PdfResult<Self> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };
        Self::load_mem(&bytes)
    }

    pub fn load_mem(bytes: &[u8]) -> PdfResult<Self> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        let media_boxes = pages
            .iter()
            .map(|&page_id| {
                resolve_media_box(&doc, page_id).unwrap_or_else(|| {
                    tracing::debug!(?page_id, "page has no usable MediaBox, assuming Letter");
                    LETTER
                })
            })
            .collect();

        tracing::debug!(pages = pages.len(), "PDF loaded");
        Ok(Self { doc, pages, media_boxes })
    }

    /// A new document with one empty page per media box
    pub fn blank(media_boxes: &[Rect]) -> PdfResult<Self> {
        if media_boxes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::with_capacity(media_boxes.len());
        for media_box in media_boxes {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Real(media_box.min_x()),
                    Object::Real(media_box.min_y()),
                    Object::Real(media_box.max_x()),
                    Object::Real(media_box.max_y()),
                ],
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => media_boxes.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Self::load_mem(&bytes)
    }

    pub(crate) fn page_id(&self, page_index: u32) -> PdfResult<ObjectId> {
        self.pages.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: self.pages.len() as u32,
        })
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub(crate) fn document(&self) -> &Document {
        &self.doc
    }

    /// Serialize the (possibly stamped) document
    pub fn save_to_vec(&mut self) -> PdfResult<Vec<u8>> {
        let mut output = Vec::new();
        self.doc.save_to(&mut output)?;
        Ok(output)
    }

    pub fn save(&mut self, path: &Path) -> PdfResult<()> {
        let bytes = self.save_to_vec()?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn media_box(&self, page_index: u32) -> PdfResult<Rect> {
        self.media_boxes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: self.pages.len() as u32,
        })
    }
}

/// Follow an object reference one level
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

/// Look up a page attribute, walking the page tree for inherited values
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = Some(page_id);
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve_media_box(doc: &Document, page_id: ObjectId) -> Option<Rect> {
    let array = inherited_attribute(doc, page_id, b"MediaBox")?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = resolve(doc, item).as_float().ok()?;
    }
    let [x0, y0, x1, y1] = values;
    let rect = Rect::from_points(
        pdf_markup_core::Point::new(x0, y0),
        pdf_markup_core::Point::new(x1, y1),
    );
    (!rect.is_degenerate() && rect.is_finite()).then_some(rect)
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_pdf;
    use super::*;

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let bytes = sample_pdf(&[Some([0, 0, 612, 792]), Some([0, 0, 612, 792])], None);
        let doc = PdfDocument::open(OpenSource::Bytes(bytes)).expect("open should succeed");
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn reads_explicit_media_box() {
        let bytes = sample_pdf(&[Some([0, 0, 595, 842])], None);
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.media_box(0).unwrap(), Rect::new(0.0, 0.0, 595.0, 842.0));
    }

    #[test]
    fn media_box_is_inherited_from_page_tree() {
        let bytes = sample_pdf(&[None, Some([0, 0, 300, 400])], Some([0, 0, 842, 595]));
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.media_box(0).unwrap(), Rect::new(0.0, 0.0, 842.0, 595.0));
        assert_eq!(doc.media_box(1).unwrap(), Rect::new(0.0, 0.0, 300.0, 400.0));
    }

    #[test]
    fn missing_media_box_falls_back_to_letter() {
        let bytes = sample_pdf(&[None], None);
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.media_box(0).unwrap(), LETTER);
    }

    #[test]
    fn inverted_media_box_is_normalized() {
        let bytes = sample_pdf(&[Some([612, 792, 0, 0])], None);
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.media_box(0).unwrap(), Rect::new(0.0, 0.0, 612.0, 792.0));
    }

    #[test]
    fn blank_document_keeps_page_sizes() {
        let boxes = [Rect::new(0.0, 0.0, 612.0, 792.0), Rect::new(0.0, 0.0, 420.5, 595.0)];
        let mut doc = PdfDocument::blank(&boxes).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.media_box(1).unwrap(), boxes[1]);

        let reopened = PdfDocument::load_mem(&doc.save_to_vec().unwrap()).unwrap();
        assert_eq!(reopened.page_count(), 2);
        assert!(matches!(PdfDocument::blank(&[]), Err(PdfEngineError::NoPages)));
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let bytes = sample_pdf(&[Some([0, 0, 612, 792])], None);
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        let err = doc.media_box(3).expect_err("page 3 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 1 }));
    }

    #[test]
    fn invalid_bytes_fail_to_parse() {
        let err = PdfDocument::load_mem(b"not a pdf").expect_err("garbage should not parse");
        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn encrypted_marker_is_rejected() {
        let err = PdfDocument::load_mem(b"%PDF-1.4\n/Encrypt 5 0 R\n%%EOF")
            .expect_err("encrypted documents are unsupported");
        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PdfDocument::open(OpenSource::from(Path::new("/nonexistent/file.pdf")))
            .expect_err("missing file");
        assert!(matches!(err, PdfEngineError::Io(_)));
    }
}
