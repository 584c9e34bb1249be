//! Raster stamp embedding
//!
//! Each stamp becomes an RGB image XObject with a DeviceGray soft mask for
//! its alpha channel, drawn by a `q w 0 0 h x y cm /Name Do Q` fragment
//! appended to the page content. The page's existing content is wrapped in
//! `q`/`Q` first so a CTM it leaves behind cannot shift the stamps.

use crate::{inherited_attribute, PdfDocument, PdfEngineError, PdfResult};
use image::RgbaImage;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use pdf_markup_core::Rect;
use std::collections::BTreeMap;

const MULTIPLY_STATE: &str = "PmMultiply";

/// How a stamp combines with the page beneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StampBlend {
    #[default]
    Normal,
    Multiply,
}

/// One rasterized annotation ready to embed
#[derive(Debug, Clone)]
pub struct PageStamp {
    pub page_index: u32,
    /// Where the image lands, in PDF units
    pub placement: Rect,
    /// Straight-alpha RGBA, first row is the top of the image
    pub image: RgbaImage,
    pub blend: StampBlend,
}

impl PdfDocument {
    /// Embed every stamp into its page, returning how many were placed
    ///
    /// Every page index is checked before the document is modified.
    pub fn apply_stamps(&mut self, stamps: &[PageStamp]) -> PdfResult<usize> {
        let mut by_page: BTreeMap<u32, Vec<&PageStamp>> = BTreeMap::new();
        for stamp in stamps {
            self.page_id(stamp.page_index)?;
            by_page.entry(stamp.page_index).or_default().push(stamp);
        }

        let mut placed = 0;
        for (page_index, page_stamps) in by_page {
            let page_id = self.page_id(page_index)?;
            let resources_id = own_resources(self.document_mut(), page_id, page_index)?;
            let mut content = String::new();

            for stamp in page_stamps {
                if stamp.image.width() == 0 || stamp.image.height() == 0 {
                    tracing::debug!(page_index, "skipping empty stamp image");
                    continue;
                }
                let doc = self.document_mut();
                let image_id = add_image(doc, &stamp.image);
                let name = format!("PmStamp{}_{}", image_id.0, image_id.1);
                insert_resource(doc, resources_id, b"XObject", &name, Object::Reference(image_id))?;

                let blend = match stamp.blend {
                    StampBlend::Normal => String::new(),
                    StampBlend::Multiply => {
                        insert_resource(
                            doc,
                            resources_id,
                            b"ExtGState",
                            MULTIPLY_STATE,
                            Object::Dictionary(dictionary! {
                                "Type" => "ExtGState",
                                "BM" => "Multiply",
                            }),
                        )?;
                        format!("/{MULTIPLY_STATE} gs ")
                    }
                };

                // Image space puts row 0 at the top of the unit square, so a
                // positive height keeps the top-down raster upright.
                let placement = stamp.placement;
                content.push_str(&format!(
                    "q {blend}{:.4} 0 0 {:.4} {:.4} {:.4} cm /{name} Do Q\n",
                    placement.width(),
                    placement.height(),
                    placement.min_x(),
                    placement.min_y(),
                ));
                placed += 1;
            }

            if !content.is_empty() {
                wrap_page_contents(self.document_mut(), page_id, content.into_bytes())?;
            }
        }

        tracing::debug!(placed, "stamps embedded");
        Ok(placed)
    }

    /// Number of image XObjects reachable from a page's resources
    pub fn image_count(&self, page_index: u32) -> PdfResult<usize> {
        let page_id = self.page_id(page_index)?;
        let doc = self.document();
        let Some(resources) = inherited_attribute(doc, page_id, b"Resources") else {
            return Ok(0);
        };
        let Ok(xobjects) = resources.as_dict().and_then(|r| r.get(b"XObject")) else {
            return Ok(0);
        };
        let Ok(xobjects) = crate::resolve(doc, xobjects).as_dict() else {
            return Ok(0);
        };
        Ok(xobjects
            .iter()
            .filter(|(_, value)| {
                crate::resolve(doc, value)
                    .as_stream()
                    .ok()
                    .and_then(|s| s.dict.get(b"Subtype").ok())
                    .and_then(|s| s.as_name().ok())
                    == Some(b"Image".as_slice())
            })
            .count())
    }
}

/// Add the RGB image and its alpha soft mask, returning the image id
fn add_image(doc: &mut Document, image: &RgbaImage) -> ObjectId {
    let (width, height) = image.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in image.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        alpha,
    ));

    doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "SMask" => smask_id,
        },
        rgb,
    ))
}

/// Give the page its own indirect Resources dictionary and return its id
///
/// The page's resources, whether inline, referenced (possibly shared with
/// other pages) or inherited, are copied into a new object, and the
/// categories stamps write into are copied too, so nothing added here
/// reaches another page.
fn own_resources(doc: &mut Document, page_id: ObjectId, page_index: u32) -> PdfResult<ObjectId> {
    let malformed =
        || PdfEngineError::MalformedPage { page: page_index, reason: "Resources is not a dictionary" };
    let mut dict = match doc.get_dictionary(page_id)?.get(b"Resources").ok() {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => doc.get_dictionary(*id).map_err(|_| malformed())?.clone(),
        Some(_) => return Err(malformed()),
        None => inherited_attribute(doc, page_id, b"Resources")
            .and_then(|object| object.as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new),
    };

    for category in [b"XObject".as_slice(), b"ExtGState".as_slice()] {
        let nested = match dict.get(category) {
            Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok().cloned(),
            _ => None,
        };
        if let Some(nested) = nested {
            dict.set(category.to_vec(), nested);
        }
    }

    let resources_id = doc.add_object(dict);
    doc.get_dictionary_mut(page_id)?.set("Resources", resources_id);
    Ok(resources_id)
}

/// Insert `name => value` into a resource category such as `/XObject`
fn insert_resource(
    doc: &mut Document,
    resources_id: ObjectId,
    category: &[u8],
    name: &str,
    value: Object,
) -> PdfResult<()> {
    let resources = doc.get_dictionary_mut(resources_id)?;
    if !matches!(resources.get(category), Ok(Object::Dictionary(_))) {
        resources.set(category.to_vec(), Dictionary::new());
    }
    if let Ok(Object::Dictionary(entries)) = resources.get_mut(category) {
        entries.set(name, value);
    }
    Ok(())
}

/// Replace the page's Contents with `[q, ...existing, Q + tail]`
fn wrap_page_contents(doc: &mut Document, page_id: ObjectId, tail: Vec<u8>) -> PdfResult<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut closing = b"\nQ\n".to_vec();
    closing.extend(tail);
    let close_id = doc.add_object(Stream::new(Dictionary::new(), closing));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));
    doc.get_dictionary_mut(page_id)?.set("Contents", contents);
    Ok(())
}
