//! Page compositor
//!
//! Paints one page's annotations in z order onto a view-space target, then
//! the selection chrome on top. Expensive annotations (long freehand paths
//! and signatures) are rasterized once into a layer and reused from the
//! bitmap cache until they change or the zoom changes.

use crate::draw::{blend_mode, paint_annotation, visual_bounds, MAX_LAYER_SIDE};
use crate::font::FontBook;
use crate::overlay::paint_selection;
use crate::RenderError;
use pdf_markup_cache::{BitmapCache, CacheConfig, CacheStats, CachedBitmap};
use pdf_markup_core::{
    Affine, Annotation, AnnotationId, AnnotationStore, CoordinateConverter, EngineConfig,
    StoreEvent, Tool,
};
use tiny_skia::{BlendMode, Pixmap, PixmapPaint, PixmapRef, Transform};

/// Quantization of the linear part of a transform in cache keys
const LINEAR_STEPS: f32 = 1024.0;
/// Sub-pixel translation steps per pixel in cache keys
const SUBPIXEL_STEPS: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Draw selection outline and handles for the selected annotation
    pub draw_selection: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { draw_selection: true }
    }
}

/// What a render pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub drawn: usize,
    /// Annotations that failed validation or painting
    pub skipped: usize,
    pub cache_hits: usize,
}

/// Cache key: an annotation revision at one zoom and sub-pixel phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RenderKey {
    id: AnnotationId,
    modified_at: i64,
    linear: [i32; 4],
    subpixel: [u8; 2],
}

pub struct Compositor {
    fonts: FontBook,
    cache: BitmapCache<RenderKey>,
    cache_config: CacheConfig,
    engine_config: EngineConfig,
}

impl Compositor {
    pub fn new(fonts: FontBook) -> Self {
        Self::with_config(fonts, CacheConfig::default(), EngineConfig::default())
    }

    pub fn with_config(
        fonts: FontBook,
        cache_config: CacheConfig,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            fonts,
            cache: BitmapCache::from_config(&cache_config),
            cache_config,
            engine_config,
        }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached layer of one annotation
    pub fn invalidate(&self, id: AnnotationId) -> usize {
        self.cache.remove_where(|key| key.id == id)
    }

    /// Keep the cache in step with store changes
    pub fn handle_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::Removed { id, .. } | StoreEvent::Updated { id, .. } => {
                self.invalidate(*id);
            }
            StoreEvent::Cleared => self.cache.clear(),
            StoreEvent::Added { .. }
            | StoreEvent::SelectionChanged { .. }
            | StoreEvent::HistoryChanged { .. } => {}
        }
    }

    /// Paint one page of the store
    pub fn render_page(
        &self,
        store: &AnnotationStore,
        page_index: u32,
        target: &mut Pixmap,
        converter: &CoordinateConverter,
        options: &RenderOptions,
    ) -> RenderSummary {
        self.render(&store.page_annotations(page_index), target, converter, options)
    }

    /// Paint `annotations` in ascending z order
    ///
    /// Never fails: an annotation that cannot be drawn is logged and left out.
    pub fn render(
        &self,
        annotations: &[&Annotation],
        target: &mut Pixmap,
        converter: &CoordinateConverter,
        options: &RenderOptions,
    ) -> RenderSummary {
        let page_to_view = converter.page_to_view();
        let mut ordered = annotations.to_vec();
        ordered.sort_by_key(|a| a.z_index());

        let mut summary = RenderSummary::default();
        for annotation in &ordered {
            if let Err(err) = annotation.validate() {
                tracing::debug!(id = %annotation.id(), %err, "annotation not drawn");
                summary.skipped += 1;
                continue;
            }
            let result = if self.is_expensive(annotation) {
                self.paint_cached(target, annotation, &page_to_view)
            } else {
                paint_annotation(
                    target,
                    annotation,
                    &page_to_view,
                    &self.fonts,
                    blend_mode(annotation),
                )
                .map(|()| false)
            };
            match result {
                Ok(hit) => {
                    summary.drawn += 1;
                    summary.cache_hits += usize::from(hit);
                }
                Err(err) => {
                    tracing::debug!(id = %annotation.id(), %err, "annotation not drawn");
                    summary.skipped += 1;
                }
            }
        }

        if options.draw_selection {
            for annotation in ordered.iter().filter(|a| a.is_selected()) {
                if annotation.validate().is_err() {
                    continue;
                }
                if let Err(err) =
                    paint_selection(target, annotation, converter, &self.engine_config)
                {
                    tracing::debug!(id = %annotation.id(), %err, "selection overlay skipped");
                }
            }
        }
        summary
    }

    fn is_expensive(&self, annotation: &Annotation) -> bool {
        match annotation.tool() {
            Tool::Signature => true,
            tool if tool.is_freehand() => {
                annotation.properties().path_len() > self.cache_config.path_segment_threshold
            }
            _ => false,
        }
    }

    /// Paint through the layer cache, returning whether the layer was a hit
    fn paint_cached(
        &self,
        target: &mut Pixmap,
        annotation: &Annotation,
        page_to_view: &Affine,
    ) -> Result<bool, RenderError> {
        let t = page_to_view;
        let (ix, iy) = (t.tx.floor(), t.ty.floor());
        let phase = |fract: f32| ((fract * SUBPIXEL_STEPS) as u8).min(SUBPIXEL_STEPS as u8 - 1);
        let subpixel = [phase(t.tx - ix), phase(t.ty - iy)];
        let quantize = |v: f32| (v * LINEAR_STEPS).round() as i32;
        let key = RenderKey {
            id: annotation.id(),
            modified_at: annotation.modified_at(),
            linear: [quantize(t.a), quantize(t.b), quantize(t.c), quantize(t.d)],
            subpixel,
        };
        let blend = blend_mode(annotation);

        if let Some(bitmap) = self.cache.get(&key) {
            blit(target, &bitmap, ix as i32, iy as i32, blend);
            return Ok(true);
        }

        // Layer space: the transform minus its whole-pixel translation
        let local = Affine::new(
            t.a,
            t.b,
            t.c,
            t.d,
            subpixel[0] as f32 / SUBPIXEL_STEPS,
            subpixel[1] as f32 / SUBPIXEL_STEPS,
        );
        let bounds = local.map_rect(&visual_bounds(annotation));
        let (left, top) = (bounds.min_x().floor(), bounds.min_y().floor());
        let width = (bounds.max_x().ceil() - left).max(1.0);
        let height = (bounds.max_y().ceil() - top).max(1.0);
        let too_large = width > MAX_LAYER_SIDE as f32
            || height > MAX_LAYER_SIDE as f32
            || (width * height * 4.0) as usize > self.cache_config.max_bytes;
        if too_large {
            paint_annotation(target, annotation, page_to_view, &self.fonts, blend)?;
            return Ok(false);
        }

        let (width, height) = (width as u32, height as u32);
        let mut layer = Pixmap::new(width, height).ok_or(RenderError::Allocation { width, height })?;
        let to_layer = local.then(&Affine::translate(-left, -top));
        paint_annotation(&mut layer, annotation, &to_layer, &self.fonts, BlendMode::SourceOver)?;

        let bitmap = CachedBitmap::new(layer.take(), width, height, left as i32, top as i32);
        blit(target, &bitmap, ix as i32, iy as i32, blend);
        self.cache.put(key, bitmap);
        Ok(false)
    }
}

fn blit(target: &mut Pixmap, bitmap: &CachedBitmap, ix: i32, iy: i32, blend: BlendMode) {
    let Some(layer) = PixmapRef::from_bytes(&bitmap.pixels, bitmap.width, bitmap.height) else {
        return;
    };
    let paint = PixmapPaint { blend_mode: blend, ..PixmapPaint::default() };
    target.draw_pixmap(
        ix + bitmap.origin_x,
        iy + bitmap.origin_y,
        layer,
        &paint,
        Transform::identity(),
        None,
    );
}
