//! Encode flattened page rasters into a PDF
//!
//! Each raster becomes one page whose MediaBox matches the page's intrinsic
//! size; the image is drawn to fill the page. Alpha is composited onto white
//! before encoding since DeviceRGB carries no transparency.

use crate::{PdfEngineError, RgbaImage};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::Rgba;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

/// A flattened page ready for assembly
#[derive(Debug, Clone)]
pub struct PageRaster {
    pub image: RgbaImage,
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageRaster {
    pub fn new(image: RgbaImage, width_pt: f32, height_pt: f32) -> Self {
        Self { image, width_pt, height_pt }
    }

    /// White page at native resolution
    pub fn blank(width_pt: f32, height_pt: f32) -> Self {
        let width = width_pt.round().max(1.0) as u32;
        let height = height_pt.round().max(1.0) as u32;
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
            width_pt,
            height_pt,
        }
    }
}

/// Build a PDF with one page per raster, in order
pub fn assemble_pdf(pages: &[PageRaster]) -> Result<Vec<u8>, PdfEngineError> {
    if pages.is_empty() {
        return Err(PdfEngineError::Backend("cannot assemble a document without pages".to_owned()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let page_id = add_page(&mut doc, pages_id, page)?;
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut output = Vec::new();
    doc.save_to(&mut output)?;

    tracing::debug!(pages = pages.len(), bytes = output.len(), "assembled document");
    Ok(output)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    page: &PageRaster,
) -> Result<ObjectId, PdfEngineError> {
    let (width_px, height_px) = page.image.dimensions();
    let compressed = deflate(&rgb_on_white(&page.image))?;

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width_px as i64,
            "Height" => height_px as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        },
        compressed,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(page.width_pt),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(page.height_pt),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(page.width_pt),
            Object::Real(page.height_pt),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    });

    Ok(page_id)
}

fn rgb_on_white(image: &RgbaImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(image.as_raw().len() / 4 * 3);
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        for channel in [r, g, b] {
            let blended = (channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
            rgb.push(blended as u8);
        }
    }
    rgb
}

fn deflate(bytes: &[u8]) -> Result<Vec<u8>, PdfEngineError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}
