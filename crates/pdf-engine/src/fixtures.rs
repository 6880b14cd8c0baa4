//! In-memory documents for tests

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object};
use std::io::Cursor;

/// PDF with one page per `(width, height)` entry, sizes in points
pub fn pdf_with_pages(page_sizes: &[(f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = page_sizes
        .iter()
        .map(|&(width, height)| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::from(width), Object::from(height)],
            })
            .into()
        })
        .collect();

    finish(doc, pages_id, kids, None)
}

/// PDF whose pages take their MediaBox from the page tree root
pub fn pdf_with_inherited_media_box(pages: u32, (width, height): (f32, f32)) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            })
            .into()
        })
        .collect();

    let media_box: Object =
        vec![Object::Integer(0), Object::Integer(0), Object::from(width), Object::from(height)].into();
    finish(doc, pages_id, kids, Some(media_box))
}

fn finish(
    mut doc: Document,
    pages_id: lopdf::ObjectId,
    kids: Vec<Object>,
    media_box: Option<Object>,
) -> Vec<u8> {
    let mut pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
    };
    if let Some(media_box) = media_box {
        pages.set("MediaBox", media_box);
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory PDF should serialize");
    bytes
}

/// PNG of the given size filled with a solid colour
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([30, 90, 160, 255]));

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("in-memory PNG should encode");
    bytes
}
