//! PDF sanitizer
//!
//! Documents without any active-content keyword pass through untouched. All
//! others are rebuilt page by page into a new document whose catalog holds
//! nothing but the page tree. Link annotations are dropped, actions are
//! stripped from the remaining annotations and from pages, and any object
//! that is itself active content (scripts, launch/submit actions, embedded
//! files, rich media) is not carried over.

use crate::traits::{ContentSanitizer, SanitizeError, SanitizeOutcome};
use bytes::Bytes;
use cleanroom_core::ContentKind;
use cleanroom_storage::StagedContent;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::borrow::Cow;
use std::collections::HashMap;

/// Names that mark scripting or other active content.
pub const OBFUSCATION_KEYWORDS: [&[u8]; 13] = [
    b"JS",
    b"JavaScript",
    b"AA",
    b"OpenAction",
    b"Launch",
    b"EmbeddedFile",
    b"EmbeddedFiles",
    b"RichMedia",
    b"XFA",
    b"SubmitForm",
    b"ImportData",
    b"GoToR",
    b"GoToE",
];

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

const MAX_NESTING: usize = 256;
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Default)]
pub struct PdfSanitizer;

impl PdfSanitizer {
    pub fn new() -> Self {
        Self
    }
}

/// Decode `#xx` escapes in a PDF name.
pub fn decode_name(raw: &[u8]) -> Cow<'_, [u8]> {
    if !raw.contains(&b'#') {
        return Cow::Borrowed(raw);
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    Cow::Owned(out)
}

pub fn is_keyword(name: &[u8]) -> bool {
    let decoded = decode_name(name);
    OBFUSCATION_KEYWORDS
        .iter()
        .any(|keyword| *keyword == decoded.as_ref())
}

/// Count keyword occurrences as dictionary keys or name values across every
/// object of the document, including the trailer.
pub fn count_keywords(doc: &Document) -> usize {
    let in_objects: usize = doc.objects.values().map(|obj| count_in(obj, 0)).sum();
    in_objects + count_in_dict(&doc.trailer, 0)
}

fn count_in(obj: &Object, depth: usize) -> usize {
    if depth > MAX_NESTING {
        return 0;
    }
    match obj {
        Object::Name(name) => usize::from(is_keyword(name)),
        Object::Array(items) => items.iter().map(|item| count_in(item, depth + 1)).sum(),
        Object::Dictionary(dict) => count_in_dict(dict, depth),
        Object::Stream(stream) => count_in_dict(&stream.dict, depth),
        _ => 0,
    }
}

fn count_in_dict(dict: &Dictionary, depth: usize) -> usize {
    dict.iter()
        .map(|(key, value)| usize::from(is_keyword(key)) + count_in(value, depth + 1))
        .sum()
}

fn name_of<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    dict.get(key).and_then(Object::as_name).ok()
}

/// A dictionary whose own name values mark it as active content, such as
/// `/S /JavaScript` or `/Type /EmbeddedFile`.
fn is_active_content(dict: &Dictionary) -> bool {
    dict.iter().any(|(_, value)| match value {
        Object::Name(name) => is_keyword(name),
        _ => false,
    })
}

fn is_annotation(dict: &Dictionary) -> bool {
    name_of(dict, b"Type") == Some(&b"Annot"[..]) || (dict.has(b"Subtype") && dict.has(b"Rect"))
}

/// Deep-copies pages from a source document into a fresh one, renumbering
/// every object it reaches.
struct PageCopier<'a> {
    source: &'a Document,
    target: Document,
    pages_id: ObjectId,
    copied: HashMap<ObjectId, ObjectId>,
    dropped_links: usize,
}

impl<'a> PageCopier<'a> {
    fn new(source: &'a Document) -> Self {
        let mut target = Document::with_version(source.version.clone());
        let pages_id = target.new_object_id();
        Self {
            source,
            target,
            pages_id,
            copied: HashMap::new(),
            dropped_links: 0,
        }
    }

    fn copy_page(&mut self, page_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        if let Some(id) = self.copied.get(&page_id) {
            return Ok(*id);
        }

        let mut page = self.source.get_object(page_id)?.as_dict()?.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = self.inherited(&page, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.remove(b"Parent");

        if let Ok(annots) = page.get(b"Annots") {
            let kept = self.without_links(annots);
            page.set("Annots", Object::Array(kept));
        }

        // Reserve the id first so references back to this page resolve to it.
        let new_id = self.target.new_object_id();
        self.copied.insert(page_id, new_id);

        let mut copy = self.copy_dict(&page, 0);
        copy.set("Parent", self.pages_id);
        self.target.objects.insert(new_id, Object::Dictionary(copy));
        Ok(new_id)
    }

    fn inherited(&self, page: &Dictionary, key: &[u8]) -> Option<Object> {
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        for _ in 0..MAX_TREE_DEPTH {
            let node = self.source.get_object(parent?).and_then(Object::as_dict).ok()?;
            if let Ok(value) = node.get(key) {
                return Some(value.clone());
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }

    fn without_links(&mut self, annots: &Object) -> Vec<Object> {
        let source = self.source;
        let items = match annots {
            Object::Reference(id) => match source.get_object(*id).and_then(Object::as_array) {
                Ok(items) => items,
                Err(_) => return Vec::new(),
            },
            Object::Array(items) => items,
            _ => return Vec::new(),
        };

        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let dict = match item {
                Object::Reference(id) => source.get_object(*id).and_then(Object::as_dict).ok(),
                Object::Dictionary(dict) => Some(dict),
                _ => None,
            };
            match dict {
                Some(dict) if name_of(dict, b"Subtype") == Some(&b"Link"[..]) => {
                    self.dropped_links += 1;
                }
                Some(_) => kept.push(item.clone()),
                None => {}
            }
        }
        kept
    }

    fn copy_ref(&mut self, id: ObjectId, depth: usize) -> Object {
        if let Some(new_id) = self.copied.get(&id) {
            return Object::Reference(*new_id);
        }

        // Dangling references read as null.
        let source = self.source;
        let object = match source.get_object(id) {
            Ok(object) => object,
            Err(_) => return Object::Null,
        };

        if let Ok(dict) = object.as_dict() {
            match name_of(dict, b"Type") {
                Some(b"Pages") => return Object::Reference(self.pages_id),
                Some(b"Page") => {
                    return match self.copy_page(id) {
                        Ok(new_id) => Object::Reference(new_id),
                        Err(_) => Object::Null,
                    };
                }
                _ => {}
            }
        }

        let new_id = self.target.new_object_id();
        self.copied.insert(id, new_id);
        let copy = self.copy_object(object, depth + 1);
        self.target.objects.insert(new_id, copy);
        Object::Reference(new_id)
    }

    fn copy_object(&mut self, object: &Object, depth: usize) -> Object {
        if depth > MAX_NESTING {
            return Object::Null;
        }

        match object {
            Object::Reference(id) => self.copy_ref(*id, depth),
            Object::Name(name) if is_keyword(name) => Object::Null,
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .filter(|item| !matches!(item, Object::Name(name) if is_keyword(name)))
                    .map(|item| self.copy_object(item, depth + 1))
                    .collect(),
            ),
            Object::Dictionary(dict) if is_active_content(dict) => Object::Null,
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dict(dict, depth)),
            Object::Stream(stream) if is_active_content(&stream.dict) => Object::Null,
            Object::Stream(stream) => {
                let mut dict = self.copy_dict(&stream.dict, depth);
                dict.set("Length", stream.content.len() as i64);
                Object::Stream(Stream::new(dict, stream.content.clone()))
            }
            other => other.clone(),
        }
    }

    fn copy_dict(&mut self, dict: &Dictionary, depth: usize) -> Dictionary {
        let annotation = is_annotation(dict);
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if is_keyword(key) || (annotation && key.as_slice() == b"A") {
                continue;
            }
            let value = self.copy_object(value, depth + 1);
            copy.set(key.clone(), value);
        }
        copy
    }

    fn finish(mut self, kids: Vec<ObjectId>) -> Document {
        let count = kids.len() as i64;
        let kids: Vec<Object> = kids.into_iter().map(Object::Reference).collect();
        self.target.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.target.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.target.trailer.set("Root", catalog_id);
        self.target
    }
}

impl ContentSanitizer for PdfSanitizer {
    fn kind(&self) -> ContentKind {
        ContentKind::Pdf
    }

    fn sanitize(&self, content: &StagedContent) -> Result<SanitizeOutcome, SanitizeError> {
        let data = content.to_bytes()?;
        let source =
            Document::load_mem(&data).map_err(|e| SanitizeError::PdfParse(e.to_string()))?;

        let keywords = count_keywords(&source);
        if keywords == 0 {
            tracing::debug!(size_bytes = data.len(), "PDF has no obfuscation keywords");
            return Ok(SanitizeOutcome::Unchanged);
        }

        let pages = source.get_pages();
        let mut copier = PageCopier::new(&source);
        let mut kids = Vec::with_capacity(pages.len());

        for (number, page_id) in &pages {
            match copier.copy_page(*page_id) {
                Ok(new_id) => kids.push(new_id),
                Err(e) => {
                    tracing::warn!(page = *number, error = %e, "Skipping PDF page that cannot be copied");
                }
            }
        }

        if kids.is_empty() {
            return Err(SanitizeError::NoCopyablePages);
        }

        let dropped_links = copier.dropped_links;
        let copied_pages = kids.len();
        let mut rebuilt = copier.finish(kids);

        let mut output = Vec::with_capacity(data.len());
        rebuilt
            .save_to(&mut output)
            .map_err(|e| SanitizeError::PdfWrite(e.to_string()))?;

        tracing::info!(
            keywords,
            pages = pages.len(),
            copied_pages,
            dropped_links,
            input_bytes = data.len(),
            output_bytes = output.len(),
            "PDF rebuilt without active content"
        );

        Ok(SanitizeOutcome::Rewritten(Bytes::from(output)))
    }
}
