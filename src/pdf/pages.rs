//! Page dictionary edits: rotation and text watermarks

use crate::error::{Error, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Angles accepted by [`rotate_pages`]
pub const VALID_ANGLES: [i64; 6] = [90, 180, 270, -90, -180, -270];

const FONT_RESOURCE: &str = "OnxWmFont";
const GSTATE_RESOURCE: &str = "OnxWmGs";
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Text watermark settings
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkOptions {
    pub text: String,
    /// Fill opacity in [0, 1]
    pub opacity: f32,
    pub font_size: f32,
    /// `#rrggbb`
    pub color: String,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            text: "WATERMARK".to_string(),
            opacity: 0.3,
            font_size: 50.0,
            color: "#888888".to_string(),
        }
    }
}

impl WatermarkOptions {
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::validation("Watermark text must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(Error::validation("opacity must be between 0 and 1"));
        }
        if !(1.0..=500.0).contains(&self.font_size) {
            return Err(Error::validation("fontSize must be between 1 and 500"));
        }
        parse_hex_color(&self.color)?;
        Ok(())
    }
}

/// Parse `#rrggbb` (leading `#` optional) into RGB components in [0, 1]
pub fn parse_hex_color(color: &str) -> Result<[f32; 3]> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::validation(format!(
            "Invalid color '{}', expected #rrggbb",
            color
        )));
    }

    let mut rgb = [0.0f32; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| Error::validation(format!("Invalid color '{}'", color)))?;
        *channel = byte as f32 / 255.0;
    }
    Ok(rgb)
}

fn load(data: &[u8]) -> Result<Document> {
    Document::load_mem(data).map_err(|e| Error::InvalidPdf {
        reason: e.to_string(),
    })
}

fn save(mut doc: Document) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// Look up a page attribute, walking up the page tree for inherited keys
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);
    // Page trees are shallow; the bound stops cycles in malformed files
    for _ in 0..32 {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(doc: &Document, object: &Object) -> Option<f32> {
    resolve(doc, object).as_float().ok()
}

/// Effective `/Rotate` of every page, in page order
pub fn page_rotations(data: &[u8]) -> Result<Vec<i64>> {
    let doc = load(data)?;
    Ok(doc
        .get_pages()
        .values()
        .map(|&id| {
            inherited_attribute(&doc, id, b"Rotate")
                .and_then(|o| number(&doc, &o))
                .map(|r| r as i64)
                .unwrap_or(0)
        })
        .collect())
}

/// Add `angle` degrees to the rotation of the selected pages.
///
/// `pages` holds 1-indexed page numbers; `None` selects every page.
pub fn rotate_pages(data: &[u8], angle: i64, pages: Option<&[u32]>) -> Result<Vec<u8>> {
    if !VALID_ANGLES.contains(&angle) {
        return Err(Error::validation(format!(
            "Invalid angle {}. Use one of: 90, 180, 270, -90, -180, -270",
            angle
        )));
    }

    let mut doc = load(data)?;
    let page_ids = doc.get_pages();

    for (page_num, page_id) in page_ids {
        if let Some(selected) = pages {
            if !selected.contains(&page_num) {
                continue;
            }
        }

        let current = inherited_attribute(&doc, page_id, b"Rotate")
            .and_then(|o| number(&doc, &o))
            .map(|r| r as i64)
            .unwrap_or(0);
        let rotation = (current + angle).rem_euclid(360);

        doc.get_dictionary_mut(page_id)?
            .set("Rotate", Object::Integer(rotation));
    }

    save(doc)
}

/// Draw `options.text` diagonally across every page
pub fn add_watermark(data: &[u8], options: &WatermarkOptions) -> Result<Vec<u8>> {
    options.validate()?;
    let [r, g, b] = parse_hex_color(&options.color)?;

    let mut doc = load(data)?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let gstate_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => options.opacity,
        "CA" => options.opacity,
    });
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));

    let text = encode_win_ansi(&options.text);
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for page_id in page_ids {
        let [x0, y0, x1, y1] = media_box(&doc, page_id);
        let (width, height) = (x1 - x0, y1 - y0);

        let resources = page_resources(&doc, page_id, font_id, gstate_id);

        let (sin, cos) = (-45f32).to_radians().sin_cos();
        let content = Content {
            operations: vec![
                Operation::new("Q", vec![]),
                Operation::new("q", vec![]),
                Operation::new("gs", vec![Object::Name(GSTATE_RESOURCE.into())]),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(FONT_RESOURCE.into()), options.font_size.into()],
                ),
                Operation::new(
                    "Tm",
                    vec![
                        cos.into(),
                        sin.into(),
                        (-sin).into(),
                        cos.into(),
                        (x0 + width / 4.0).into(),
                        (y0 + height / 2.0).into(),
                    ],
                ),
                Operation::new("Tj", vec![Object::String(text.clone(), StringFormat::Literal)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };
        let overlay_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let mut contents: Vec<Object> = vec![save_id.into()];
        contents.extend(doc.get_page_contents(page_id).into_iter().map(Object::from));
        contents.push(overlay_id.into());

        let page = doc.get_dictionary_mut(page_id)?;
        page.set("Resources", resources);
        page.set("Contents", contents);
    }

    save(doc)
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(object) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let Ok(values) = resolve(doc, &object).as_array() else {
        return DEFAULT_MEDIA_BOX;
    };

    let numbers: Vec<f32> = values.iter().filter_map(|v| number(doc, v)).collect();
    match numbers.as_slice() {
        [x0, y0, x1, y1] => [*x0, *y0, *x1, *y1],
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// Copy of the page's effective resources with the watermark font and
/// graphics state registered
fn page_resources(
    doc: &Document,
    page_id: ObjectId,
    font_id: ObjectId,
    gstate_id: ObjectId,
) -> Dictionary {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|o| resolve(doc, &o).as_dict().ok().cloned())
        .unwrap_or_default();

    let mut fonts = sub_dictionary(doc, &resources, b"Font");
    fonts.set(FONT_RESOURCE, font_id);
    resources.set("Font", fonts);

    let mut states = sub_dictionary(doc, &resources, b"ExtGState");
    states.set(GSTATE_RESOURCE, gstate_id);
    resources.set("ExtGState", states);

    resources
}

fn sub_dictionary(doc: &Document, parent: &Dictionary, key: &[u8]) -> Dictionary {
    parent
        .get(key)
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok().cloned())
        .unwrap_or_default()
}

/// Standard 14 fonts use WinAnsi; anything outside Latin-1 becomes `?`
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
