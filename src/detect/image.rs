#[derive(Debug, PartialEq)]
pub enum ImageFormat {
    Png,
    Svg,
    Unknown,
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Detect the image format from the first bytes of a file.
pub fn detect_image(header: &[u8]) -> ImageFormat {
    if header.len() >= 8 && header[0..8] == PNG_SIGNATURE {
        return ImageFormat::Png;
    }

    // SVG: an `<svg` element somewhere in the leading text (after an XML
    // declaration, comments or a doctype).
    let head = &header[..header.len().min(1024)];
    // The cut may land inside a multi-byte character; keep the valid prefix.
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default(),
    };
    if text.trim_start().starts_with('<') && text.contains("<svg") {
        return ImageFormat::Svg;
    }

    ImageFormat::Unknown
}

/// Width and height from a PNG `IHDR` chunk, which must directly follow the signature.
pub fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || data[0..8] != PNG_SIGNATURE || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

/// Pixel size of an SVG document from its root element: `width`/`height`
/// when both are plain numbers (optionally `px`), otherwise the `viewBox`.
/// Fractional sizes are rounded up.
pub fn svg_dimensions(text: &str) -> Option<(u32, u32)> {
    let start = text.find("<svg")?;
    let end = start + text[start..].find('>')?;
    let tag = &text[start + 4..end];

    let length = |name: &str| {
        attribute(tag, name)
            .map(|v| v.trim().trim_end_matches("px"))
            .and_then(|v| v.parse::<f64>().ok())
    };
    if let (Some(w), Some(h)) = (length("width"), length("height")) {
        return Some((ceil_px(w), ceil_px(h)));
    }

    let view_box = attribute(tag, "viewBox")?;
    let parts: Vec<f64> = view_box
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.parse().ok())
        .collect();
    match parts.as_slice() {
        [_, _, w, h] => Some((ceil_px(*w), ceil_px(*h))),
        _ => None,
    }
}

/// Dimensions of any supported image.
pub fn sniff_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    match detect_image(data) {
        ImageFormat::Png => png_dimensions(data),
        ImageFormat::Svg => svg_dimensions(&String::from_utf8_lossy(data)),
        ImageFormat::Unknown => None,
    }
}

fn ceil_px(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.ceil() as u32
    } else {
        0
    }
}

/// Value of attribute `name` inside an element's attribute text.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = tag;
    while let Some(pos) = rest.find(name) {
        let preceded_by_space = rest[..pos]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after = rest[pos + name.len()..].trim_start();
        if preceded_by_space {
            if let Some(value) = after.strip_prefix('=') {
                let value = value.trim_start();
                let quote = value.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let body = &value[1..];
                    return body.find(quote).map(|close| &body[..close]);
                }
            }
        }
        rest = &rest[pos + name.len()..];
    }
    None
}
