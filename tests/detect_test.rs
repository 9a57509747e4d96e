use figma_sync_engine::detect::image::{
    detect_image, png_dimensions, sniff_dimensions, svg_dimensions, ImageFormat,
};

fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut header = vec![0u8; 33];
    header[0..8].copy_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    // IHDR length = 13, type = "IHDR"
    header[8..12].copy_from_slice(&13u32.to_be_bytes());
    header[12..16].copy_from_slice(b"IHDR");
    header[16..20].copy_from_slice(&width.to_be_bytes());
    header[20..24].copy_from_slice(&height.to_be_bytes());
    header
}

#[test]
fn test_detect_png() {
    assert_eq!(detect_image(&png_header(1, 1)), ImageFormat::Png);
}

#[test]
fn test_detect_svg_after_declaration() {
    let svg = b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<svg width=\"10\" height=\"10\"/>";
    assert_eq!(detect_image(svg), ImageFormat::Svg);
}

#[test]
fn test_detect_unknown() {
    assert_eq!(detect_image(b"GIF89a......"), ImageFormat::Unknown);
    assert_eq!(detect_image(&[]), ImageFormat::Unknown);
}

#[test]
fn test_png_dimensions() {
    assert_eq!(png_dimensions(&png_header(640, 480)), Some((640, 480)));
    assert_eq!(sniff_dimensions(&png_header(3, 7)), Some((3, 7)));

    // Truncated header.
    assert_eq!(png_dimensions(&png_header(640, 480)[..20]), None);
}

#[test]
fn test_svg_dimensions_from_attributes() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" stroke-width="3" width="24.5px" height="12">"#;
    assert_eq!(svg_dimensions(svg), Some((25, 12)));
}

#[test]
fn test_svg_dimensions_from_view_box() {
    let svg = r#"<svg viewBox="0 0 48 32.2" width="100%"><rect/></svg>"#;
    assert_eq!(svg_dimensions(svg), Some((48, 33)));
}

#[test]
fn test_svg_without_size() {
    assert_eq!(svg_dimensions("<svg><rect/></svg>"), None);
}

#[test]
fn test_svg_detected_when_cut_splits_a_character() {
    let mut svg = String::from(r#"<svg width="10" height="20"><desc>"#);
    while svg.len() < 1023 {
        svg.push('a');
    }
    svg.push('é');
    svg.push_str("</desc></svg>");
    assert!(!svg.is_char_boundary(1024));

    assert_eq!(detect_image(svg.as_bytes()), ImageFormat::Svg);
    assert_eq!(sniff_dimensions(svg.as_bytes()), Some((10, 20)));
}
