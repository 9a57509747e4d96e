// Pre-parse filter that drops bulky manifest members nobody downstream reads.

/// Remove every `"property": { ... }` member from a JSON text.
///
/// The removal is anchored at the comma preceding the key so the surrounding
/// object stays well formed; when the member is the first one in its object
/// the trailing comma is consumed instead. Only object values are removed.
pub fn cut_json(json: &str, property: &str) -> String {
    let needle = format!("\"{}\"", property);
    let mut out = json.to_string();
    let mut search_from = 0;

    while let Some(rel) = out[search_from..].find(&needle) {
        let key_at = search_from + rel;
        let bytes = out.as_bytes();

        let mut i = skip_ws(bytes, key_at + needle.len());
        if bytes.get(i) != Some(&b':') {
            search_from = key_at + needle.len();
            continue;
        }
        i = skip_ws(bytes, i + 1);
        if bytes.get(i) != Some(&b'{') {
            search_from = key_at + needle.len();
            continue;
        }
        let Some(close) = matching_brace(bytes, i) else {
            break;
        };

        let mut start = key_at;
        let mut j = key_at;
        while j > 0 {
            j -= 1;
            match bytes[j] {
                b' ' | b'\n' | b'\r' | b'\t' => continue,
                b',' => {
                    start = j;
                    break;
                }
                _ => break,
            }
        }

        let mut stop = close + 1;
        if start == key_at {
            let k = skip_ws(bytes, stop);
            if bytes.get(k) == Some(&b',') {
                stop = k + 1;
            }
        }

        out.replace_range(start..stop, "");
        search_from = start;
    }

    out
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\n' | b'\r' | b'\t') {
        i += 1;
    }
    i
}

/// Index of the `}` closing the object that opens at `open`. Braces inside
/// string literals do not count.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[open..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
