use anyhow::Result;

/// Decode bytes into UTF-8 String using BOM, charset from Content-Type, or chardetng fallback.
/// Returns error if decoding performed replacements (considered data corruption for our purposes).
pub fn decode_to_utf8(bytes: &[u8], content_type: Option<&str>) -> Result<String> {
    // 1) BOM sniff (covers UTF-8/UTF-16 BOM)
    if let Some((enc, offset)) = encoding_rs::Encoding::for_bom(bytes) {
        let (cow, _used, had_errors) = enc.decode(&bytes[offset..]);
        if had_errors {
            anyhow::bail!("decoding had errors after BOM sniff");
        }
        return Ok(cow.into_owned());
    }

    // 2) Declared charset wins when it decodes cleanly
    if let Some(label) = extract_charset_label(content_type) {
        if let Some(enc) = encoding_rs::Encoding::for_label_no_replacement(label.as_bytes()) {
            let (cow, _used, had_errors) = enc.decode(bytes);
            if !had_errors {
                return Ok(cow.into_owned());
            }
            anyhow::bail!(format!(
                "decoding with declared charset '{}' produced errors",
                label
            ));
        }
    }

    // 3) Guess with chardetng, allowing UTF-8
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    let (cow, _used, had_errors) = enc.decode(bytes);
    if had_errors {
        anyhow::bail!(format!(
            "decoding with detected charset '{}' produced errors",
            enc.name()
        ));
    }
    Ok(cow.into_owned())
}

/// Extracts charset=... value from Content-Type header (case-insensitive) if present.
fn extract_charset_label(content_type: Option<&str>) -> Option<String> {
    let ct = content_type?;
    for part in ct.split(';').skip(1) {
        let kv = part.trim();
        if kv.to_ascii_lowercase().starts_with("charset=") {
            let v = kv[8..].trim().trim_matches('"').trim_matches('\'');
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }
    None
}
