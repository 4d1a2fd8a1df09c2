// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Splitting signed payloads from their signature envelopes.
//!
//! Two distribution shapes carry a signature: collection JSON documents with
//! an inline `signature` object, and manifest files with a trailing
//! `// signature:` comment line. Both splitters return the exact payload
//! bytes that were signed — a byte-exact slice of the input, never a
//! re-serialization — since verification must run over precisely the bytes
//! the signer hashed.

use {crate::ModelError, base64::Engine};

/// A signature extracted from a manifest's trailing comment envelope.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvelopeSignature {
    pub format_id: String,
    pub signature: Vec<u8>,
}

/// Marker byte sequence a manifest envelope's trailing line begins with.
const MANIFEST_MARKER: &str = "// signature:";

/// Split a manifest's trailing `\n// signature: <format-id>;<base64>\n` line
/// from its payload.
///
/// The marker must begin at column 0 of its line; the last such occurrence
/// wins, so a payload that itself happens to contain the marker text earlier
/// in the file is unaffected. A missing trailing newline after the marker
/// line is tolerated, per the open question in the design notes.
pub fn split_manifest_envelope(data: &[u8]) -> crate::Result<(&[u8], EnvelopeSignature)> {
    let text = std::str::from_utf8(data)
        .map_err(|_| ModelError::MalformedEnvelope("manifest is not valid UTF-8".into()))?;

    let marker_start = find_last_line_start_marker(text, MANIFEST_MARKER).ok_or_else(|| {
        ModelError::MalformedEnvelope("no `// signature:` line found".into())
    })?;

    let line_rest = &text[marker_start + MANIFEST_MARKER.len()..];
    let line_rest = line_rest.strip_suffix('\n').unwrap_or(line_rest);
    let line_rest = line_rest.trim();

    let (format_id, b64) = line_rest
        .split_once(';')
        .ok_or_else(|| ModelError::MalformedEnvelope("signature line missing `;` separator".into()))?;

    let signature = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| ModelError::MalformedEnvelope(format!("invalid base64 signature: {e}")))?;

    let payload_bytes = if marker_start > 0 && data[marker_start - 1] == b'\n' {
        &data[..marker_start - 1]
    } else {
        &data[..marker_start]
    };

    Ok((
        payload_bytes,
        EnvelopeSignature {
            format_id: format_id.to_string(),
            signature,
        },
    ))
}

/// Find the byte offset of the last occurrence of `marker` that begins at
/// column 0 of its line.
fn find_last_line_start_marker(text: &str, marker: &str) -> Option<usize> {
    let mut found = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.strip_suffix('\n').unwrap_or(line);
        if trimmed.starts_with(marker) {
            found = Some(offset);
        }
        offset += line.len();
    }

    found
}

/// Split a collection JSON document carrying an inline `signature` object
/// from the payload used to verify it.
///
/// The `signature` key and its value are located by scanning the raw bytes
/// (tracking string/escape state and bracket depth, the same way
/// [split_manifest_envelope] locates its marker) rather than by parsing and
/// re-serializing the document, so the returned payload is a byte-exact
/// slice of `data` with only the `"signature": ...` member and one adjacent
/// comma removed. Key order, whitespace, and number formatting elsewhere in
/// the document are preserved exactly.
pub fn split_signed_json(data: &[u8]) -> crate::Result<(Vec<u8>, Option<crate::Signature>)> {
    let object_open = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .filter(|&i| data[i] == b'{')
        .ok_or_else(|| ModelError::MalformedEnvelope("signed collection document is not a JSON object".into()))?;

    match locate_top_level_key(data, object_open, "signature")? {
        None => Ok((data.to_vec(), None)),
        Some(span) => {
            let signature = serde_json::from_slice(&data[span.value_start..span.value_end])?;

            let mut payload = Vec::with_capacity(data.len());
            payload.extend_from_slice(&data[..span.removal_start]);
            payload.extend_from_slice(&data[span.removal_end..]);

            Ok((payload, Some(signature)))
        }
    }
}

/// Byte range of a located top-level object member: `removal_start..removal_end`
/// is what to cut out of the document (the member plus its separating comma),
/// `value_start..value_end` is the member's value alone.
struct KeySpan {
    removal_start: usize,
    removal_end: usize,
    value_start: usize,
    value_end: usize,
}

/// Scan the JSON object opening at `object_open` for a top-level member named
/// `key`, without recursing into nested objects/arrays.
fn locate_top_level_key(data: &[u8], object_open: usize, key: &str) -> crate::Result<Option<KeySpan>> {
    let malformed = |msg: &str| ModelError::MalformedEnvelope(msg.to_string());

    let mut i = object_open + 1;
    let mut preceding_comma: Option<usize> = None;

    loop {
        let key_start = skip_json_ws(data, i);
        match data.get(key_start) {
            Some(b'}') => return Ok(None),
            Some(b'"') => {}
            _ => return Err(malformed("expected a JSON object key")),
        }

        let key_text_start = key_start + 1;
        let key_text_end = find_json_string_end(data, key_text_start)?;
        let key_end = key_text_end + 1;
        let matched = data[key_text_start..key_text_end] == *key.as_bytes();

        let colon = skip_json_ws(data, key_end);
        if data.get(colon) != Some(&b':') {
            return Err(malformed("expected `:` after object key"));
        }
        let value_start = skip_json_ws(data, colon + 1);
        let value_end = json_value_end(data, value_start)?;

        if matched {
            let (removal_start, removal_end) = match preceding_comma {
                Some(comma_idx) => (comma_idx, value_end),
                None => {
                    let after_value = skip_json_ws(data, value_end);
                    if data.get(after_value) == Some(&b',') {
                        (key_start, after_value + 1)
                    } else {
                        (key_start, value_end)
                    }
                }
            };
            return Ok(Some(KeySpan {
                removal_start,
                removal_end,
                value_start,
                value_end,
            }));
        }

        let after_value = skip_json_ws(data, value_end);
        match data.get(after_value) {
            Some(b',') => {
                preceding_comma = Some(after_value);
                i = after_value + 1;
            }
            Some(b'}') => return Ok(None),
            _ => return Err(malformed("expected `,` or `}` after object value")),
        }
    }
}

/// End (exclusive) of the JSON value starting at `start`: the index after a
/// matching closing bracket/quote, or the first terminator byte for a bare
/// primitive (number, `true`, `false`, `null`).
fn json_value_end(data: &[u8], start: usize) -> crate::Result<usize> {
    match data.get(start) {
        Some(b'{') | Some(b'[') => {
            let mut depth = 1i32;
            let mut i = start + 1;
            let mut in_string = false;
            let mut escaped = false;
            while i < data.len() {
                let b = data[i];
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        in_string = false;
                    }
                } else {
                    match b {
                        b'"' => in_string = true,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(i + 1);
                            }
                        }
                        _ => {}
                    }
                }
                i += 1;
            }
            Err(ModelError::MalformedEnvelope("unterminated JSON object or array".into()))
        }
        Some(b'"') => Ok(find_json_string_end(data, start + 1)? + 1),
        Some(_) => {
            let mut i = start;
            while i < data.len() && !matches!(data[i], b',' | b'}' | b']') && !data[i].is_ascii_whitespace() {
                i += 1;
            }
            if i == start {
                Err(ModelError::MalformedEnvelope("expected a JSON value".into()))
            } else {
                Ok(i)
            }
        }
        None => Err(ModelError::MalformedEnvelope("expected a JSON value".into())),
    }
}

/// Index of the closing quote of a JSON string whose contents start at
/// `text_start` (just past the opening quote).
fn find_json_string_end(data: &[u8], text_start: usize) -> crate::Result<usize> {
    let mut i = text_start;
    let mut escaped = false;
    while i < data.len() {
        let b = data[i];
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            return Ok(i);
        }
        i += 1;
    }
    Err(ModelError::MalformedEnvelope("unterminated JSON string".into()))
}

fn skip_json_ws(data: &[u8], mut i: usize) -> usize {
    while i < data.len() && data[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_envelope_round_trips() {
        let payload = b"{\"name\":\"C\"}";
        let mut data = payload.to_vec();
        data.extend_from_slice(b"\n// signature: cms;YWJj\n");

        let (split_payload, sig) = split_manifest_envelope(&data).unwrap();
        assert_eq!(split_payload, payload);
        assert_eq!(sig.format_id, "cms");
        assert_eq!(sig.signature, b"abc");
    }

    #[test]
    fn manifest_envelope_tolerates_missing_trailing_newline() {
        let payload = b"{\"name\":\"C\"}";
        let mut data = payload.to_vec();
        data.extend_from_slice(b"\n// signature: cms;YWJj");

        let (split_payload, sig) = split_manifest_envelope(&data).unwrap();
        assert_eq!(split_payload, payload);
        assert_eq!(sig.format_id, "cms");
    }

    #[test]
    fn manifest_envelope_uses_last_marker_at_column_zero() {
        let data = b"payload // signature: not-this;AAAA\nmore payload\n// signature: cms;YWJj\n";
        let (split_payload, sig) = split_manifest_envelope(data).unwrap();
        assert_eq!(split_payload, b"payload // signature: not-this;AAAA\nmore payload");
        assert_eq!(sig.format_id, "cms");
    }

    #[test]
    fn manifest_envelope_whitespace_mutation_changes_payload() {
        let payload = b"{\"name\":\"C\"}";
        let mut data = payload.to_vec();
        data.extend_from_slice(b"\n// signature: cms;YWJj\n");

        let (split_payload, _) = split_manifest_envelope(&data).unwrap();

        let mut mutated = b" ".to_vec();
        mutated.extend_from_slice(split_payload);
        assert_ne!(mutated, payload);
    }

    #[test]
    fn missing_envelope_is_an_error() {
        assert!(split_manifest_envelope(b"{\"name\":\"C\"}").is_err());
    }

    #[test]
    fn signed_json_preserves_original_byte_layout_with_signature_last() {
        let data = br#"{
  "packages":   [],
  "name": "C",
  "formatVersion": "v1_0",
  "generatedAt": "2024-01-01T00:00:00Z",
  "signature": { "signature": "YWJj", "certificate": { "subject": {}, "issuer": {} } }
}"#;

        let (payload, signature) = split_signed_json(data).unwrap();
        let signature = signature.unwrap();
        assert_eq!(signature.signature, "YWJj");

        let expected = br#"{
  "packages":   [],
  "name": "C",
  "formatVersion": "v1_0",
  "generatedAt": "2024-01-01T00:00:00Z"
}"#;
        assert_eq!(payload, expected);

        // The spliced payload must itself still be well-formed, byte-exact JSON.
        serde_json::from_slice::<serde_json::Value>(&payload).unwrap();
    }

    #[test]
    fn signed_json_preserves_original_byte_layout_with_signature_first() {
        let data = br#"{"signature":{"signature":"YWJj","certificate":{"subject":{},"issuer":{}}},"name":"C","packages":[],"formatVersion":"v1_0","generatedAt":"2024-01-01T00:00:00Z"}"#;

        let (payload, signature) = split_signed_json(data).unwrap();
        assert!(signature.is_some());

        let expected = br#"{"name":"C","packages":[],"formatVersion":"v1_0","generatedAt":"2024-01-01T00:00:00Z"}"#;
        assert_eq!(payload, expected);
    }

    #[test]
    fn signed_json_does_not_reserialize_the_payload() {
        // Key order here (`packages` before `name`) differs from this crate's
        // own derived `Serialize` field order, which would emit `name` first.
        // A round trip through `serde_json::to_vec` would silently fix that
        // up; a byte-exact slice must not.
        let data = br#"{"packages":[],"name":"C","formatVersion":"v1_0","generatedAt":"2024-01-01T00:00:00Z","signature":{"signature":"YWJj","certificate":{"subject":{},"issuer":{}}}}"#;

        let (payload, _) = split_signed_json(data).unwrap();
        let expected = br#"{"packages":[],"name":"C","formatVersion":"v1_0","generatedAt":"2024-01-01T00:00:00Z"}"#;
        assert_eq!(payload, expected);
    }

    #[test]
    fn signed_json_without_signature_returns_original_bytes_unchanged() {
        let data = br#"{"name":"C","packages":[],"formatVersion":"v1_0","generatedAt":"2024-01-01T00:00:00Z"}"#;

        let (payload, signature) = split_signed_json(data).unwrap();
        assert!(signature.is_none());
        assert_eq!(payload, data);
    }

    #[test]
    fn signed_json_rejects_non_object_document() {
        assert!(split_signed_json(b"[1, 2, 3]").is_err());
    }
}
