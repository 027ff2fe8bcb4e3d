//! PAX extended header records.
//!
//! A PAX payload is a sequence of `"<length> <key>=<value>\n"` records
//! where `<length>` counts the whole record including its own decimal
//! digits, the space, the equals sign and the trailing newline.

use std::collections::HashMap;

/// Format one PAX record.
///
/// The length prefix counts its own digits, so the total is computed
/// iteratively until the digit count stabilises.
pub fn format_pax_record(key: &str, value: &str) -> String {
    // " " + "=" + "\n"
    let base_len = key.len() + value.len() + 3;
    let mut total = base_len + 1;
    loop {
        let with_digits = base_len + total.to_string().len();
        if with_digits == total {
            break;
        }
        total = with_digits;
    }
    format!("{total} {key}={value}\n")
}

/// Parse a PAX payload into key/value pairs. Malformed trailing data is
/// ignored, matching the usual reader tolerance.
pub fn parse_pax_data(data: &[u8]) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut pos = 0;

    while pos < data.len() {
        let Some(space) = data[pos..].iter().position(|&b| b == b' ') else {
            break;
        };
        let Ok(record_len) = String::from_utf8_lossy(&data[pos..pos + space])
            .trim()
            .parse::<usize>()
        else {
            break;
        };
        if record_len == 0 || pos + record_len > data.len() {
            break;
        }

        let mut value_end = pos + record_len;
        if data.get(value_end - 1) == Some(&b'\n') {
            value_end -= 1;
        }
        let record = &data[pos + space + 1..value_end];
        if let Some(eq) = record.iter().position(|&b| b == b'=') {
            let key = String::from_utf8_lossy(&record[..eq]).into_owned();
            let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
            attrs.insert(key, value);
        }
        pos += record_len;
    }

    attrs
}

/// Parse a PAX mtime value, which may carry a fractional part.
pub fn parse_pax_mtime(value: &str) -> Option<u64> {
    match value.find('.') {
        Some(dot) => value[..dot].parse().ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_length_counts_itself() {
        let record = format_pax_record("path", "test.txt");
        assert_eq!(record, "17 path=test.txt\n");
        assert_eq!(record.len(), 17);
    }

    #[test]
    fn test_record_length_digit_boundary() {
        // 200-char value pushes the length to three digits, which itself
        // lengthens the record.
        let long = "a".repeat(200);
        let record = format_pax_record("path", &long);
        assert!(record.starts_with("210 path="));
        assert_eq!(record.len(), 210);
    }

    #[test]
    fn test_parse_roundtrip() {
        let mut payload = String::new();
        payload.push_str(&format_pax_record("path", "some/long/path.txt"));
        payload.push_str(&format_pax_record("size", "1234567890"));
        payload.push_str(&format_pax_record("mtime", "1700000000.123"));

        let attrs = parse_pax_data(payload.as_bytes());
        assert_eq!(attrs.get("path").map(String::as_str), Some("some/long/path.txt"));
        assert_eq!(attrs.get("size").map(String::as_str), Some("1234567890"));
        assert_eq!(
            attrs.get("mtime").and_then(|v| parse_pax_mtime(v)),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_parse_tolerates_garbage_tail() {
        let mut payload = format_pax_record("path", "ok.txt").into_bytes();
        payload.extend_from_slice(b"\x00\x00broken");
        let attrs = parse_pax_data(&payload);
        assert_eq!(attrs.get("path").map(String::as_str), Some("ok.txt"));
    }
}
