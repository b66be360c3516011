//! Text formatting for the exploration report
//!
//! Formats UUIDs, property flags, raw values and durations the way the
//! report prints them.

use std::fmt::Write as _;
use std::time::Duration;
use uuid::Uuid;

use crate::gatt::constants::BLUETOOTH_BASE_UUID;
use btleplug::api::CharPropFlags;

/// Letters for each property bit, in report order
const PROPERTY_LETTERS: [(CharPropFlags, char); 8] = [
    (CharPropFlags::BROADCAST, 'B'),
    (CharPropFlags::READ, 'R'),
    (CharPropFlags::WRITE_WITHOUT_RESPONSE, 'w'),
    (CharPropFlags::WRITE, 'W'),
    (CharPropFlags::NOTIFY, 'N'),
    (CharPropFlags::INDICATE, 'I'),
    (CharPropFlags::AUTHENTICATED_SIGNED_WRITES, 'S'),
    (CharPropFlags::EXTENDED_PROPERTIES, 'E'),
];

/// Format a UUID as compact lowercase hex.
///
/// SIG assigned 16-bit UUIDs print in their short form (`2a05`), anything
/// else as 32 hex digits without dashes.
pub fn uuid_string(uuid: &Uuid) -> String {
    let value = uuid.as_u128();
    let base_mask: u128 = (1 << 96) - 1;
    let short = value >> 96;

    if value & base_mask == BLUETOOTH_BASE_UUID & base_mask && short <= 0xffff {
        format!("{:04x}", short)
    } else {
        format!("{:032x}", value)
    }
}

/// Property flags as letters, e.g. `RN` for read + notify
pub fn prop_string(props: CharPropFlags) -> String {
    PROPERTY_LETTERS
        .iter()
        .filter(|(bit, _)| props.contains(*bit))
        .map(|(_, letter)| *letter)
        .collect()
}

/// Attribute handle as `0xHH`, or `--` when the host stack hides handles
pub fn handle_string(handle: Option<u16>) -> String {
    match handle {
        Some(h) => format!("0x{:02X}", h),
        None => "--".to_string(),
    }
}

/// Lowercase hex without separators (`0a1b`)
pub fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// Uppercase hex without separators (`0A1B`)
pub fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02X}", b);
        s
    })
}

/// Uppercase hex separated by spaces (`0A 1B`)
pub fn hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote raw bytes as a double-quoted string.
///
/// Printable UTF-8 is kept as is, control characters use C escapes or
/// `\xNN`, and bytes that are not valid UTF-8 are written as `\xNN`.
pub fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');

    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                quote_str_into(valid, &mut out);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // valid_up_to() guarantees this prefix decodes
                quote_str_into(std::str::from_utf8(valid).unwrap_or_default(), &mut out);

                let bad = e.error_len().unwrap_or(after.len());
                for b in &after[..bad] {
                    let _ = write!(out, "\\x{:02x}", b);
                }
                rest = &after[bad..];
            }
        }
    }

    out.push('"');
    out
}

fn quote_str_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c if (c as u32) < 0x20 || c == '\x7f' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

/// Format a duration in compact form: `0s`, `500ms`, `5s`, `1m30s`, `1h0m0s`
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", with_fraction(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", with_fraction(nanos, 1_000_000));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let sec_nanos = nanos % 60_000_000_000;

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{}h", hours);
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{}m", minutes);
    }
    let _ = write!(out, "{}s", with_fraction(sec_nanos, 1_000_000_000));
    out
}

/// `value / unit` with the remainder as trimmed decimal digits
fn with_fraction(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }

    let width = unit.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
