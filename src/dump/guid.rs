//! NodeGUID normalization shared by the topology lookup and every analyzer.
//!
//! Canonical form: lowercase, `0x`-prefixed, no leading zeros (Rust's `{:#x}`
//! formatting of a `u64` already produces this). Invalid input is returned
//! lowercased rather than rejected, matching the source tool's permissive
//! behavior — `PortNumber`/`NodeGUID` columns in ibdiagnet dumps are not
//! schema-validated (spec.md Non-goal (d)).

const MAX_HEX_DIGITS: usize = 32;

/// Normalize a raw `NodeGUID` cell into canonical `0x...` form.
///
/// Empty / `na` / `none` / `null` (case-insensitive) normalize to `""`.
/// Anything that doesn't parse as hex or decimal is returned lowercased,
/// unchanged otherwise.
pub fn normalize_guid(raw: &str) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return String::new();
    }
    let lower = text.to_ascii_lowercase();
    if matches!(lower.as_str(), "na" | "none" | "null") {
        return String::new();
    }

    if let Some(hex_part) = lower.strip_prefix("0x") {
        if !hex_part.is_empty() && hex_part.len() <= MAX_HEX_DIGITS && is_hex(hex_part) {
            if let Ok(value) = u64::from_str_radix(hex_part, 16) {
                return format!("{:#x}", value);
            }
        }
        return lower;
    }

    if !lower.is_empty() && lower.len() <= MAX_HEX_DIGITS && is_hex(&lower) {
        if let Ok(value) = u64::from_str_radix(&lower, 16) {
            return format!("{:#x}", value);
        }
    }

    if lower.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(value) = lower.parse::<u64>() {
            return format!("{:#x}", value);
        }
    }

    lower
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Coerce a `PortNumber` cell: empty/NaN becomes `None`, else `int(float(x))`.
pub fn parse_port_number(raw: &str) -> Option<u32> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(v) = text.parse::<u32>() {
        return Some(v);
    }
    text.parse::<f64>().ok().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_hex_prefixed() {
        assert_eq!(normalize_guid("0XE8EBD30300723915"), "0xe8ebd30300723915");
    }

    #[test]
    fn normalizes_bare_hex() {
        assert_eq!(normalize_guid("e8ebd30300723915"), "0xe8ebd30300723915");
    }

    #[test]
    fn normalizes_decimal() {
        assert_eq!(normalize_guid("255"), "0xff");
    }

    #[test]
    fn empty_and_sentinels_become_empty_string() {
        for v in ["", "  ", "na", "NA", "None", "NULL"] {
            assert_eq!(normalize_guid(v), "");
        }
    }

    #[test]
    fn invalid_input_lowercased() {
        assert_eq!(normalize_guid("Node-42!"), "node-42!");
    }

    #[test]
    fn overlong_hex_falls_back_to_lowercase() {
        let raw = "0x".to_string() + &"f".repeat(40);
        assert_eq!(normalize_guid(&raw), raw.to_ascii_lowercase());
    }

    #[test]
    fn idempotent() {
        // P1: normalize(normalize(x)) == normalize(x)
        for v in ["0xAB12", "4096", "garbage-guid", "", "na"] {
            let once = normalize_guid(v);
            let twice = normalize_guid(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn port_number_parsing() {
        assert_eq!(parse_port_number("3"), Some(3));
        assert_eq!(parse_port_number("3.0"), Some(3));
        assert_eq!(parse_port_number(""), None);
        assert_eq!(parse_port_number("nan"), None);
    }
}
