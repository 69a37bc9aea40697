//! Number and string coercion helpers with Lua semantics.

/// Parse a string as a Lua number: surrounding whitespace allowed, decimal
/// with optional sign and exponent, or `0x` hexadecimal integers. The only
/// sign allowed is the one in front of the `0x` prefix.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, unsigned) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // Hex integers wrap around modulo 2^64.
        let bits = hex.chars().fold(0u64, |acc, c| {
            acc.wrapping_mul(16)
                .wrapping_add(u64::from(c.to_digit(16).unwrap_or(0)))
        });
        let i = bits as i64 as f64;
        return Some(if negative { -i } else { i });
    }
    // Rust accepts "inf" and "nan" spellings; Lua does not.
    if !unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Interpret a number as an array slot: integral and at least 1.
pub fn array_index(f: f64) -> Option<usize> {
    if f >= 1.0 && f <= MAX_ARRAY_KEY && f.fract() == 0.0 {
        Some(f as usize)
    } else {
        None
    }
}

/// Largest integral double that round-trips through usize exactly.
const MAX_ARRAY_KEY: f64 = 9_007_199_254_740_992.0;

/// Format a number using Lua's `%.14g`-like format.
pub fn format_number(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{}", f as i64);
    }
    let exponent = f.abs().log10().floor() as i32;
    if !(-4..14).contains(&exponent) {
        let s = format!("{:.13e}", f);
        let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "0"));
        let mantissa = trim_fraction(mantissa);
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (13 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, f)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// PUC Lua compatible string hash (luaS_hash).
pub fn string_hash(bytes: &[u8]) -> u32 {
    let len = bytes.len();
    let mut h = len as u32;
    let step = (len >> 5) + 1;
    let mut i = len;
    while i >= step {
        h ^= (h << 5).wrapping_add(h >> 2).wrapping_add(bytes[i - 1] as u32);
        i -= step;
    }
    h
}
