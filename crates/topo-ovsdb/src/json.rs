use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A minimal JSON value, hand-rolled rather than borrowed from the
/// `facet_json`/`facet_value` stack (§4.E "Wire surface"): OVSDB atoms are
/// self-describing tuples (`["uuid", "..."]`, `["set", [...]]`,
/// `["map", [[k, v], ...]]`) that don't correspond to any fixed Rust shape,
/// and the transport itself has no frame length prefix, so message
/// boundaries have to be found by scanning raw JSON anyway.
#[derive(Clone, Debug, PartialEq)]
pub enum Json {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Json>),
    Object(BTreeMap<String, Json>),
}

impl Json {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Json::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Json::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Json]> {
        match self {
            Json::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Json>> {
        match self {
            Json::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// OVSDB encodes a bare UUID reference as `["uuid", "<id>"]`; named sets
    /// and maps follow the same two-element-tuple convention.
    pub fn as_uuid(&self) -> Option<&str> {
        let items = self.as_array()?;
        if items.len() == 2 && items[0].as_str() == Some("uuid") {
            items[1].as_str()
        } else {
            None
        }
    }

    /// A column's `["set", [...]]` encoding, or a single bare atom treated
    /// as a one-element set (OVSDB elides the wrapper when there's exactly
    /// one member).
    pub fn as_ovs_set(&self) -> Vec<&Json> {
        if let Some(items) = self.as_array()
            && items.len() == 2
            && items[0].as_str() == Some("set")
        {
            return items[1].as_array().map(|v| v.iter().collect()).unwrap_or_default();
        }
        vec![self]
    }

    pub fn object(pairs: impl IntoIterator<Item = (String, Json)>) -> Self {
        Json::Object(pairs.into_iter().collect())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Json::String(s.into())
    }
}

impl From<&str> for Json {
    fn from(s: &str) -> Self {
        Json::String(s.to_string())
    }
}

impl From<i64> for Json {
    fn from(n: i64) -> Self {
        Json::Number(n as f64)
    }
}

impl<T: Into<Json>> From<Vec<T>> for Json {
    fn from(items: Vec<T>) -> Self {
        Json::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Parse error covering both "not enough bytes yet" (the caller should read
/// more and retry) and genuine malformed input.
#[derive(Debug)]
pub enum ParseError {
    Incomplete,
    Malformed(String),
}

/// Scan `buf` for the first complete top-level JSON value (object or
/// array), returning the parsed value and the number of bytes it consumed.
/// `Incomplete` means the caller should read more bytes and retry; OVSDB
/// messages are concatenated on the stream with no length framing.
pub fn parse_one(buf: &[u8]) -> Result<(Json, usize), ParseError> {
    let mut pos = skip_ws(buf, 0);
    if pos >= buf.len() {
        return Err(ParseError::Incomplete);
    }
    let value = parse_value(buf, &mut pos)?;
    Ok((value, pos))
}

fn skip_ws(buf: &[u8], mut pos: usize) -> usize {
    while pos < buf.len() && buf[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn parse_value(buf: &[u8], pos: &mut usize) -> Result<Json, ParseError> {
    *pos = skip_ws(buf, *pos);
    let Some(&b) = buf.get(*pos) else {
        return Err(ParseError::Incomplete);
    };
    match b {
        b'{' => parse_object(buf, pos),
        b'[' => parse_array(buf, pos),
        b'"' => parse_string(buf, pos).map(Json::String),
        b't' => parse_literal(buf, pos, "true", Json::Bool(true)),
        b'f' => parse_literal(buf, pos, "false", Json::Bool(false)),
        b'n' => parse_literal(buf, pos, "null", Json::Null),
        b'-' | b'0'..=b'9' => parse_number(buf, pos),
        other => Err(ParseError::Malformed(format!("unexpected byte {other:#x}"))),
    }
}

fn parse_literal(buf: &[u8], pos: &mut usize, literal: &str, value: Json) -> Result<Json, ParseError> {
    let end = *pos + literal.len();
    if end > buf.len() {
        return Err(ParseError::Incomplete);
    }
    if &buf[*pos..end] != literal.as_bytes() {
        return Err(ParseError::Malformed(format!("expected literal {literal}")));
    }
    *pos = end;
    Ok(value)
}

fn parse_number(buf: &[u8], pos: &mut usize) -> Result<Json, ParseError> {
    let start = *pos;
    if buf.get(*pos) == Some(&b'-') {
        *pos += 1;
    }
    while buf.get(*pos).is_some_and(|b| b.is_ascii_digit()) {
        *pos += 1;
    }
    if buf.get(*pos) == Some(&b'.') {
        *pos += 1;
        while buf.get(*pos).is_some_and(|b| b.is_ascii_digit()) {
            *pos += 1;
        }
    }
    if matches!(buf.get(*pos), Some(b'e') | Some(b'E')) {
        *pos += 1;
        if matches!(buf.get(*pos), Some(b'+') | Some(b'-')) {
            *pos += 1;
        }
        while buf.get(*pos).is_some_and(|b| b.is_ascii_digit()) {
            *pos += 1;
        }
    }
    if *pos > buf.len() {
        return Err(ParseError::Incomplete);
    }
    let text = std::str::from_utf8(&buf[start..*pos]).map_err(|e| ParseError::Malformed(e.to_string()))?;
    text.parse::<f64>()
        .map(Json::Number)
        .map_err(|e| ParseError::Malformed(e.to_string()))
}

fn parse_string(buf: &[u8], pos: &mut usize) -> Result<String, ParseError> {
    debug_assert_eq!(buf.get(*pos), Some(&b'"'));
    *pos += 1;
    let mut out = String::new();
    loop {
        let Some(&b) = buf.get(*pos) else {
            return Err(ParseError::Incomplete);
        };
        *pos += 1;
        match b {
            b'"' => return Ok(out),
            b'\\' => {
                let Some(&esc) = buf.get(*pos) else {
                    return Err(ParseError::Incomplete);
                };
                *pos += 1;
                match esc {
                    b'"' => out.push('"'),
                    b'\\' => out.push('\\'),
                    b'/' => out.push('/'),
                    b'n' => out.push('\n'),
                    b't' => out.push('\t'),
                    b'r' => out.push('\r'),
                    b'b' => out.push('\u{8}'),
                    b'f' => out.push('\u{c}'),
                    b'u' => {
                        let end = *pos + 4;
                        if end > buf.len() {
                            return Err(ParseError::Incomplete);
                        }
                        let hex = std::str::from_utf8(&buf[*pos..end])
                            .map_err(|e| ParseError::Malformed(e.to_string()))?;
                        let code = u32::from_str_radix(hex, 16)
                            .map_err(|e| ParseError::Malformed(e.to_string()))?;
                        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        *pos = end;
                    }
                    other => return Err(ParseError::Malformed(format!("bad escape {other:#x}"))),
                }
            }
            other => {
                // Re-assemble multi-byte UTF-8 sequences verbatim.
                let ch_len = utf8_len(other);
                let start = *pos - 1;
                let end = start + ch_len;
                if end > buf.len() {
                    return Err(ParseError::Incomplete);
                }
                let s = std::str::from_utf8(&buf[start..end]).map_err(|e| ParseError::Malformed(e.to_string()))?;
                out.push_str(s);
                *pos = end;
            }
        }
    }
}

fn utf8_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

fn parse_array(buf: &[u8], pos: &mut usize) -> Result<Json, ParseError> {
    debug_assert_eq!(buf.get(*pos), Some(&b'['));
    *pos += 1;
    let mut items = Vec::new();
    loop {
        *pos = skip_ws(buf, *pos);
        match buf.get(*pos) {
            Some(b']') => {
                *pos += 1;
                return Ok(Json::Array(items));
            }
            None => return Err(ParseError::Incomplete),
            _ => {}
        }
        items.push(parse_value(buf, pos)?);
        *pos = skip_ws(buf, *pos);
        match buf.get(*pos) {
            Some(b',') => *pos += 1,
            Some(b']') => {
                *pos += 1;
                return Ok(Json::Array(items));
            }
            None => return Err(ParseError::Incomplete),
            Some(other) => return Err(ParseError::Malformed(format!("expected , or ] got {:#x}", *other))),
        }
    }
}

fn parse_object(buf: &[u8], pos: &mut usize) -> Result<Json, ParseError> {
    debug_assert_eq!(buf.get(*pos), Some(&b'{'));
    *pos += 1;
    let mut map = BTreeMap::new();
    loop {
        *pos = skip_ws(buf, *pos);
        match buf.get(*pos) {
            Some(b'}') => {
                *pos += 1;
                return Ok(Json::Object(map));
            }
            None => return Err(ParseError::Incomplete),
            _ => {}
        }
        let key = parse_string(buf, pos)?;
        *pos = skip_ws(buf, *pos);
        match buf.get(*pos) {
            Some(b':') => *pos += 1,
            None => return Err(ParseError::Incomplete),
            Some(other) => return Err(ParseError::Malformed(format!("expected : got {:#x}", *other))),
        }
        let value = parse_value(buf, pos)?;
        map.insert(key, value);
        *pos = skip_ws(buf, *pos);
        match buf.get(*pos) {
            Some(b',') => *pos += 1,
            Some(b'}') => {
                *pos += 1;
                return Ok(Json::Object(map));
            }
            None => return Err(ParseError::Incomplete),
            Some(other) => return Err(ParseError::Malformed(format!("expected , or }} got {:#x}", *other))),
        }
    }
}

pub fn to_string(value: &Json) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Json) {
    match value {
        Json::Null => out.push_str("null"),
        Json::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Json::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Json::String(s) => write_string(out, s),
        Json::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Json::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, k);
                out.push(':');
                write_value(out, v);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_nested_object() {
        let json = br#"{"a": 1, "b": [true, null, "x\"y"], "c": {"d": -2.5}}"#;
        let (value, consumed) = parse_one(json).unwrap();
        assert_eq!(consumed, json.len());
        assert_eq!(value.get("a").and_then(Json::as_f64), Some(1.0));
        assert_eq!(
            value.get("b").and_then(Json::as_array).map(|a| a.len()),
            Some(3)
        );
        assert_eq!(
            value.get("b").and_then(Json::as_array).unwrap()[2].as_str(),
            Some("x\"y")
        );
        assert_eq!(
            value.get("c").and_then(|c| c.get("d")).and_then(Json::as_f64),
            Some(-2.5)
        );
    }

    #[test]
    fn incomplete_buffer_requests_more_bytes() {
        let json = br#"{"a": [1, 2"#;
        assert!(matches!(parse_one(json), Err(ParseError::Incomplete)));
    }

    #[test]
    fn two_concatenated_values_parse_independently() {
        let json = br#"{"a":1}{"b":2}"#;
        let (first, consumed) = parse_one(json).unwrap();
        assert_eq!(first.get("a").and_then(Json::as_f64), Some(1.0));
        let (second, _) = parse_one(&json[consumed..]).unwrap();
        assert_eq!(second.get("b").and_then(Json::as_f64), Some(2.0));
    }

    #[test]
    fn uuid_and_set_atoms_decode() {
        let uuid = Json::Array(vec![Json::string("uuid"), Json::string("abc-123")]);
        assert_eq!(uuid.as_uuid(), Some("abc-123"));

        let set = Json::Array(vec![Json::string("set"), Json::Array(vec![Json::from(1i64), Json::from(2i64)])]);
        assert_eq!(set.as_ovs_set().len(), 2);

        let bare = Json::from(1i64);
        assert_eq!(bare.as_ovs_set().len(), 1);
    }

    #[test]
    fn serializes_back_to_valid_json() {
        let value = Json::object([("x".to_string(), Json::from("y"))]);
        assert_eq!(to_string(&value), r#"{"x":"y"}"#);
    }
}
