// ai
//! 📦 Wire records: the tagged-union dialect the change stream speaks, and the decoder that
//! translates it into plain JSON documents a search index will actually accept. 🔄
//!
//! 🎬 COLD OPEN. INT. STREAM SHARD. A RECORD ARRIVES
//!
//! It looks like JSON. It smells like JSON. But every value wears a tiny hat:
//! `{"title": {"S": "Heat"}, "year": {"N": "1995"}, "genres": {"SS": ["Crime"]}}`.
//! The hat says what type the value is. The search index does not want hats.
//! The search index wants `{"title": "Heat", "year": 1995, "genres": ["Crime"]}`.
//! This module is the hat check.
//!
//! ## Tags we speak 🗣️
//! - `S`  → string (or an integer, under the legacy flag key, see below)
//! - `N`  → number; decimal iff the literal has a `.`, integer otherwise (`u64`, then `f64`, past `i64`)
//! - `SS` → ordered string set, order as received
//! - `M`  → nested map, decoded recursively
//!
//! Anything else (`BOOL`, `L`, `NULL`, binary...) is a [`DecodeError`]. So is a
//! value with zero tags or more than one. No partial recovery: one bad field
//! spoils the record, and the caller skips that event.
//!
//! ## Known quirks, preserved on purpose ⚠️
//! 1. **Legacy integer flag**: a string under the configured
//!    [`DecoderConfig::legacy_integer_key`] (default `"I"`) decodes to an integer.
//! 2. **Nested key rebinding**: when a field is a nested map, the decoded map is
//!    stored under the tag name `"M"`, not under the field's own name. Two nested
//!    fields in one record therefore collide on `"M"`, last one wins. Downstream
//!    consumers may depend on that shape, so it stays on by default and can be
//!    switched off with [`DecoderConfig::rebind_nested_keys`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const TAG_STRING: &str = "S";
pub const TAG_NUMBER: &str = "N";
pub const TAG_STRING_SET: &str = "SS";
pub const TAG_NESTED: &str = "M";

/// 🆔 The field every indexable record must carry.
pub const ID_FIELD: &str = "id";

/// 💀 Everything that can go wrong while taking the hats off.
///
/// Every variant carries the dotted field path (`info.rating`) so the log line
/// points at the culprit instead of at the whole record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("💀 Field '{path}' has no recognized wire tag (saw {seen:?}). We speak S, N, SS and M. This was none of those.")]
    UnrecognizedTag { path: String, seen: Vec<String> },

    #[error("💀 Field '{path}' carries {count} wire tags at once. Exactly one hat per value, please.")]
    AmbiguousTags { path: String, count: usize },

    #[error("💀 Field '{path}' is a JSON {found}, which is neither a tagged value nor a plain string.")]
    NotTagged { path: String, found: &'static str },

    #[error("💀 Field '{path}' is tagged '{tag}' but its payload is not {expected}.")]
    BadPayload {
        path: String,
        tag: &'static str,
        expected: &'static str,
    },

    #[error("💀 Field '{path}' holds number literal '{literal}', which refuses to parse.")]
    BadNumber { path: String, literal: String },

    #[error("💀 The record image is not a JSON object. An image with no fields is just a frame.")]
    NotAnImage,
}

/// 🎩 One field's on-wire encoding. Exactly one tag per value, enforced by [`WireValue::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// 🧵 Already a bare string, no hat. The recursion's base case.
    Plain(String),
    S(String),
    N(String),
    SS(Vec<String>),
    M(BTreeMap<String, WireValue>),
}

impl WireValue {
    /// 🔍 Validate a raw JSON value into a [`WireValue`], recursively.
    ///
    /// `path` is only used for error messages. Top-level callers pass the field name.
    pub fn parse(path: &str, raw: &Value) -> Result<Self, DecodeError> {
        let tagged = match raw {
            Value::String(plain) => return Ok(WireValue::Plain(plain.clone())),
            Value::Object(tagged) => tagged,
            other => {
                return Err(DecodeError::NotTagged {
                    path: path.to_string(),
                    found: json_kind(other),
                });
            }
        };

        let mut entries = tagged.iter();
        let (tag, payload) = match (entries.next(), tagged.len()) {
            (Some(entry), 1) => entry,
            (None, _) => {
                return Err(DecodeError::UnrecognizedTag {
                    path: path.to_string(),
                    seen: Vec::new(),
                });
            }
            (Some(_), count) => {
                return Err(DecodeError::AmbiguousTags {
                    path: path.to_string(),
                    count,
                });
            }
        };

        match tag.as_str() {
            TAG_STRING => expect_str(path, TAG_STRING, payload).map(WireValue::S),
            TAG_NUMBER => expect_str(path, TAG_NUMBER, payload).map(WireValue::N),
            TAG_STRING_SET => {
                let members = payload.as_array().ok_or_else(|| DecodeError::BadPayload {
                    path: path.to_string(),
                    tag: TAG_STRING_SET,
                    expected: "an array of strings",
                })?;
                members
                    .iter()
                    .map(|member| expect_str(path, TAG_STRING_SET, member))
                    .collect::<Result<Vec<_>, _>>()
                    .map(WireValue::SS)
            }
            TAG_NESTED => {
                let members = payload.as_object().ok_or_else(|| DecodeError::BadPayload {
                    path: path.to_string(),
                    tag: TAG_NESTED,
                    expected: "an object",
                })?;
                let mut nested = BTreeMap::new();
                for (name, member) in members {
                    let member_path = format!("{path}.{name}");
                    nested.insert(name.clone(), WireValue::parse(&member_path, member)?);
                }
                Ok(WireValue::M(nested))
            }
            unknown => Err(DecodeError::UnrecognizedTag {
                path: path.to_string(),
                seen: vec![unknown.to_string()],
            }),
        }
    }
}

fn expect_str(path: &str, tag: &'static str, payload: &Value) -> Result<String, DecodeError> {
    payload
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| DecodeError::BadPayload {
            path: path.to_string(),
            tag,
            expected: "a string",
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// ✨ A hatless value. Serializes untagged, so the index sees plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Str(String),
    Int(i64),
    /// 🐘 Whole numbers past `i64::MAX` that still fit 64 unsigned bits.
    UInt(u64),
    Float(f64),
    StrSet(Vec<String>),
    Map(DecodedRecord),
}

impl DecodedValue {
    /// 🔢 Coerce into a counter the way the monitoring math expects: integers as is,
    /// decimals truncated toward zero, numeric strings parsed. Sets and maps are not counters.
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            DecodedValue::Int(value) => Some(*value),
            DecodedValue::UInt(value) => i64::try_from(*value).ok(),
            DecodedValue::Float(value) if value.is_finite() => Some(value.trunc() as i64),
            DecodedValue::Str(text) => {
                let text = text.trim();
                text.parse::<i64>().ok().or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|value| value.is_finite())
                        .map(|value| value.trunc() as i64)
                })
            }
            _ => None,
        }
    }

    /// 🆔 Render as a bulk `_id`. Strings pass through, integers get stringified.
    pub fn as_identity(&self) -> Option<String> {
        match self {
            DecodedValue::Str(text) => Some(text.clone()),
            DecodedValue::Int(value) => Some(value.to_string()),
            DecodedValue::UInt(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for DecodedValue {
    fn from(value: &str) -> Self {
        DecodedValue::Str(value.to_string())
    }
}

impl From<String> for DecodedValue {
    fn from(value: String) -> Self {
        DecodedValue::Str(value)
    }
}

impl From<i64> for DecodedValue {
    fn from(value: i64) -> Self {
        DecodedValue::Int(value)
    }
}

impl From<f64> for DecodedValue {
    fn from(value: f64) -> Self {
        DecodedValue::Float(value)
    }
}

/// 📄 A decoded record: unique field names, ordered by key so the bulk payload is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecodedRecord(BTreeMap<String, DecodedValue>);

impl DecodedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<DecodedValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&DecodedValue> {
        self.0.get(field)
    }

    /// 🆔 The record's identity, if it has a usable one.
    pub fn id(&self) -> Option<String> {
        self.0.get(ID_FIELD).and_then(DecodedValue::as_identity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<DecodedValue>> FromIterator<(K, V)> for DecodedRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }
}

/// 🔧 Decoder knobs. Both defaults reproduce the historical output shape.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DecoderConfig {
    /// 🏳️ Field key whose string values decode as integers.
    #[serde(default = "default_legacy_integer_key")]
    pub legacy_integer_key: String,
    /// 🔀 Store nested maps under the tag name `"M"` instead of their field name.
    #[serde(default = "default_rebind_nested_keys")]
    pub rebind_nested_keys: bool,
}

fn default_legacy_integer_key() -> String {
    "I".to_string()
}

fn default_rebind_nested_keys() -> bool {
    true
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            legacy_integer_key: default_legacy_integer_key(),
            rebind_nested_keys: default_rebind_nested_keys(),
        }
    }
}

/// 🎩 The hat check. One decoder, shared by everyone who reads stream images.
#[derive(Debug, Clone, Default)]
pub struct WireDecoder {
    config: DecoderConfig,
}

impl WireDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// 📄 Decode a whole top-level image (`field -> tagged value`) into a [`DecodedRecord`].
    pub fn decode_record(&self, image: &Value) -> Result<DecodedRecord, DecodeError> {
        let fields = image.as_object().ok_or(DecodeError::NotAnImage)?;
        let mut record = DecodedRecord::new();
        for (field, raw) in fields {
            let wire = WireValue::parse(field, raw)?;
            let (key, value) = self.decode_at(field, field, &wire)?;
            record.insert(key, value);
        }
        Ok(record)
    }

    /// 🔄 Decode one field. Returns the key the value should be stored under, which is
    /// `field` itself except for nested maps when rebinding is on.
    pub fn decode(&self, field: &str, wire: &WireValue) -> Result<(String, DecodedValue), DecodeError> {
        self.decode_at(field, field, wire)
    }

    fn decode_at(
        &self,
        path: &str,
        field: &str,
        wire: &WireValue,
    ) -> Result<(String, DecodedValue), DecodeError> {
        let value = match wire {
            WireValue::Plain(text) | WireValue::S(text) => {
                if field == self.config.legacy_integer_key {
                    DecodedValue::Int(parse_integer(path, text)?)
                } else {
                    DecodedValue::Str(text.clone())
                }
            }
            WireValue::N(literal) => parse_number(path, literal)?,
            WireValue::SS(members) => DecodedValue::StrSet(members.clone()),
            WireValue::M(members) => {
                let mut nested = DecodedRecord::new();
                for (name, member) in members {
                    let member_path = format!("{path}.{name}");
                    let (key, value) = self.decode_at(&member_path, name, member)?;
                    nested.insert(key, value);
                }
                let key = if self.config.rebind_nested_keys {
                    TAG_NESTED
                } else {
                    field
                };
                return Ok((key.to_string(), DecodedValue::Map(nested)));
            }
        };
        Ok((field.to_string(), value))
    }
}

fn parse_integer(path: &str, literal: &str) -> Result<i64, DecodeError> {
    literal.trim().parse().map_err(|_| DecodeError::BadNumber {
        path: path.to_string(),
        literal: literal.to_string(),
    })
}

/// 🔢 `N` literals: with a `.` they are decimals. Without one they are integers when
/// they fit `i64` or `u64`, and fall back to a decimal when wider (the wire allows 38 digits).
/// Literals that overflow to infinity are rejected rather than serialized as `null`.
fn parse_number(path: &str, literal: &str) -> Result<DecodedValue, DecodeError> {
    let trimmed = literal.trim();
    let bad_number = || DecodeError::BadNumber {
        path: path.to_string(),
        literal: literal.to_string(),
    };
    let parse_finite = || {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(DecodedValue::Float)
    };

    if trimmed.contains('.') {
        return parse_finite().ok_or_else(bad_number);
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(DecodedValue::Int(value));
    }
    if let Ok(value) = trimmed.parse::<u64>() {
        return Ok(DecodedValue::UInt(value));
    }
    // 🐘 only digit strings get the wide fallback; `1e5` stays a BadNumber
    let digits = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    if !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return parse_finite().ok_or_else(bad_number);
    }
    Err(bad_number())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(image: Value) -> Result<DecodedRecord, DecodeError> {
        WireDecoder::default().decode_record(&image)
    }

    #[test]
    fn the_one_where_a_flat_movie_loses_all_its_hats() -> Result<(), DecodeError> {
        let the_record = decode(json!({
            "id": {"S": "tt0113277"},
            "title": {"S": "Heat"},
            "year": {"N": "1995"},
            "rating": {"N": "8.3"},
            "genres": {"SS": ["Crime", "Drama", "Action"]},
        }))?;

        assert_eq!(the_record.id(), Some("tt0113277".to_string()));
        assert_eq!(the_record.get("year"), Some(&DecodedValue::Int(1995)));
        assert_eq!(the_record.get("rating"), Some(&DecodedValue::Float(8.3)));
        assert_eq!(
            the_record.get("genres"),
            Some(&DecodedValue::StrSet(vec![
                "Crime".to_string(),
                "Drama".to_string(),
                "Action".to_string()
            ])),
            "string sets keep the order they arrived in"
        );

        let the_json = serde_json::to_value(&the_record).expect("💀 plain values always serialize");
        assert_eq!(the_json["title"], json!("Heat"));
        assert_eq!(the_json["year"], json!(1995));
        Ok(())
    }

    #[test]
    fn the_one_where_the_separator_alone_decides_decimal_or_integer() -> Result<(), DecodeError> {
        let the_record = decode(json!({
            "whole": {"N": "10"},
            "negative": {"N": "-42"},
            "decimal": {"N": "10.0"},
        }))?;
        assert_eq!(the_record.get("whole"), Some(&DecodedValue::Int(10)));
        assert_eq!(the_record.get("negative"), Some(&DecodedValue::Int(-42)));
        assert_eq!(the_record.get("decimal"), Some(&DecodedValue::Float(10.0)));
        Ok(())
    }

    #[test]
    fn the_one_where_the_legacy_flag_key_turns_strings_into_integers() -> Result<(), DecodeError> {
        let the_record = decode(json!({
            "I": {"S": "7"},
            "name": {"S": "7"},
        }))?;
        assert_eq!(the_record.get("I"), Some(&DecodedValue::Int(7)));
        assert_eq!(the_record.get("name"), Some(&DecodedValue::Str("7".to_string())));

        let the_bare_one = decode(json!({"I": "12"}))?;
        assert_eq!(the_bare_one.get("I"), Some(&DecodedValue::Int(12)));

        let the_grumpy_one = decode(json!({"I": {"S": "yes"}}));
        assert!(matches!(the_grumpy_one, Err(DecodeError::BadNumber { .. })));
        Ok(())
    }

    #[test]
    fn the_one_where_box_office_numbers_outgrow_i64() -> Result<(), DecodeError> {
        let the_record = decode(json!({
            "id": {"S": "tt1"},
            "views": {"N": "12345678901234567890"},
            "atoms": {"N": "123456789012345678901234567890"},
            "debt": {"N": "-123456789012345678901234567890"},
        }))?;
        assert_eq!(
            the_record.get("views"),
            Some(&DecodedValue::UInt(12_345_678_901_234_567_890))
        );
        assert_eq!(the_record.get("atoms"), Some(&DecodedValue::Float(123_456_789_012_345_678_901_234_567_890_f64)));
        assert_eq!(the_record.get("debt"), Some(&DecodedValue::Float(-123_456_789_012_345_678_901_234_567_890_f64)));

        let the_json = serde_json::to_value(&the_record).expect("💀 wide numbers still serialize");
        assert_eq!(the_json["views"], json!(12_345_678_901_234_567_890_u64));
        assert!(the_json["atoms"].is_f64(), "wide integers land as decimals, never null");
        Ok(())
    }

    #[test]
    fn the_one_where_infinity_is_not_a_number_we_ship() {
        assert_eq!(
            decode(json!({"big": {"N": "1.0e400"}})),
            Err(DecodeError::BadNumber {
                path: "big".to_string(),
                literal: "1.0e400".to_string()
            })
        );
        assert!(matches!(
            decode(json!({"big": {"N": "1e5"}})),
            Err(DecodeError::BadNumber { .. })
        ));
    }

    #[test]
    fn the_one_where_a_single_field_is_decoded_on_its_own() -> Result<(), DecodeError> {
        let the_decoder = WireDecoder::default();

        let the_year = WireValue::parse("year", &json!({"N": "1995"}))?;
        assert_eq!(
            the_decoder.decode("year", &the_year)?,
            ("year".to_string(), DecodedValue::Int(1995))
        );

        let the_info = WireValue::parse("info", &json!({"M": {"rank": {"N": "4"}}}))?;
        let (the_key, the_value) = the_decoder.decode("info", &the_info)?;
        assert_eq!(the_key, TAG_NESTED);
        let DecodedValue::Map(the_nested) = the_value else {
            panic!("💀 an M value decodes to a map");
        };
        assert_eq!(the_nested.get("rank"), Some(&DecodedValue::Int(4)));
        Ok(())
    }

    #[test]
    fn the_one_where_bare_strings_walk_straight_through() -> Result<(), DecodeError> {
        let the_record = decode(json!({"plot": "A heist goes sideways."}))?;
        assert_eq!(
            the_record.get("plot"),
            Some(&DecodedValue::Str("A heist goes sideways.".to_string()))
        );
        Ok(())
    }

    #[test]
    fn the_one_where_nested_maps_move_into_the_m_apartment() -> Result<(), DecodeError> {
        let the_image = json!({
            "id": {"S": "tt1"},
            "info": {"M": {
                "rank": {"N": "4"},
                "directors": {"SS": ["Michael Mann"]},
            }},
        });

        let the_quirky_record = decode(the_image.clone())?;
        assert!(the_quirky_record.get("info").is_none(), "the outer name gets rebound");
        let Some(DecodedValue::Map(the_nested)) = the_quirky_record.get(TAG_NESTED) else {
            panic!("💀 nested map should live under the tag name");
        };
        assert_eq!(the_nested.get("rank"), Some(&DecodedValue::Int(4)));

        let the_polite_decoder = WireDecoder::new(DecoderConfig {
            rebind_nested_keys: false,
            ..DecoderConfig::default()
        });
        let the_polite_record = the_polite_decoder.decode_record(&the_image)?;
        assert!(matches!(the_polite_record.get("info"), Some(DecodedValue::Map(_))));
        assert!(the_polite_record.get(TAG_NESTED).is_none());
        Ok(())
    }

    #[test]
    fn the_one_where_malformed_values_are_turned_away_at_the_door() {
        assert!(matches!(
            decode(json!({"mystery": {}})),
            Err(DecodeError::UnrecognizedTag { .. })
        ));
        assert!(matches!(
            decode(json!({"greedy": {"S": "a", "N": "1"}})),
            Err(DecodeError::AmbiguousTags { count: 2, .. })
        ));
        assert!(matches!(
            decode(json!({"flag": {"BOOL": true}})),
            Err(DecodeError::UnrecognizedTag { .. })
        ));
        assert!(matches!(
            decode(json!({"year": {"N": "nineteen"}})),
            Err(DecodeError::BadNumber { .. })
        ));
        assert!(matches!(
            decode(json!({"genres": {"SS": ["ok", 3]}})),
            Err(DecodeError::BadPayload { .. })
        ));
        assert!(matches!(decode(json!({"count": 3})), Err(DecodeError::NotTagged { .. })));
        assert_eq!(decode(json!(["not", "an", "image"])), Err(DecodeError::NotAnImage));
    }

    #[test]
    fn the_one_where_errors_point_at_the_nested_culprit() {
        let the_error = decode(json!({"info": {"M": {"rank": {"N": "x"}}}}))
            .expect_err("💀 a broken nested number must not decode");
        assert_eq!(
            the_error,
            DecodeError::BadNumber {
                path: "info.rank".to_string(),
                literal: "x".to_string()
            }
        );
    }

    #[test]
    fn the_one_where_counters_coerce_like_a_forgiving_int() {
        assert_eq!(DecodedValue::Int(5).as_counter(), Some(5));
        assert_eq!(DecodedValue::UInt(6).as_counter(), Some(6));
        assert_eq!(DecodedValue::UInt(u64::MAX).as_counter(), None);
        assert_eq!(DecodedValue::Float(2.75).as_counter(), Some(2));
        assert_eq!(DecodedValue::Str(" 9 ".to_string()).as_counter(), Some(9));
        assert_eq!(DecodedValue::Str("3.5".to_string()).as_counter(), Some(3));
        assert_eq!(DecodedValue::StrSet(vec![]).as_counter(), None);
    }
}
