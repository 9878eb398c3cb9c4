//! Composite values with their own textual encoding.
//!
//! Fields of kind [`AttrKind::Custom`](crate::meta::AttrKind::Custom) hold a
//! [`CustomValue`]. The declared attribute type selects the codec:
//! `Points` fields persist as `"x1:y1;x2:y2"`, `Font` fields as
//! `"face;size;style"`. Custom types without a registered codec are kept as
//! raw JSON so that documents round-trip unchanged.

use std::fmt;

use thiserror::Error;

use crate::identifier::Id;

/// Errors raised while decoding a custom value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CustomCodecError {
    #[error("expected a string for `{type_name}` value, found `{found}`")]
    NotAString { type_name: &'static str, found: String },

    #[error("malformed `{type_name}` value `{text}`")]
    Malformed { type_name: &'static str, text: String },
}

/// Encode/decode contract of a custom value type.
pub trait CustomCodec: Sized {
    /// Attribute type name that selects this codec.
    const TYPE_NAME: &'static str;

    /// Writes the value in its persisted textual form.
    fn encode(&self) -> String;

    /// Parses the persisted textual form.
    fn decode(text: &str) -> Result<Self, CustomCodecError>;
}

/// A 2D point of an edge route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered list of points, used for edge routes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Points(Vec<Point>);

impl Points {
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl CustomCodec for Points {
    const TYPE_NAME: &'static str = "Points";

    fn encode(&self) -> String {
        self.0
            .iter()
            .map(|point| format!("{}:{}", point.x, point.y))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn decode(text: &str) -> Result<Self, CustomCodecError> {
        let malformed = || CustomCodecError::Malformed {
            type_name: Self::TYPE_NAME,
            text: text.to_owned(),
        };

        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        text.split(';')
            .map(|pair| {
                let (x, y) = pair.split_once(':').ok_or_else(malformed)?;
                let x = x.trim().parse::<f64>().map_err(|_| malformed())?;
                let y = y.trim().parse::<f64>().map_err(|_| malformed())?;
                Ok(Point::new(x, y))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// Font face, size and style bit set.
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    face: String,
    size: f64,
    style: u8,
}

impl Font {
    pub const BOLD: u8 = 1;
    pub const ITALIC: u8 = 2;

    pub fn new(face: impl Into<String>, size: f64, style: u8) -> Self {
        Self {
            face: face.into(),
            size,
            style,
        }
    }

    pub fn face(&self) -> &str {
        &self.face
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn style(&self) -> u8 {
        self.style
    }
}

impl CustomCodec for Font {
    const TYPE_NAME: &'static str = "Font";

    fn encode(&self) -> String {
        format!("{};{};{}", self.face, self.size, self.style)
    }

    fn decode(text: &str) -> Result<Self, CustomCodecError> {
        let malformed = || CustomCodecError::Malformed {
            type_name: Self::TYPE_NAME,
            text: text.to_owned(),
        };

        let mut parts = text.split(';');
        let (Some(face), Some(size), Some(style), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let size = size.trim().parse::<f64>().map_err(|_| malformed())?;
        let style = style.trim().parse::<u8>().map_err(|_| malformed())?;
        Ok(Self::new(face, size, style))
    }
}

/// Value of a custom-kind field.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomValue {
    Points(Points),
    Font(Font),
    /// Value of a custom type with no codec, kept verbatim.
    Raw(serde_json::Value),
}

impl CustomValue {
    /// Decodes a persisted value using the codec selected by `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`CustomCodecError`] if a known codec rejects the value.
    pub fn decode(type_name: Id, json: &serde_json::Value) -> Result<Self, CustomCodecError> {
        if type_name == Points::TYPE_NAME {
            decode_text::<Points>(json).map(Self::Points)
        } else if type_name == Font::TYPE_NAME {
            decode_text::<Font>(json).map(Self::Font)
        } else {
            Ok(Self::Raw(json.clone()))
        }
    }

    /// Encodes the value in its persisted form.
    pub fn encode(&self) -> serde_json::Value {
        match self {
            Self::Points(points) => serde_json::Value::String(points.encode()),
            Self::Font(font) => serde_json::Value::String(font.encode()),
            Self::Raw(json) => json.clone(),
        }
    }
}

impl fmt::Display for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            serde_json::Value::String(text) => f.write_str(&text),
            other => write!(f, "{other}"),
        }
    }
}

fn decode_text<C: CustomCodec>(json: &serde_json::Value) -> Result<C, CustomCodecError> {
    match json {
        serde_json::Value::String(text) => C::decode(text),
        other => Err(CustomCodecError::NotAString {
            type_name: C::TYPE_NAME,
            found: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_points_encoding() {
        let points = Points::new(vec![Point::new(10.0, 20.0), Point::new(30.5, 40.0)]);
        assert_eq!(points.encode(), "10:20;30.5:40");
        assert_eq!(Points::decode("10:20;30.5:40").unwrap(), points);
    }

    #[test]
    fn test_empty_points() {
        assert!(Points::decode("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_points() {
        let err = Points::decode("10;20").unwrap_err();
        assert!(matches!(err, CustomCodecError::Malformed { .. }));
    }

    #[test]
    fn test_font_encoding() {
        let font = Font::new("Arial", 13.0, Font::BOLD);
        assert_eq!(font.encode(), "Arial;13;1");

        let decoded = Font::decode("Arial;13;1").unwrap();
        assert_eq!(decoded, font);
        assert_eq!(decoded.style() & Font::BOLD, Font::BOLD);
    }

    #[test]
    fn test_font_rejects_extra_parts() {
        assert!(Font::decode("Arial;13;0;9").is_err());
        assert!(Font::decode("Arial;13").is_err());
    }

    #[test]
    fn test_custom_value_dispatch() {
        let value = CustomValue::decode("Font".into(), &json!("Helvetica;11;2")).unwrap();
        assert!(matches!(value, CustomValue::Font(_)));
        assert_eq!(value.encode(), json!("Helvetica;11;2"));

        let raw = CustomValue::decode("Gradient".into(), &json!({"from": "red"})).unwrap();
        assert_eq!(raw.encode(), json!({"from": "red"}));
    }

    #[test]
    fn test_custom_value_requires_string() {
        let err = CustomValue::decode("Points".into(), &json!(12)).unwrap_err();
        assert!(matches!(err, CustomCodecError::NotAString { .. }));
    }
}
