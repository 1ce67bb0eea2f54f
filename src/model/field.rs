use std::str::FromStr;

/// Outcome of reading one field out of a post
///
/// The extractor decides per field whether `Malformed` is fatal for the post
/// or simply treated as absent.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<T> {
    Present(T),
    Absent,
    /// The field was there but could not be interpreted; holds the raw text
    Malformed(String),
}

impl<T> FieldValue<T> {
    /// Parses optional raw text; blank text counts as absent
    pub fn parse_with<F>(raw: Option<&str>, parse: F) -> Self
    where
        F: FnOnce(&str) -> Option<T>,
    {
        match raw.map(str::trim) {
            None | Some("") => Self::Absent,
            Some(text) => match parse(text) {
                Some(value) => Self::Present(value),
                None => Self::Malformed(text.to_string()),
            },
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent | Self::Malformed(_) => None,
        }
    }

    pub fn malformed(&self) -> Option<&str> {
        match self {
            Self::Malformed(raw) => Some(raw),
            _ => None,
        }
    }
}

impl<T: FromStr> FieldValue<T> {
    /// Parses optional raw text with `FromStr`
    pub fn parse(raw: Option<&str>) -> Self {
        Self::parse_with(raw, |text| text.parse().ok())
    }
}

impl FieldValue<String> {
    /// Non-blank text is present, anything else absent
    pub fn text(raw: Option<&str>) -> Self {
        Self::parse_with(raw, |text| Some(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_present() {
        assert_eq!(FieldValue::<f64>::parse(Some(" 1.5 ")), FieldValue::Present(1.5));
    }

    #[test]
    fn test_parse_absent() {
        assert_eq!(FieldValue::<f64>::parse(None), FieldValue::Absent);
        assert_eq!(FieldValue::<f64>::parse(Some("   ")), FieldValue::Absent);
    }

    #[test]
    fn test_parse_malformed_keeps_raw() {
        let value = FieldValue::<f64>::parse(Some("x1.5"));
        assert_eq!(value.malformed(), Some("x1.5"));
        assert_eq!(value.ok(), None);
    }

    #[test]
    fn test_text() {
        assert_eq!(
            FieldValue::text(Some(" Analiza ")),
            FieldValue::Present("Analiza".to_string())
        );
        assert_eq!(FieldValue::text(Some("")), FieldValue::Absent);
    }
}
