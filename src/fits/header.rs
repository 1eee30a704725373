//! Header keyword values, read through `fitsrs` cards.

use std::fmt;

use fitsrs::card::Value;

/// A header keyword value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl HeaderValue {
    /// Undefined and unparsable cards have no value.
    pub fn from_card(value: &Value) -> Option<Self> {
        match value {
            Value::Logical { value, .. } => Some(HeaderValue::Bool(*value)),
            Value::Integer { value, .. } => Some(HeaderValue::Int(i64::from(*value))),
            Value::Float { value, .. } => Some(HeaderValue::Float(*value)),
            Value::String { value, .. } => Some(HeaderValue::Str(value.trim_end().to_string())),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(f) => Some(*f),
            HeaderValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<HeaderValue>>;

/// Keyword lookup over one HDU header. The decoded `fitsrs` header is owned by
/// the lookup, so values are converted on access.
pub struct Header {
    lookup: Lookup,
}

impl Header {
    pub fn new(lookup: impl Fn(&str) -> Option<HeaderValue> + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    pub fn get(&self, keyword: &str) -> Option<HeaderValue> {
        (self.lookup)(keyword)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).as_ref().and_then(HeaderValue::as_i64)
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).as_ref().and_then(HeaderValue::as_f64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<String> {
        match self.get(keyword)? {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, keyword: &str) -> Option<bool> {
        self.get(keyword).as_ref().and_then(HeaderValue::as_bool)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(|_| None)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn header(pairs: &[(&str, HeaderValue)]) -> Header {
        let map: HashMap<String, HeaderValue> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Header::new(move |k| map.get(k).cloned())
    }

    #[test]
    fn test_typed_getters() {
        let h = header(&[
            ("NAXIS2", HeaderValue::Int(128)),
            ("EXPOSURE", HeaderValue::Float(150.0)),
            ("LCTPMTAB", HeaderValue::Str("kplr2009_lcm-tpmrf.fits".into())),
            ("SIMPLE", HeaderValue::Bool(true)),
        ]);
        assert_eq!(h.get_i64("NAXIS2"), Some(128));
        assert_eq!(h.get_f64("NAXIS2"), Some(128.0));
        assert_eq!(h.get_i64("EXPOSURE"), Some(150));
        assert_eq!(h.get_str("LCTPMTAB").as_deref(), Some("kplr2009_lcm-tpmrf.fits"));
        assert_eq!(h.get_bool("SIMPLE"), Some(true));
        assert_eq!(h.get_str("NAXIS2"), None);
        assert_eq!(h.get_i64("MISSING"), None);
    }

    #[test]
    fn test_fractional_float_is_not_an_integer() {
        assert_eq!(HeaderValue::Float(1.5).as_i64(), None);
        assert_eq!(HeaderValue::Str("2".into()).as_i64(), None);
    }

    #[test]
    fn test_default_header_is_empty() {
        assert!(Header::default().get("XTENSION").is_none());
    }
}
