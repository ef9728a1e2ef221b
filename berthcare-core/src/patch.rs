//! Three-state PATCH field: omitted, explicit `null`, or a value.
//!
//! PATCH bodies distinguish "leave this field alone" from "clear it".
//! Deserialize with `#[serde(default)]` so an absent key becomes
//! [`Patch::Missing`] while a literal `null` becomes [`Patch::Null`].

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Missing,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Patch::Missing)
    }

    /// The new value, if this patch sets one.
    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Missing => Patch::Missing,
            Patch::Null => Patch::Null,
            Patch::Value(v) => Patch::Value(f(v)),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(|opt| match opt {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        phone: Patch<String>,
    }

    #[test]
    fn test_missing_field() {
        let body: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(body.phone, Patch::Missing);
    }

    #[test]
    fn test_explicit_null() {
        let body: Body = serde_json::from_str(r#"{"phone": null}"#).unwrap();
        assert_eq!(body.phone, Patch::Null);
    }

    #[test]
    fn test_value() {
        let body: Body = serde_json::from_str(r#"{"phone": "555-0100"}"#).unwrap();
        assert_eq!(body.phone, Patch::Value("555-0100".to_string()));
    }
}
