//! Lenient deserializers for upstream JSON whose field encodings drift.
//!
//! The submissions API usually sends scalars, but some documents carry the
//! columnar encoding where a scalar field arrives as a one-element array.
//! Both shapes decode to the same value; anything unrecognised becomes `None`.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;

fn whole_float_to_string(v: f64) -> Option<String> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some((v as i64).to_string())
    } else if v.is_finite() {
        Some(v.to_string())
    } else {
        None
    }
}

/// A scalar rendered as text: strings, numbers and bools all qualify.
#[derive(Debug, Clone, PartialEq)]
struct Scalar(Option<String>);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer
            .deserialize_any(ScalarVisitor { allow_seq: false })
            .map(Scalar)
    }
}

struct ScalarVisitor {
    allow_seq: bool,
}

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("string, number, bool, null, or one-element array")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let t = v.trim();
        Ok(if t.is_empty() { None } else { Some(t.to_string()) })
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.visit_str(&v)
    }

    #[inline]
    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    #[inline]
    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    #[inline]
    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(whole_float_to_string(v))
    }

    #[inline]
    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    #[inline]
    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    #[inline]
    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        if !self.allow_seq {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            return Ok(None);
        }
        let first = seq
            .next_element::<Scalar>()?
            .and_then(|s| s.0);
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(first)
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

/// Scalar or array-of-one, as text. Blank strings, nulls and objects give `None`.
pub fn deserialize_flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ScalarVisitor { allow_seq: true })
}

/// Integer given as a number, a numeric string, or an array-of-one of either.
pub fn deserialize_flexible_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = deserialize_flexible_string(deserializer)?;
    Ok(text.and_then(|t| t.parse::<u64>().ok()))
}

/// A list of scalars; a bare scalar is promoted to a one-element list.
pub fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringListVisitor;

    impl<'de> Visitor<'de> for StringListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("array of scalars, a single scalar, or null")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(Scalar(item)) = seq.next_element::<Scalar>()? {
                if let Some(s) = item {
                    out.push(s);
                }
            }
            Ok(out)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(ScalarVisitor { allow_seq: false }
                .visit_str::<E>(v)?
                .into_iter()
                .collect())
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(whole_float_to_string(v).into_iter().collect())
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(StringListVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "deserialize_flexible_string")]
        s: Option<String>,
        #[serde(default, deserialize_with = "deserialize_flexible_u64")]
        n: Option<u64>,
        #[serde(default, deserialize_with = "deserialize_string_list")]
        l: Vec<String>,
    }

    fn sample(v: serde_json::Value) -> Sample {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn scalar_and_array_of_one_agree() {
        let a = sample(json!({"s": "Apple Inc.", "n": 3571, "l": ["AAPL"]}));
        let b = sample(json!({"s": ["Apple Inc."], "n": ["3571"], "l": "AAPL"}));
        assert_eq!(a.s, b.s);
        assert_eq!(a.n, b.n);
        assert_eq!(a.l, b.l);
    }

    #[test]
    fn missing_and_odd_shapes_are_empty() {
        let p = sample(json!({"s": {"nested": 1}, "n": "n/a", "l": null}));
        assert_eq!(p.s, None);
        assert_eq!(p.n, None);
        assert!(p.l.is_empty());

        let empty = sample(json!({}));
        assert_eq!(empty.s, None);
        assert!(empty.l.is_empty());

        let blank = sample(json!({"s": "   ", "l": ["NYSE", null, "Nasdaq"]}));
        assert_eq!(blank.s, None);
        assert_eq!(blank.l, vec!["NYSE", "Nasdaq"]);
    }

    #[test]
    fn numbers_render_without_fraction() {
        let p = sample(json!({"s": 3571.0}));
        assert_eq!(p.s.as_deref(), Some("3571"));
    }
}
