use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::TypeError;

/// Name of a model type.
///
/// Every type name owns exactly one entity collection in a store. A record
/// may declare several type names and is then filed under each of them.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeName({})", self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Caller-supplied identity of a record within its type.
///
/// Ids are canonicalized when parsed from JSON: integers and integral
/// floats become [`EntityId::Int`], so `1` and `1.0` name the same record.
/// Every JSON kind keeps its own variant, so `1` and `"1"`, `true` and
/// `"true"`, or `1.5` and `"1.5"` are distinct ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Int(i64),
    Bool(bool),
    /// A non-integral or out-of-range number, in its JSON textual form.
    Number(String),
    Str(String),
}

impl EntityId {
    /// Canonicalize a JSON scalar into an id.
    pub fn from_json(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Self::Int(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok(Self::Int(f as i64))
                    }
                    _ => Ok(Self::Number(n.to_string())),
                }
            }
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Null => Err(TypeError::InvalidId("null".into())),
            other => Err(TypeError::InvalidId(other.to_string())),
        }
    }

    /// The JSON form of this id.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => n
                .parse::<Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(n.clone())),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(de::Error::custom)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "EntityId({i})"),
            Self::Bool(b) => write!(f, "EntityId({b})"),
            Self::Number(n) => write!(f, "EntityId({n})"),
            Self::Str(s) => write!(f, "EntityId({s:?})"),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) | Self::Str(n) => f.write_str(n),
        }
    }
}

/// Parses decimal integers as [`EntityId::Int`], anything else as a string id.
impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Str(s.to_string()),
        })
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        Self::Int(id.into())
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self::Int(id.into())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn integer_and_integral_float_are_the_same_id() {
        let a = EntityId::from_json(&json!(7)).unwrap();
        let b = EntityId::from_json(&json!(7.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, EntityId::Int(7));
    }

    #[test]
    fn numeric_string_is_distinct_from_number() {
        let n = EntityId::from_json(&json!(1)).unwrap();
        let s = EntityId::from_json(&json!("1")).unwrap();
        assert_ne!(n, s);
    }

    #[test]
    fn fractional_number_keeps_textual_form() {
        let id = EntityId::from_json(&json!(2.5)).unwrap();
        assert_eq!(id, EntityId::Number("2.5".into()));
        assert_ne!(id, EntityId::from_json(&json!("2.5")).unwrap());
        assert_eq!(id.to_json(), json!(2.5));
    }

    #[test]
    fn huge_unsigned_keeps_numeric_text() {
        let id = EntityId::from_json(&json!(u64::MAX)).unwrap();
        assert_eq!(id, EntityId::Number(u64::MAX.to_string()));
        assert_eq!(id.to_json(), json!(u64::MAX));
    }

    #[test]
    fn bool_id_is_distinct_from_its_text() {
        let b = EntityId::from_json(&json!(true)).unwrap();
        assert_eq!(b, EntityId::Bool(true));
        assert_ne!(b, EntityId::from_json(&json!("true")).unwrap());
        assert_eq!(b.to_string(), "true");
    }

    #[test]
    fn null_and_composite_ids_are_rejected() {
        assert!(EntityId::from_json(&Value::Null).is_err());
        assert!(EntityId::from_json(&json!([1])).is_err());
        assert!(EntityId::from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn from_str_prefers_integers() {
        assert_eq!("42".parse::<EntityId>().unwrap(), EntityId::Int(42));
        assert_eq!("abc".parse::<EntityId>().unwrap(), EntityId::Str("abc".into()));
    }

    #[test]
    fn display_forms() {
        assert_eq!(EntityId::Int(-3).to_string(), "-3");
        assert_eq!(EntityId::from("x").to_string(), "x");
        assert_eq!(TypeName::from("category").to_string(), "category");
    }

    #[test]
    fn type_name_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(TypeName::from("station"), 1);
        assert_eq!(map.get("station"), Some(&1));
    }

    #[test]
    fn serde_uses_json_form() {
        let ids = vec![
            EntityId::Int(5),
            EntityId::from("k"),
            EntityId::Bool(false),
            EntityId::Number("0.5".into()),
        ];
        let json = serde_json::to_string(&ids).unwrap();
        assert_eq!(json, r#"[5,"k",false,0.5]"#);
        let parsed: Vec<EntityId> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ids);
    }

    proptest! {
        #[test]
        fn integer_ids_canonicalize(i in any::<i64>()) {
            let id = EntityId::from_json(&json!(i)).unwrap();
            prop_assert_eq!(id.clone(), EntityId::Int(i));
            prop_assert_eq!(id.to_json(), json!(i));
        }

        #[test]
        fn exact_floats_match_integers(i in -(1i64 << 52)..(1i64 << 52)) {
            let from_float = EntityId::from_json(&json!(i as f64)).unwrap();
            prop_assert_eq!(from_float, EntityId::Int(i));
        }
    }
}
