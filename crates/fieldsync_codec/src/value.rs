//! Dynamic payload value.

/// A structured payload value.
///
/// Maps are ordered lists of text-keyed entries. Insertion order is kept so a
/// value can be persisted exactly as the application produced it; only the
/// canonical encoding imposes a key order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// 64-bit float. Non-finite values cannot be canonicalized.
    Float(f64),
    /// Text string.
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Array of values.
    Array(Vec<Value>),
    /// Map entries in insertion order.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Builds a map from key/value pairs, keeping their order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns an empty map.
    #[must_use]
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean inside a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// The integer inside a [`Value::Integer`].
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// The text inside a [`Value::Text`].
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Get this value's map entries, if it is a map.
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up the first entry named `key` in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Sets `key` in a map value, replacing the first existing entry or
    /// appending a new one. Does nothing on non-map values.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if let Value::Map(entries) = self {
            let value = value.into();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, slot)) => *slot = value,
                None => entries.push((key.to_string(), value)),
            }
        }
    }

    /// Reads an integer field from a map, treating absence as zero.
    pub fn integer_field(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_integer).unwrap_or(0)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

macro_rules! value_from {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

value_from! {
    bool => |v| Value::Bool(v),
    i64 => |v| Value::Integer(v),
    i32 => |v| Value::Integer(i64::from(v)),
    u32 => |v| Value::Integer(i64::from(v)),
    f64 => |v| Value::Float(v),
    String => |v| Value::Text(v),
    &str => |v| Value::Text(v.to_owned()),
    Vec<u8> => |v| Value::Bytes(v),
    Vec<Value> => |v| Value::Array(v),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_insertion_order() {
        let value = Value::map([("z", 1), ("a", 2)]);
        let keys: Vec<_> = value.as_map().unwrap().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["z", "a"]);
    }

    #[test]
    fn get_and_set() {
        let mut value = Value::map([("name", "Alice")]);
        assert_eq!(value.get("name"), Some(&Value::from("Alice")));
        assert_eq!(value.get("missing"), None);

        value.set("name", "Bob");
        value.set("age", 30);
        assert_eq!(value.get("name"), Some(&Value::from("Bob")));
        assert_eq!(value.integer_field("age"), 30);
        assert_eq!(value.integer_field("missing"), 0);
        assert_eq!(value.as_map().unwrap().len(), 2);
    }

    #[test]
    fn set_on_non_map_is_ignored() {
        let mut value = Value::from(5);
        value.set("x", 1);
        assert_eq!(value, Value::Integer(5));
    }

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::from("7").as_integer(), None);
        assert_eq!(Value::from("hi").as_text(), Some("hi"));
        assert!(Value::from(1).as_map().is_none());
    }
}
