//! Property values.
//!
//! `Value` is the dynamically typed payload of a [`Property`](super::Property)
//! and of session options. Byte values are `bytes::Bytes` views, so a value
//! can point into the captured buffer without copying it.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use compact_str::{format_compact, CompactString};

/// Variant value attached to layers, payloads and configuration options.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Unsigned integer
    UInt(u64),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string (inline up to 24 bytes)
    Str(CompactString),
    /// Zero-copy byte view
    Bytes(Bytes),
    /// Ordered key/value pairs
    Map(Vec<(CompactString, Value)>),
    /// Ordered list of values
    List(Vec<Value>),
    /// Null/missing value
    #[default]
    Nil,
}

impl Value {
    /// MAC address formatted as `aa:bb:cc:dd:ee:ff`.
    pub fn mac(bytes: &[u8; 6]) -> Self {
        Value::Str(format_compact!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            bytes[0],
            bytes[1],
            bytes[2],
            bytes[3],
            bytes[4],
            bytes[5]
        ))
    }

    /// IPv4 address in dotted notation.
    pub fn ipv4(addr: Ipv4Addr) -> Self {
        Value::Str(format_compact!("{}", addr))
    }

    /// IPv6 address in canonical notation.
    pub fn ipv6(addr: Ipv6Addr) -> Self {
        Value::Str(format_compact!("{}", addr))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Numeric values are the integer and float variants.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::UInt(_) | Value::Int(_) | Value::Float(_))
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as u16, e.g. for port numbers.
    pub fn as_u16(&self) -> Option<u16> {
        self.as_u64().and_then(|v| u16::try_from(v).ok())
    }

    /// Any numeric variant widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up `key` in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Truthiness used by bare filter paths.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::UInt(v) => *v != 0,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Nil => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => {
                for byte in b.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Nil => f.write_str("nil"),
        }
    }
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::UInt(v as u64)
            }
        })*
    };
}

impl_from_unsigned!(u8, u16, u32, u64, usize);

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(CompactString::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(CompactString::from(v))
    }
}

impl From<CompactString> for Value {
    fn from(v: CompactString) -> Self {
        Value::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::UInt(80).as_u16(), Some(80));
        assert_eq!(Value::UInt(70000).as_u16(), None);
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::Int(5).as_u64(), Some(5));
        assert_eq!(Value::UInt(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("x").as_f64(), None);
    }

    #[test]
    fn test_addresses() {
        assert_eq!(
            Value::mac(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]).as_str(),
            Some("00:11:22:33:44:55")
        );
        assert_eq!(
            Value::ipv4(Ipv4Addr::new(10, 0, 0, 1)).as_str(),
            Some("10.0.0.1")
        );
        assert_eq!(Value::ipv6(Ipv6Addr::LOCALHOST).as_str(), Some("::1"));
    }

    #[test]
    fn test_map_get_and_truthiness() {
        let map = Value::Map(vec![
            ("code".into(), Value::UInt(200)),
            ("empty".into(), Value::from("")),
        ]);
        assert_eq!(map.get("code"), Some(&Value::UInt(200)));
        assert!(map.get("missing").is_none());
        assert!(!map.get("empty").unwrap().is_truthy());
        assert!(map.is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::UInt(0).is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bytes(Bytes::from_static(&[0xde, 0xad])).to_string(), "dead");
        assert_eq!(Value::from(vec![80u16, 8080]).to_string(), "[80, 8080]");
        assert_eq!(Value::Nil.to_string(), "nil");
    }
}
