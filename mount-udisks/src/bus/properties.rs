//! Backend-neutral property bags
//!
//! Property queries return a `PropertyMap`: a plain snapshot of one D-Bus
//! interface's properties, detached from zvariant so adapters and test doubles
//! never deal with wire types.

use std::collections::HashMap;

use zbus::zvariant::{OwnedValue, Value};

/// Interface name → properties, as delivered with `InterfacesAdded`.
pub type InterfaceMap = HashMap<String, PropertyMap>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    /// Strings and object paths
    Str(String),
    /// `ay` byte strings
    Bytes(Vec<u8>),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub(crate) fn from_value(value: &Value<'_>) -> Option<Self> {
        let converted = match value {
            Value::Bool(v) => PropertyValue::Bool(*v),
            Value::U8(v) => PropertyValue::U64(u64::from(*v)),
            Value::U16(v) => PropertyValue::U64(u64::from(*v)),
            Value::U32(v) => PropertyValue::U64(u64::from(*v)),
            Value::U64(v) => PropertyValue::U64(*v),
            Value::I16(v) => PropertyValue::I64(i64::from(*v)),
            Value::I32(v) => PropertyValue::I64(i64::from(*v)),
            Value::I64(v) => PropertyValue::I64(*v),
            Value::Str(v) => PropertyValue::Str(v.to_string()),
            Value::ObjectPath(v) => PropertyValue::Str(v.to_string()),
            Value::Array(array) => {
                let items: Vec<&Value<'_>> = array.iter().collect();
                if !items.is_empty() && items.iter().all(|v| matches!(v, Value::U8(_))) {
                    PropertyValue::Bytes(
                        items
                            .iter()
                            .filter_map(|v| match v {
                                Value::U8(b) => Some(*b),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    PropertyValue::List(items.into_iter().filter_map(Self::from_value).collect())
                }
            }
            Value::Value(inner) => return Self::from_value(inner),
            _ => return None,
        };
        Some(converted)
    }

    fn as_text(&self) -> Option<String> {
        match self {
            PropertyValue::Str(s) => Some(s.clone()),
            PropertyValue::Bytes(b) => Some(decode_c_string_bytes(b)),
            PropertyValue::List(l) if l.is_empty() => Some(String::new()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    values: HashMap<String, PropertyValue>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_owned(raw: HashMap<String, OwnedValue>) -> Self {
        let values = raw
            .iter()
            .filter_map(|(name, value)| {
                PropertyValue::from_value(value).map(|v| (name.clone(), v))
            })
            .collect();
        Self { values }
    }

    /// Builder-style insert, handy for payloads and fakes.
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        match self.values.get(name)? {
            PropertyValue::U64(v) => Some(*v),
            PropertyValue::I64(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// String property; byte strings are decoded up to the first NUL.
    pub fn text(&self, name: &str) -> Option<String> {
        self.values.get(name)?.as_text()
    }

    /// `as` or `aay` list, with empty entries dropped.
    pub fn text_list(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(PropertyValue::List(items)) => items
                .iter()
                .filter_map(PropertyValue::as_text)
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Object path property, with the D-Bus null path `/` mapped to `None`.
    pub fn object_path(&self, name: &str) -> Option<String> {
        self.text(name).filter(|p| !p.is_empty() && p != "/")
    }
}

fn decode_c_string_bytes(bytes: &[u8]) -> String {
    let raw = bytes.split(|b| *b == 0).next().unwrap_or(bytes);
    String::from_utf8_lossy(raw).to_string()
}
