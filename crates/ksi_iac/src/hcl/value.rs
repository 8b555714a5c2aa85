//! Typed attribute values.
//!
//! Values serialize to plain JSON: scalars as JSON scalars, lists as arrays,
//! blocks as objects, and unevaluated references or expressions as `${...}`
//! strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Roots that never name a managed resource.
const RESERVED_ROOTS: &[&str] = &[
    "var", "local", "module", "data", "path", "terraform", "count", "each", "self",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// A traversal such as `aws_security_group.web[0].id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Attribute names, plus index steps rendered as `[..]`
    pub parts: Vec<String>,
}

impl Reference {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root(&self) -> &str {
        self.parts.first().map(String::as_str).unwrap_or_default()
    }

    fn name_at(&self, index: usize) -> Option<&str> {
        self.parts
            .get(index)
            .map(String::as_str)
            .filter(|p| !p.starts_with('[') && *p != "*")
    }

    /// `type.name` when the traversal points at a managed resource.
    pub fn resource_address(&self) -> Option<String> {
        let root = self.root();
        if RESERVED_ROOTS.contains(&root) || !root.contains('_') {
            return None;
        }
        self.name_at(1).map(|name| format!("{}.{}", root, name))
    }

    /// `data.type.name` when the traversal points at a data source.
    pub fn data_address(&self) -> Option<String> {
        if self.root() != "data" {
            return None;
        }
        match (self.name_at(1), self.name_at(2)) {
            (Some(kind), Some(name)) => Some(format!("data.{}.{}", kind, name)),
            _ => None,
        }
    }

    /// Module name when the traversal points at a module output.
    pub fn module_name(&self) -> Option<&str> {
        if self.root() == "module" {
            self.name_at(1)
        } else {
            None
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 && !part.starts_with('[') {
                f.write_str(".")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("${{{}}}", self))
    }
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Value>),
    /// Object literal or nested block body
    Block(BTreeMap<String, Value>),
    Reference(Reference),
    /// Any other expression, kept as source text
    Expression(String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(s.into()))
    }

    pub fn int(n: i64) -> Self {
        Self::Scalar(Scalar::Int(n))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer view; accepts whole floats and numeric strings (`"22"`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Int(n)) => Some(*n),
            Self::Scalar(Scalar::Float(f)) if f.fract() == 0.0 => Some(*f as i64),
            Self::Scalar(Scalar::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Bool(b)) => Some(*b),
            Self::Scalar(Scalar::String(s)) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Block(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Scalar text of the value: strings as-is, numbers and booleans formatted.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s.clone()),
            Self::Scalar(Scalar::Int(n)) => Some(n.to_string()),
            Self::Scalar(Scalar::Float(f)) => Some(f.to_string()),
            Self::Scalar(Scalar::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Whether the value is fully known without evaluation.
    pub fn is_known(&self) -> bool {
        match self {
            Self::Scalar(Scalar::String(s)) => !s.contains("${"),
            Self::Scalar(_) => true,
            Self::List(items) => items.iter().all(Value::is_known),
            Self::Block(map) => map.values().all(Value::is_known),
            Self::Reference(_) | Self::Expression(_) => false,
        }
    }

    /// Visit this value and every value nested inside it.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Value)) {
        visit(self);
        match self {
            Self::List(items) => items.iter().for_each(|v| v.walk(visit)),
            Self::Block(map) => map.values().for_each(|v| v.walk(visit)),
            _ => {}
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(s) => s.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Block(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            Self::Reference(r) => r.serialize(serializer),
            Self::Expression(raw) => serializer.collect_str(&format_args!("${{{}}}", raw)),
        }
    }
}
