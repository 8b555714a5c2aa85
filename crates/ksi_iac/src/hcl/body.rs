//! Syntax tree: bodies, attributes and blocks.

use std::collections::BTreeMap;

use serde::Serialize;

use super::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: Value,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    /// Block type, e.g. `resource` or `ingress`
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub line: usize,
}

impl Block {
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

/// Attributes and blocks in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    /// Flatten into a key → value mapping.
    ///
    /// Nested blocks become a list of block values per block type, so
    /// repeated blocks (several `ingress` blocks) are all kept, in order.
    pub fn to_value_map(&self) -> BTreeMap<String, Value> {
        let mut map: BTreeMap<String, Value> = self
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect();

        let mut grouped: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for block in &self.blocks {
            grouped
                .entry(block.kind.as_str())
                .or_default()
                .push(Value::Block(block.body.to_value_map()));
        }
        for (kind, blocks) in grouped {
            map.insert(kind.to_string(), Value::List(blocks));
        }
        map
    }
}
