//! The cumulative model: a tree of named fields built by successive merges.
//!
//! Every node is tagged as a leaf value, a list or a nested tree. Merging a
//! tree into a non-tree (or the reverse) is a structural conflict and fails
//! with the dotted path of the offending key.

use crate::error::{Result, SariError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(DateTime<Utc>),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => s.serialize_none(),
            Value::Bool(b) => s.serialize_bool(*b),
            Value::Int(i) => s.serialize_i64(*i),
            Value::Float(f) => s.serialize_f64(*f),
            Value::Str(v) => s.serialize_str(v),
            Value::Time(t) => s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Value),
    List(Vec<Node>),
    Tree(Tree),
}

impl Node {
    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Node::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Leaf(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Node::Leaf(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Leaf(Value::Time(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Leaf(Value::Null))
    }

    /// Convert a parsed YAML document. Non-string keys are stringified and
    /// tags are dropped.
    pub fn from_yaml(value: serde_yaml::Value) -> Node {
        use serde_yaml::Value as Y;
        match value {
            Y::Null => Node::Leaf(Value::Null),
            Y::Bool(b) => Node::Leaf(Value::Bool(b)),
            Y::Number(n) => match n.as_i64() {
                Some(i) => Node::Leaf(Value::Int(i)),
                None => Node::Leaf(Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Y::String(s) => Node::Leaf(Value::Str(s)),
            Y::Sequence(items) => Node::List(items.into_iter().map(Node::from_yaml).collect()),
            Y::Mapping(map) => {
                let mut tree = Tree::new();
                for (k, v) in map {
                    tree.insert(yaml_key(k), Node::from_yaml(v));
                }
                Node::Tree(tree)
            }
            Y::Tagged(tagged) => Node::from_yaml(tagged.value),
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::Leaf(v) => v.serialize(s),
            Node::List(items) => {
                let mut seq = s.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Tree(t) => t.serialize(s),
        }
    }
}

impl From<Value> for Node {
    fn from(v: Value) -> Self {
        Node::Leaf(v)
    }
}

impl From<Tree> for Node {
    fn from(t: Tree) -> Self {
        Node::Tree(t)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Leaf(Value::Str(s.to_string()))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Leaf(Value::Str(s))
    }
}

impl From<&String> for Node {
    fn from(s: &String) -> Self {
        Node::Leaf(Value::Str(s.clone()))
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Leaf(Value::Bool(b))
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::Leaf(Value::Int(i))
    }
}

impl From<u16> for Node {
    fn from(i: u16) -> Self {
        Node::Leaf(Value::Int(i64::from(i)))
    }
}

impl From<DateTime<Utc>> for Node {
    fn from(t: DateTime<Utc>) -> Self {
        Node::Leaf(Value::Time(t))
    }
}

impl From<Vec<String>> for Node {
    fn from(items: Vec<String>) -> Self {
        Node::List(items.into_iter().map(Node::from).collect())
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Node::Leaf(Value::Null))
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Ordered map of field name to node. Iteration is sorted by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree(BTreeMap<String, Node>);

/// A partial model returned by one gatherer.
pub type Delta = Tree;

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Node>) -> Option<Node> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.0.remove(key)
    }

    pub fn get_tree(&self, key: &str) -> Option<&Tree> {
        self.get(key).and_then(Node::as_tree)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Node::as_int)
    }

    pub fn get_time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key).and_then(Node::as_time)
    }

    /// String items of a list field; non-string items are skipped.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Node::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Node::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Follow a path of keys through nested trees.
    pub fn path(&self, keys: &[&str]) -> Option<&Node> {
        let (last, parents) = keys.split_last()?;
        let mut tree = self;
        for key in parents {
            tree = tree.get_tree(key)?;
        }
        tree.get(last)
    }

    pub fn tree_at(&self, keys: &[&str]) -> Option<&Tree> {
        if keys.is_empty() {
            return Some(self);
        }
        self.path(keys).and_then(Node::as_tree)
    }

    /// The sub-tree at `key`, created empty when absent.
    pub fn subtree_mut(&mut self, key: &str) -> Result<&mut Tree> {
        let node = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Node::Tree(Tree::new()));
        match node {
            Node::Tree(t) => Ok(t),
            _ => Err(SariError::MergeConflict {
                path: key.to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deep-merge `delta` into `self`.
    ///
    /// Trees merge recursively; leaves and lists in `delta` overwrite those in
    /// `self`. A tree meeting a non-tree fails with the dotted key path.
    pub fn merge(&mut self, delta: Tree) -> Result<()> {
        let mut path = Vec::new();
        self.merge_at(delta, &mut path)
    }

    fn merge_at(&mut self, delta: Tree, path: &mut Vec<String>) -> Result<()> {
        for (key, incoming) in delta.0 {
            match self.0.get_mut(&key) {
                None => {
                    self.0.insert(key, incoming);
                }
                Some(existing) => {
                    path.push(key);
                    merge_node(existing, incoming, path)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }
}

fn merge_node(existing: &mut Node, incoming: Node, path: &mut Vec<String>) -> Result<()> {
    match (existing, incoming) {
        (Node::Tree(base), Node::Tree(sub)) => base.merge_at(sub, path),
        (Node::Tree(_), _) | (_, Node::Tree(_)) => Err(SariError::MergeConflict {
            path: path.join("."),
        }),
        (slot, incoming) => {
            *slot = incoming;
            Ok(())
        }
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl FromIterator<(String, Node)> for Tree {
    fn from_iter<I: IntoIterator<Item = (String, Node)>>(iter: I) -> Self {
        Tree(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// The cumulative reconciled state. Only the orchestrator merges into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Model {
    root: Tree,
}

impl Model {
    pub fn new(seed: Tree) -> Self {
        Self { root: seed }
    }

    pub fn root(&self) -> &Tree {
        &self.root
    }

    pub fn into_tree(self) -> Tree {
        self.root
    }

    pub fn merge(&mut self, delta: Delta) -> Result<()> {
        self.root.merge(delta)
    }
}

impl std::ops::Deref for Model {
    type Target = Tree;

    fn deref(&self) -> &Tree {
        &self.root
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
