//! Dotted-path addressing into a configuration tree.
//!
//! Paths look like `server.listeners[0].port`. A plain numeric segment such as
//! `listeners.0` also indexes into a sequence, and a bracketed index into a
//! mapping looks up the stringified key.

use serde_json::Value;
use std::fmt;

/// One step of a [`TreePath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed path from the root of a configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreePath(Vec<Segment>);

impl TreePath {
    /// The empty path, addressing the tree root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path. Returns `None` for empty or malformed input.
    pub fn parse(input: &str) -> Option<Self> {
        if input.is_empty() {
            return None;
        }

        let mut segments = Vec::new();
        for part in input.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };

            if name.is_empty() && rest.is_empty() {
                return None;
            }
            if !name.is_empty() {
                segments.push(Segment::Key(name.to_string()));
            }

            while !rest.is_empty() {
                let inner = rest.strip_prefix('[')?;
                let close = inner.find(']')?;
                let index = inner[..close].parse::<usize>().ok()?;
                segments.push(Segment::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Some(Self(segments))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// A new path extended by one segment.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// Look the path up in `tree`.
    pub fn get<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .try_fold(tree, |node, segment| step(node, segment))
    }

    /// Mutable lookup; never creates intermediate nodes.
    pub fn get_mut<'a>(&self, tree: &'a mut Value) -> Option<&'a mut Value> {
        self.0
            .iter()
            .try_fold(tree, |node, segment| step_mut(node, segment))
    }

    /// Replace the value at an existing path. Returns `false` if the path is absent.
    pub fn set(&self, tree: &mut Value, value: Value) -> bool {
        match self.get_mut(tree) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

fn step<'a>(node: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (node, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        (Value::Array(items), Segment::Key(key)) => items.get(key.parse::<usize>().ok()?),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match (node, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get_mut(key),
        (Value::Object(map), Segment::Index(index)) => map.get_mut(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get_mut(*index),
        (Value::Array(items), Segment::Key(key)) => items.get_mut(key.parse::<usize>().ok()?),
        _ => None,
    }
}

/// Loose truthiness: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
