use std::iter::FromIterator;

/// The value of one message directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A single string.
    Text(String),
    /// A counter or size.
    Number(u32),
    /// An ordered list of strings.
    List(Vec<String>),
}

impl Value {
    /// The string, if this is a `Text`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The number, if this is a `Number`.
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// The entries of a `List`, or the single entry of a `Text`.
    pub fn as_list(&self) -> Vec<&str> {
        match self {
            Value::Text(text) => vec![text.as_str()],
            Value::List(list) => list.iter().map(String::as_str).collect(),
            Value::Number(_) => Vec::new(),
        }
    }

    /// Whether `needle` is one of the strings held by this value.
    pub fn contains(&self, needle: &str) -> bool {
        self.as_list().contains(&needle)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Value {
        Value::Text(text)
    }
}

impl<'a> From<&'a str> for Value {
    fn from(text: &'a str) -> Value {
        Value::Text(text.to_owned())
    }
}

impl From<u32> for Value {
    fn from(number: u32) -> Value {
        Value::Number(number)
    }
}

impl From<Vec<String>> for Value {
    fn from(list: Vec<String>) -> Value {
        Value::List(list)
    }
}

/// One protocol message: directives in insertion order, each name at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    entries: Vec<(String, Value)>,
}

impl Message {
    /// An empty message.
    pub fn new() -> Message {
        Message::default()
    }

    /// The value of `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// The value of `name` when it is a `Text`.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// The value of `name` when it is a `Number`.
    pub fn get_number(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(Value::as_number)
    }

    /// Whether `name` is present.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name`, overwriting an existing value in place.
    pub fn set<N: Into<String>, V: Into<Value>>(&mut self, name: N, value: V) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of `set`.
    pub fn with<N: Into<String>, V: Into<Value>>(mut self, name: N, value: V) -> Message {
        self.set(name, value);
        self
    }

    /// Removes `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Number of directives.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no directives.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the directives in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Message {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Message {
        let mut message = Message::new();
        for (name, value) in iter {
            message.set(name, value);
        }
        message
    }
}
