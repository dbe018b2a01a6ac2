use serde::{Deserialize, Serialize};

/// One delimited line split into its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTuple {
    /// 1-based physical line number in the input.
    pub line: usize,
    pub values: Vec<String>,
}

impl RawTuple {
    pub fn new(line: usize, values: Vec<String>) -> Self {
        Self { line, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub type FieldSetter<T> = fn(&mut T, String);

/// A record type the field mapper can populate by attribute name.
pub trait Bindable: Default + Send + Sync + 'static {
    fn setter(name: &str) -> Option<FieldSetter<Self>>;
}

/// Exposes the text attributes of a record for in-place rewriting.
pub trait TextFields {
    fn text_fields_mut(&mut self) -> Vec<&mut String>;
}

/// Supplies named statement parameters from a record.
pub trait ParameterSource: Send + Sync {
    fn parameter(&self, name: &str) -> Option<String>;
}
