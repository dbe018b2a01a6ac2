use crate::core::{BatchError, Bindable, FieldBindingSpec, FieldSetter, RawTuple, Result};

/// Binds tuple positions to record attributes. Every name is resolved when
/// the mapper is built, so an unknown attribute fails at startup rather than
/// on the first line.
pub struct FieldMapper<T: Bindable> {
    bindings: Vec<(String, FieldSetter<T>)>,
}

impl<T: Bindable> FieldMapper<T> {
    pub fn new(spec: &FieldBindingSpec) -> Result<Self> {
        let bindings = spec
            .names()
            .iter()
            .map(|name| {
                T::setter(name).map(|set| (name.clone(), set)).ok_or_else(|| {
                    BatchError::Binding(format!(
                        "No attribute '{}' on {}",
                        name,
                        std::any::type_name::<T>()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { bindings })
    }

    pub fn map(&self, tuple: RawTuple) -> Result<T> {
        if tuple.len() != self.bindings.len() {
            return Err(BatchError::Binding(format!(
                "Line {} has {} values for {} bound fields",
                tuple.line,
                tuple.len(),
                self.bindings.len()
            )));
        }

        let mut record = T::default();
        for ((_, set), value) in self.bindings.iter().zip(tuple.values) {
            set(&mut record, value);
        }
        Ok(record)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }
}
