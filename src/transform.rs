use crate::core::{Result, TextFields, Transform};
use async_trait::async_trait;
use std::marker::PhantomData;

/// Returns a copy of the record with every text attribute uppercased.
pub struct UppercaseTransform<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> UppercaseTransform<T> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<T> Default for UppercaseTransform<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Transform<T, T> for UppercaseTransform<T>
where
    T: TextFields + Clone + Send + Sync,
{
    async fn transform(&self, item: &T) -> Result<T> {
        let mut out = item.clone();
        for field in out.text_fields_mut() {
            *field = field.to_uppercase();
        }
        Ok(out)
    }
}
