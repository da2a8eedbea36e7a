use crate::types::FieldType;
use std::collections::BTreeMap;

/// Per-translation settings: the declared type of each field, used to coerce
/// untyped SQL literals, and the type assumed for fields with no declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranslateOptions {
    pub field_types: BTreeMap<String, FieldType>,
    pub default_field_type: FieldType,
}

impl TranslateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_type(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.field_types.insert(field.into(), field_type);
        self
    }

    pub fn with_default_field_type(mut self, field_type: FieldType) -> Self {
        self.default_field_type = field_type;
        self
    }

    pub(crate) fn field_type(&self, field: &str) -> FieldType {
        self.field_types
            .get(field)
            .copied()
            .unwrap_or(self.default_field_type)
    }
}
