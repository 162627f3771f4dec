use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Value};

use super::media::DataUri;
use crate::error::{DefinitionError, SchemaError, ValueKind};

/// Shape of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Boolean,
    StringList,
    /// Free-form mapping of label to display string.
    Mapping,
    Record(RecordSchema),
}

impl FieldKind {
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::StringList => "array of strings",
            FieldKind::Mapping => "mapping of strings",
            FieldKind::Record(_) => "record",
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Boolean)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Checks applied after the kind matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Strings must not be blank. Sequences must hold at least one element,
    /// none of them blank.
    NonEmpty,
    /// `data:<mimetype>;base64,<payload>`
    DataUri,
}

impl Constraint {
    pub fn label(&self) -> &'static str {
        match self {
            Constraint::NonEmpty => "non_empty",
            Constraint::DataUri => "data_uri",
        }
    }

    fn applies_to(&self, kind: &FieldKind) -> bool {
        match self {
            Constraint::NonEmpty => matches!(kind, FieldKind::String | FieldKind::StringList),
            Constraint::DataUri => matches!(kind, FieldKind::String),
        }
    }

    fn check(&self, field: &str, value: &Value) -> Result<(), SchemaError> {
        let violation = |reason: String| SchemaError::Constraint {
            field: field.to_string(),
            reason,
        };
        match (self, value) {
            (Constraint::NonEmpty, Value::String(s)) if s.trim().is_empty() => {
                Err(violation("must not be empty".into()))
            }
            (Constraint::NonEmpty, Value::Array(items)) if items.is_empty() => {
                Err(violation("must contain at least one element".into()))
            }
            (Constraint::NonEmpty, Value::Array(items)) => {
                let blank = items
                    .iter()
                    .position(|item| item.as_str().is_some_and(|s| s.trim().is_empty()));
                match blank {
                    Some(index) => Err(SchemaError::Constraint {
                        field: format!("{field}[{index}]"),
                        reason: "must not be empty".into(),
                    }),
                    None => Ok(()),
                }
            }
            (Constraint::DataUri, Value::String(s)) => s
                .parse::<DataUri>()
                .map(|_| ())
                .map_err(|e| violation(format!("not a data URI: {e}"))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    pub optional: bool,
    pub description: Option<String>,
    pub constraints: Vec<Constraint>,
}

impl FieldSchema {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            description: None,
            constraints: Vec::new(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            optional: true,
            ..Self::required(name, kind)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_constraint(&self, constraint: Constraint) -> bool {
        self.constraints.contains(&constraint)
    }
}

/// Ordered, immutable set of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSchema {
    fields: Vec<FieldSchema>,
}

impl RecordSchema {
    pub fn new(fields: Vec<FieldSchema>) -> Result<Self, DefinitionError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DefinitionError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Attaches a constraint to a declared field.
    pub fn with_constraint(
        mut self,
        name: &str,
        constraint: Constraint,
    ) -> Result<Self, DefinitionError> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| DefinitionError::UnknownField {
                field: name.to_string(),
                marker: constraint.label(),
            })?;

        if !constraint.applies_to(&field.kind) {
            return Err(DefinitionError::ConstraintMismatch {
                field: name.to_string(),
                constraint: constraint.label(),
                kind: field.kind.label(),
            });
        }
        if !field.constraints.contains(&constraint) {
            field.constraints.push(constraint);
        }
        Ok(self)
    }

    /// Gates a record against this schema. Undeclared keys are ignored and
    /// nothing is coerced; on success the record's map is handed back as is.
    pub fn validate<'a>(&self, record: &'a Value) -> Result<&'a Map<String, Value>, SchemaError> {
        let map = record.as_object().ok_or(SchemaError::NotARecord {
            found: ValueKind::of(record),
        })?;
        self.validate_map(map, "")?;
        Ok(map)
    }

    fn validate_map(&self, map: &Map<String, Value>, prefix: &str) -> Result<(), SchemaError> {
        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{prefix}.{}", field.name)
            };

            // Absent and null are the same thing for optional fields.
            let value = match map.get(&field.name) {
                None | Some(Value::Null) if field.optional => continue,
                None => {
                    return Err(SchemaError::Missing {
                        field: path,
                        expected: field.kind.label(),
                    });
                }
                Some(value) => value,
            };

            check_kind(&field.kind, value, &path)?;
            for constraint in &field.constraints {
                constraint.check(&path, value)?;
            }
        }
        Ok(())
    }
}

fn check_kind(kind: &FieldKind, value: &Value, path: &str) -> Result<(), SchemaError> {
    let mismatch = |at: String, expected: &'static str, found: &Value| SchemaError::WrongKind {
        field: at,
        expected,
        found: ValueKind::of(found),
    };

    match (kind, value) {
        (FieldKind::String, Value::String(_)) | (FieldKind::Boolean, Value::Bool(_)) => Ok(()),
        (FieldKind::StringList, Value::Array(items)) => {
            match items.iter().enumerate().find(|(_, item)| !item.is_string()) {
                Some((i, item)) => Err(mismatch(format!("{path}[{i}]"), "string", item)),
                None => Ok(()),
            }
        }
        (FieldKind::Mapping, Value::Object(entries)) => {
            match entries.iter().find(|(_, v)| !v.is_string()) {
                Some((key, v)) => Err(mismatch(format!("{path}.{key}"), "string", v)),
                None => Ok(()),
            }
        }
        (FieldKind::Record(schema), Value::Object(entries)) => schema.validate_map(entries, path),
        (kind, other) => Err(mismatch(path.to_string(), kind.label(), other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recipe_input() -> RecordSchema {
        RecordSchema::new(vec![
            FieldSchema::required("ingredients", FieldKind::StringList),
            FieldSchema::optional("vegetarian", FieldKind::Boolean),
            FieldSchema::optional("vegan", FieldKind::Boolean),
        ])
        .unwrap()
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = recipe_input().validate(&json!({ "vegetarian": true })).unwrap_err();
        assert_eq!(
            err,
            SchemaError::Missing {
                field: "ingredients".into(),
                expected: "array of strings"
            }
        );
    }

    #[test]
    fn optional_fields_may_be_absent_or_null() {
        let schema = recipe_input();
        assert!(schema.validate(&json!({ "ingredients": ["egg", "rice"] })).is_ok());
        assert!(schema.validate(&json!({ "ingredients": [], "vegan": null })).is_ok());
    }

    #[test]
    fn optional_fields_are_still_typed() {
        let err = recipe_input()
            .validate(&json!({ "ingredients": ["egg"], "vegan": "yes" }))
            .unwrap_err();
        assert_eq!(err.field(), Some("vegan"));
        assert!(matches!(err, SchemaError::WrongKind { found: ValueKind::String, .. }));
    }

    #[test]
    fn sequence_elements_are_checked_with_index() {
        let err = recipe_input()
            .validate(&json!({ "ingredients": ["egg", 3] }))
            .unwrap_err();
        assert_eq!(err.field(), Some("ingredients[1]"));
    }

    #[test]
    fn extras_are_ignored_and_record_is_untouched() {
        let record = json!({ "ingredients": ["egg"], "commentary": "looks tasty" });
        let map = recipe_input().validate(&record).unwrap();
        assert_eq!(map.get("commentary"), Some(&json!("looks tasty")));
    }

    #[test]
    fn non_object_is_rejected() {
        let err = recipe_input().validate(&json!(["egg"])).unwrap_err();
        assert_eq!(err, SchemaError::NotARecord { found: ValueKind::Array });
    }

    #[test]
    fn nested_records_report_dotted_paths() {
        let inner =
            RecordSchema::new(vec![FieldSchema::required("calories", FieldKind::String)]).unwrap();
        let outer =
            RecordSchema::new(vec![FieldSchema::required("facts", FieldKind::Record(inner))])
                .unwrap();

        let err = outer.validate(&json!({ "facts": {} })).unwrap_err();
        assert_eq!(err.field(), Some("facts.calories"));
        assert!(outer.validate(&json!({ "facts": { "calories": "420 kcal" } })).is_ok());
    }

    #[test]
    fn mapping_values_must_be_strings() {
        let schema =
            RecordSchema::new(vec![FieldSchema::optional("nutrition", FieldKind::Mapping)])
                .unwrap();
        assert!(schema.validate(&json!({ "nutrition": { "Protein": "32g" } })).is_ok());
        let err = schema.validate(&json!({ "nutrition": { "Protein": 32 } })).unwrap_err();
        assert_eq!(err.field(), Some("nutrition.Protein"));
    }

    #[test]
    fn duplicate_fields_are_a_definition_error() {
        let err = RecordSchema::new(vec![
            FieldSchema::required("steps", FieldKind::StringList),
            FieldSchema::required("steps", FieldKind::String),
        ])
        .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateField(name) if name == "steps"));
    }

    #[test]
    fn non_empty_constraint() {
        let schema = recipe_input()
            .with_constraint("ingredients", Constraint::NonEmpty)
            .unwrap();
        let err = schema.validate(&json!({ "ingredients": [] })).unwrap_err();
        assert!(matches!(err, SchemaError::Constraint { ref field, .. } if field == "ingredients"));

        let err = schema
            .validate(&json!({ "ingredients": ["egg", "  "] }))
            .unwrap_err();
        assert_eq!(err.field(), Some("ingredients[1]"));
        assert!(schema.validate(&json!({ "ingredients": ["egg"] })).is_ok());
    }

    #[test]
    fn data_uri_constraint() {
        let schema =
            RecordSchema::new(vec![FieldSchema::required("photoDataUri", FieldKind::String)])
                .unwrap()
                .with_constraint("photoDataUri", Constraint::DataUri)
                .unwrap();

        let valid = json!({ "photoDataUri": "data:image/png;base64,aGVsbG8=" });
        assert!(schema.validate(&valid).is_ok());
        let err = schema.validate(&json!({ "photoDataUri": "not-a-uri" })).unwrap_err();
        assert_eq!(err.field(), Some("photoDataUri"));
    }

    #[test]
    fn constraints_must_fit_the_kind() {
        let err = recipe_input()
            .with_constraint("vegan", Constraint::DataUri)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::ConstraintMismatch { .. }));

        let err = recipe_input()
            .with_constraint("nope", Constraint::NonEmpty)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownField { .. }));
    }
}
