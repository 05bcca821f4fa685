use crate::core::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One record of a tabular source. Column order is the order the source
/// returned them in; lookups by name are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    entity: String,
    fields: Vec<Field>,
}

impl Row {
    pub fn new(entity: &str, fields: Vec<Field>) -> Self {
        Row {
            entity: entity.to_string(),
            fields,
        }
    }

    /// Appends a column, replacing any existing column of the same name.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(name))
        {
            Some(field) => field.value = value,
            None => self.fields.push(Field::new(name, value)),
        }
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(column))
            .map(|f| &f.value)
    }

    /// Like [`Row::get`], but a missing column reads as `NULL`.
    pub fn get_value(&self, column: &str) -> Value {
        self.get(column).cloned().unwrap_or(Value::Null)
    }

    /// Returns a copy of the row restricted to `columns`, in the given order.
    pub fn project(&self, columns: &[String]) -> Row {
        let fields = columns
            .iter()
            .filter_map(|c| {
                self.fields
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(c))
                    .cloned()
            })
            .collect();
        Row::new(&self.entity, fields)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_row() -> Row {
        Row::new(
            "user_data",
            vec![
                Field::new("user_id", "00234e50-34eb-4ce2-94ec-26e3fa749796"),
                Field::new("name", "Dan Altenwerth Jr."),
                Field::new("email", "Molly59@gmail.com"),
                Field::new("age", 67),
            ],
        )
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let row = user_row();
        assert_eq!(row.get("AGE"), Some(&Value::Int(67)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_value("missing"), Value::Null);
    }

    #[test]
    fn test_project_keeps_requested_order() {
        let row = user_row().project(&["age".to_string(), "name".to_string()]);
        let columns = row.columns().collect::<Vec<_>>();
        assert_eq!(columns, vec!["age", "name"]);
    }

    #[test]
    fn test_with_replaces_or_appends() {
        let row = user_row().with("Age", 68).with("active", true);
        assert_eq!(row.len(), 5);
        assert_eq!(row.get("age"), Some(&Value::Int(68)));
        assert_eq!(row.get("active"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_to_json() {
        let json = user_row().to_json();
        assert_eq!(json["age"], serde_json::json!(67));
        assert_eq!(json["email"], serde_json::json!("Molly59@gmail.com"));
    }
}
