//! Schema checks for implementation-specific configuration tables.
//!
//! Every commerce adapter, wallet rail and storage backend is configured from
//! a free-form `toml::Value`. Before the factory builds the implementation,
//! the table is checked against the implementation's [`ConfigSchema`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	fn type_mismatch(field: &str, expected: &str, value: &toml::Value) -> Self {
		ValidationError::TypeMismatch {
			field: field.to_string(),
			expected: expected.to_string(),
			actual: value.type_str().to_string(),
		}
	}

	/// Prefixes the field path with the name of the enclosing table.
	fn nested_in(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => ValidationError::MissingField(format!("{}.{}", parent, f)),
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
			other => other,
		}
	}
}

#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Float,
	Boolean,
	/// String restricted to a fixed vocabulary.
	OneOf(&'static [&'static str]),
	Array(Box<FieldType>),
	Table(Schema),
}

pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of one configuration table.
#[derive(Debug, Default)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::type_mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn check_type(name: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			if !value.is_str() {
				return Err(ValidationError::type_mismatch(name, "string", value));
			}
		}
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| ValidationError::type_mismatch(name, "integer", value))?;
			if let Some(min) = min.filter(|min| int_val < *min) {
				return Err(ValidationError::InvalidValue {
					field: name.to_string(),
					message: format!("Value {} is less than minimum {}", int_val, min),
				});
			}
			if let Some(max) = max.filter(|max| int_val > *max) {
				return Err(ValidationError::InvalidValue {
					field: name.to_string(),
					message: format!("Value {} is greater than maximum {}", int_val, max),
				});
			}
		}
		FieldType::Float => {
			if !(value.is_float() || value.is_integer()) {
				return Err(ValidationError::type_mismatch(name, "float", value));
			}
		}
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(ValidationError::type_mismatch(name, "boolean", value));
			}
		}
		FieldType::OneOf(allowed) => {
			let s = value
				.as_str()
				.ok_or_else(|| ValidationError::type_mismatch(name, "string", value))?;
			if !allowed.contains(&s) {
				return Err(ValidationError::InvalidValue {
					field: name.to_string(),
					message: format!("'{}' is not one of {:?}", s, allowed),
				});
			}
		}
		FieldType::Array(inner) => {
			let array = value
				.as_array()
				.ok_or_else(|| ValidationError::type_mismatch(name, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				check_type(&format!("{}[{}]", name, i), item, inner)?;
			}
		}
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.nested_in(name))?;
		}
	}

	Ok(())
}

/// Validator for string fields that must not be blank.
pub fn non_empty(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(s) if !s.trim().is_empty() => Ok(()),
		_ => Err("must not be empty".to_string()),
	}
}

/// Validator for string fields holding an absolute http(s) URL.
pub fn http_url(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(s) if s.starts_with("http://") || s.starts_with("https://") => Ok(()),
		_ => Err("must be an http:// or https:// URL".to_string()),
	}
}

/// Implemented by every configurable implementation.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

impl ConfigSchema for Schema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::validate(self, config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(src: &str) -> toml::Value {
		toml::Value::Table(toml::from_str::<toml::Table>(src).unwrap())
	}

	fn schema() -> Schema {
		Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(http_url)],
			vec![
				Field::new(
					"timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new("mode", FieldType::OneOf(&["live", "sandbox"])),
			],
		)
	}

	#[test]
	fn test_valid_table_passes() {
		let config = table(
			r#"
			base_url = "https://api.example.com"
			timeout_secs = 30
			mode = "sandbox"
			"#,
		);
		assert!(schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_and_invalid_fields() {
		let config = table("timeout_secs = 30");
		assert!(matches!(
			schema().validate(&config),
			Err(ValidationError::MissingField(f)) if f == "base_url"
		));

		let config = table(
			r#"
			base_url = "ftp://nope"
			"#,
		);
		assert!(matches!(
			schema().validate(&config),
			Err(ValidationError::InvalidValue { .. })
		));

		let config = table(
			r#"
			base_url = "https://api.example.com"
			mode = "prod"
			"#,
		);
		assert!(schema().validate(&config).is_err());
	}

	#[test]
	fn test_nested_table_paths() {
		let outer = Schema::new(
			vec![Field::new("gateway", FieldType::Table(schema()))],
			vec![],
		);
		let config = table("[gateway]\ntimeout_secs = 0");
		match outer.validate(&config) {
			Err(ValidationError::MissingField(f)) => assert_eq!(f, "gateway.base_url"),
			other => panic!("unexpected: {:?}", other),
		}
	}
}
