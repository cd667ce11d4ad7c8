// JSON schema derivation and validation for structured outputs.

use schemars::generate::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

use promptgen_types::Error;

/// A compiled JSON schema plus its canonical text.
///
/// Every violation found is reported, not just the first: the error message is a
/// `"; "`-joined list of `"<field>: <description>"` entries.
pub struct SchemaValidator {
    schema: Value,
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Derive the schema of `T` from its field constraints and compile it.
    pub fn for_type<T: JsonSchema>() -> Result<Self, Error> {
        let root = SchemaSettings::draft07()
            .with(|s| s.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<T>();
        let mut schema = serde_json::to_value(root).map_err(|e| {
            Error::configuration(format!("failed to serialize schema: {e}")).with_source(e)
        })?;
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
            obj.remove("definitions");
            obj.remove("$defs");
        }
        close_objects(&mut schema);
        Self::from_schema(schema)
    }

    /// Compile a hand-written schema as-is.
    pub fn from_schema(schema: Value) -> Result<Self, Error> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            Error::configuration(format!("invalid JSON schema: {e}")).with_code("invalid_schema")
        })?;
        Ok(Self { schema, validator })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Pretty-printed schema text, as embedded in prompts.
    pub fn schema_string(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(&self.schema).map_err(|e| {
            Error::configuration(format!("failed to serialize schema: {e}")).with_source(e)
        })
    }

    /// Check raw JSON bytes. Malformed JSON is an `InvalidResponse` error.
    pub fn validate_bytes(&self, bytes: &[u8]) -> Result<(), Error> {
        let instance: Value = serde_json::from_slice(bytes).map_err(|e| {
            Error::invalid_response(format!("failed to parse JSON: {e}"))
                .with_code("invalid_json")
                .with_source(e)
        })?;
        self.validate_value(&instance)
    }

    pub fn validate_value(&self, instance: &Value) -> Result<(), Error> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|err| format!("{}: {}", field_name(&err.instance_path.to_string()), err))
            .collect();

        if violations.is_empty() {
            return Ok(());
        }
        let count = violations.len();
        Err(Error::validation(violations.join("; ")).with_detail("violations", count))
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// `/items/0/name` becomes `items.0.name`; the document root is `(root)`.
fn field_name(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "(root)".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}

/// Forbid unknown properties on every object schema, at any depth.
fn close_objects(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            let is_object = map.contains_key("properties")
                || map.get("type").is_some_and(|t| {
                    t == "object" || t.as_array().is_some_and(|a| a.iter().any(|v| v == "object"))
                });
            if is_object && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".into(), Value::Bool(false));
            }
            for value in map.values_mut() {
                close_objects(value);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}
