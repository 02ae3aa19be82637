use std::{fmt::Display, ops::RangeInclusive};

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{
    DEFAULT_DO_SAMPLE, DEFAULT_MAX_NEW_TOKENS, DEFAULT_PROMPT, DEFAULT_REPETITION_PENALTY,
    DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P, GenerationRequest,
    RawGenerationRequest,
};

pub const MAX_NEW_TOKENS_BOUNDS: RangeInclusive<i64> = 1..=2048;
pub const TEMPERATURE_BOUNDS: RangeInclusive<f64> = 0.0..=2.0;
pub const TOP_P_BOUNDS: RangeInclusive<f64> = 0.0..=1.0;
pub const TOP_K_BOUNDS: RangeInclusive<i64> = 1..=100;
pub const REPETITION_PENALTY_BOUNDS: RangeInclusive<f64> = 1.0..=2.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: String,
        max: String,
        value: String,
    },
    #[error("{field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("malformed body: {0}")]
    Body(String),
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::OutOfRange { field, .. } | ValidationError::WrongType { field, .. } => {
                *field
            }
            ValidationError::Body(_) => "request",
        }
    }
}

impl RawGenerationRequest {
    pub fn validate(self) -> Result<GenerationRequest, ValidationError> {
        let max_new_tokens = check_bounds(
            "max_new_tokens",
            self.max_new_tokens.unwrap_or(i64::from(DEFAULT_MAX_NEW_TOKENS)),
            &MAX_NEW_TOKENS_BOUNDS,
        )?;
        let temperature = check_bounds(
            "temperature",
            self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            &TEMPERATURE_BOUNDS,
        )?;
        let top_p = check_bounds("top_p", self.top_p.unwrap_or(DEFAULT_TOP_P), &TOP_P_BOUNDS)?;
        let top_k = check_bounds(
            "top_k",
            self.top_k.unwrap_or(i64::from(DEFAULT_TOP_K)),
            &TOP_K_BOUNDS,
        )?;
        let repetition_penalty = check_bounds(
            "repetition_penalty",
            self.repetition_penalty.unwrap_or(DEFAULT_REPETITION_PENALTY),
            &REPETITION_PENALTY_BOUNDS,
        )?;

        Ok(GenerationRequest {
            prompt: self.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            system_prompt: self
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            // Both integer bounds sit well inside u32.
            max_new_tokens: max_new_tokens as u32,
            temperature,
            top_p,
            top_k: top_k as u32,
            do_sample: self.do_sample.unwrap_or(DEFAULT_DO_SAMPLE),
            repetition_penalty,
        })
    }
}

impl GenerationRequest {
    /// Validates a JSON body. `null` counts as an empty object; `null` on an
    /// optional field counts as omitted. Unknown keys are ignored.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        match body {
            Value::Null => RawGenerationRequest::default().validate(),
            Value::Object(map) => Self::from_map(map),
            _ => Err(ValidationError::WrongType {
                field: "request",
                expected: "a JSON object",
            }),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ValidationError> {
        let prompt = match map.get("prompt") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "prompt",
                    expected: "a string",
                });
            }
        };

        let raw = RawGenerationRequest {
            prompt,
            system_prompt: optional_field(map, "system_prompt", "a string", |v| {
                v.as_str().map(str::to_string)
            })?,
            max_new_tokens: optional_integer(map, "max_new_tokens", &MAX_NEW_TOKENS_BOUNDS)?,
            temperature: optional_field(map, "temperature", "a number", Value::as_f64)?,
            top_p: optional_field(map, "top_p", "a number", Value::as_f64)?,
            top_k: optional_integer(map, "top_k", &TOP_K_BOUNDS)?,
            do_sample: optional_field(map, "do_sample", "a boolean", Value::as_bool)?,
            repetition_penalty: optional_field(map, "repetition_penalty", "a number", Value::as_f64)?,
        };
        raw.validate()
    }
}

fn optional_field<T>(
    map: &Map<String, Value>,
    field: &'static str,
    expected: &'static str,
    extract: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => extract(value)
            .map(Some)
            .ok_or(ValidationError::WrongType { field, expected }),
    }
}

/// Integer fields take any integral JSON number, so `10` and `10.0` agree.
/// Numbers too large for `i64` are out of range, not mistyped.
fn optional_integer(
    map: &Map<String, Value>,
    field: &'static str,
    bounds: &RangeInclusive<i64>,
) -> Result<Option<i64>, ValidationError> {
    let number = match map.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => number,
        Some(_) => {
            return Err(ValidationError::WrongType {
                field,
                expected: "an integer",
            });
        }
    };

    if let Some(value) = number.as_i64() {
        return Ok(Some(value));
    }
    if number.is_u64() {
        return Err(out_of_range(field, bounds, number));
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 => {
            // 2^63 as f64; anything at or past it does not fit.
            if value >= -(i64::MIN as f64) || value < i64::MIN as f64 {
                Err(out_of_range(field, bounds, number))
            } else {
                Ok(Some(value as i64))
            }
        }
        _ => Err(ValidationError::WrongType {
            field,
            expected: "an integer",
        }),
    }
}

fn out_of_range<T: Display>(
    field: &'static str,
    bounds: &RangeInclusive<T>,
    value: impl Display,
) -> ValidationError {
    ValidationError::OutOfRange {
        field,
        min: bounds.start().to_string(),
        max: bounds.end().to_string(),
        value: value.to_string(),
    }
}

fn check_bounds<T>(
    field: &'static str,
    value: T,
    bounds: &RangeInclusive<T>,
) -> Result<T, ValidationError>
where
    T: PartialOrd + Display + Copy,
{
    // `contains` is false for NaN.
    if bounds.contains(&value) {
        Ok(value)
    } else {
        Err(out_of_range(field, bounds, value))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn validate(body: Value) -> Result<GenerationRequest, ValidationError> {
        GenerationRequest::from_json(&body)
    }

    #[test]
    fn empty_body_gets_documented_defaults() {
        let request = validate(json!({})).unwrap();
        assert_eq!(request, GenerationRequest::default());
        assert_eq!(request.max_new_tokens, 256);
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.top_p, 0.9);
        assert_eq!(request.top_k, 50);
        assert!(request.do_sample);
        assert_eq!(request.repetition_penalty, 1.1);
        assert_eq!(
            request.system_prompt,
            "You are a helpful and knowledgeable assistant."
        );
    }

    #[test]
    fn null_body_behaves_like_empty_object() {
        assert_eq!(validate(Value::Null).unwrap(), GenerationRequest::default());
    }

    #[test]
    fn inclusive_bounds_are_accepted() {
        let low = validate(json!({
            "max_new_tokens": 1, "temperature": 0.0, "top_p": 0.0,
            "top_k": 1, "repetition_penalty": 1.0
        }))
        .unwrap();
        assert_eq!(low.max_new_tokens, 1);
        assert_eq!(low.top_k, 1);

        let high = validate(json!({
            "max_new_tokens": 2048, "temperature": 2.0, "top_p": 1.0,
            "top_k": 100, "repetition_penalty": 2.0
        }))
        .unwrap();
        assert_eq!(high.max_new_tokens, 2048);
        assert_eq!(high.top_k, 100);
        assert_eq!(high.repetition_penalty, 2.0);
    }

    #[test]
    fn one_step_outside_each_bound_names_the_field() {
        let cases = [
            ("max_new_tokens", json!(0)),
            ("max_new_tokens", json!(2049)),
            ("temperature", json!(-0.1)),
            ("temperature", json!(2.1)),
            ("top_p", json!(-0.01)),
            ("top_p", json!(1.5)),
            ("top_k", json!(0)),
            ("top_k", json!(101)),
            ("repetition_penalty", json!(0.99)),
            ("repetition_penalty", json!(2.01)),
        ];
        for (field, value) in cases {
            let mut body = Map::new();
            body.insert(field.to_string(), value.clone());
            let err = GenerationRequest::from_map(&body).unwrap_err();
            assert_eq!(err.field(), field, "value {value}");
            assert!(matches!(err, ValidationError::OutOfRange { .. }));
        }
    }

    #[test]
    fn out_of_range_message_carries_bounds() {
        let err = validate(json!({"top_p": 1.5})).unwrap_err();
        assert_eq!(err.to_string(), "top_p must be within [0, 1], got 1.5");
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert_eq!(
            validate(json!({"top_k": 2.5})).unwrap_err(),
            ValidationError::WrongType {
                field: "top_k",
                expected: "an integer"
            }
        );
        assert_eq!(validate(json!({"do_sample": "yes"})).unwrap_err().field(), "do_sample");
        assert_eq!(validate(json!({"prompt": null})).unwrap_err().field(), "prompt");
        assert_eq!(validate(json!([1, 2])).unwrap_err().field(), "request");
    }

    #[test]
    fn integral_floats_are_accepted_for_integer_fields() {
        let request = validate(json!({"max_new_tokens": 10.0, "top_k": 5.0})).unwrap();
        assert_eq!(request.max_new_tokens, 10);
        assert_eq!(request.top_k, 5);

        let err = validate(json!({"top_k": 0.0})).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "top_k", .. }));
    }

    #[test]
    fn huge_integers_are_out_of_range_not_mistyped() {
        let cases = [
            ("max_new_tokens", json!(u64::MAX)),
            ("top_k", json!(u64::MAX)),
            ("max_new_tokens", json!(1e20)),
            ("top_k", json!(-1e20)),
        ];
        for (field, value) in cases {
            let mut body = Map::new();
            body.insert(field.to_string(), value.clone());
            let err = GenerationRequest::from_map(&body).unwrap_err();
            assert!(
                matches!(err, ValidationError::OutOfRange { field: f, .. } if f == field),
                "{value}: {err:?}"
            );
        }

        let err = validate(json!({"max_new_tokens": u64::MAX})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "max_new_tokens must be within [1, 2048], got 18446744073709551615"
        );
    }

    #[test]
    fn null_optional_fields_take_defaults() {
        let request = validate(json!({"system_prompt": null, "top_k": null})).unwrap();
        assert_eq!(request.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(request.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn integers_are_accepted_for_float_fields() {
        let request = validate(json!({"temperature": 1, "repetition_penalty": 2})).unwrap();
        assert_eq!(request.temperature, 1.0);
        assert_eq!(request.repetition_penalty, 2.0);
    }

    #[test]
    fn nan_fails_the_typed_path() {
        let raw = RawGenerationRequest {
            temperature: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(raw.validate().unwrap_err().field(), "temperature");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let request = validate(json!({"prompt": "hi", "stream": true})).unwrap();
        assert_eq!(request.prompt, "hi");
    }
}
