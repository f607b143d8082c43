//! Input validation helpers shared by operation serializers.

// self
use crate::{
	_prelude::*,
	error::{FieldViolation, ValidationError},
};

const IDENTIFIER_MAX_LEN: usize = 128;

/// Collects every field violation of one operation input before failing.
#[derive(Debug)]
pub struct Validator {
	operation: String,
	violations: Vec<FieldViolation>,
}
impl Validator {
	/// Starts validating the input of the provided operation.
	pub fn new(operation: impl Into<String>) -> Self {
		Self { operation: operation.into(), violations: Vec::new() }
	}

	/// Requires an optional value to be present (and, for strings, non-blank).
	pub fn required<T>(self, field: &str, value: Option<T>) -> Self
	where
		T: AsRef<str>,
	{
		let present = value.as_ref().is_some_and(|value| !value.as_ref().trim().is_empty());

		self.check(field, present, "is required")
	}

	/// Requires a non-empty identifier without whitespace, at most 128 characters long.
	pub fn identifier(self, field: &str, value: &str) -> Self {
		if value.is_empty() {
			return self.violation(field, "cannot be empty");
		}
		if value.chars().any(char::is_whitespace) {
			return self.violation(field, "contains whitespace");
		}
		if value.chars().count() > IDENTIFIER_MAX_LEN {
			return self.violation(field, format!("exceeds {IDENTIFIER_MAX_LEN} characters"));
		}

		self
	}

	/// Requires the character count to fall within `min..=max`.
	pub fn length(self, field: &str, value: &str, min: usize, max: usize) -> Self {
		let len = value.chars().count();

		let reason = format!("must be {min}-{max} characters long");

		self.check(field, (min..=max).contains(&len), reason)
	}

	/// Requires an integer to fall within `min..=max`.
	pub fn range(self, field: &str, value: i64, min: i64, max: i64) -> Self {
		self.check(field, (min..=max).contains(&value), format!("must be between {min} and {max}"))
	}

	/// Records a violation unless `ok` holds.
	pub fn check(self, field: &str, ok: bool, reason: impl Into<String>) -> Self {
		if ok { self } else { self.violation(field, reason) }
	}

	/// Records a violation unconditionally.
	pub fn violation(mut self, field: &str, reason: impl Into<String>) -> Self {
		self.violations.push(FieldViolation { field: field.into(), reason: reason.into() });

		self
	}

	/// Fails with every collected violation, if any.
	pub fn finish(self) -> Result<(), ValidationError> {
		if self.violations.is_empty() {
			Ok(())
		} else {
			Err(ValidationError { operation: self.operation, violations: self.violations })
		}
	}
}
