//! Validation utilities
//!
//! Small checks returning `Result<(), String>` so callers can wrap the
//! message in their own error variant.

/// Ensure a condition is true with a lazily formatted error message
///
/// # Example
/// ```rust
/// use bllvm_module_state::utils::ensure_fmt;
///
/// let name = "org.example.core";
/// assert!(ensure_fmt(!name.is_empty(), || "name is empty".to_string()).is_ok());
/// ```
pub fn ensure_fmt<F>(condition: bool, message: F) -> Result<(), String>
where
    F: FnOnce() -> String,
{
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

/// Validate a slice is not empty
pub fn ensure_not_empty<T>(value: &[T], name: &str) -> Result<(), String> {
    if value.is_empty() {
        Err(format!("{} must not be empty", name))
    } else {
        Ok(())
    }
}
