use tracing::warn;

/// Trims and caps a free-text field. Over-long input is cut, not rejected.
pub fn clamp_text(field: &str, value: &str, max_chars: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() > max_chars {
        warn!(field, max_chars, "Truncating over-long text field");
        trimmed.chars().take(max_chars).collect()
    } else {
        trimmed.to_string()
    }
}

pub fn clamp_optional_text(field: &str, value: Option<&str>, max_chars: usize) -> Option<String> {
    value
        .map(|v| clamp_text(field, v, max_chars))
        .filter(|v| !v.is_empty())
}

/// Quantities are advisory: negative or non-finite values are dropped.
pub fn clamp_quantity(field: &str, value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Some(v),
        Some(v) => {
            warn!(field, value = v, "Discarding invalid quantity");
            None
        }
        None => None,
    }
}
