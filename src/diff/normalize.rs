//! Value normalization shared by field-change comparison (§4.1)

use crate::model::AttrValue;

/// Normalize a value the way the diff engine compares both sides:
/// - strings: trim ASCII whitespace; empty becomes null
/// - numeric-looking strings: coerce to integer if every character is an
///   ASCII digit (optionally signed), else try a float parse
/// - booleans, integers, floats pass through unchanged
/// - null stays null
pub fn normalize(value: &AttrValue) -> AttrValue {
    match value {
        AttrValue::Null => AttrValue::Null,
        AttrValue::Bool(b) => AttrValue::Bool(*b),
        AttrValue::Int(i) => AttrValue::Int(*i),
        AttrValue::Float(f) => AttrValue::Float(*f),
        AttrValue::Str(s) => {
            let trimmed = s.trim_matches(|c: char| c.is_ascii_whitespace());
            if trimmed.is_empty() {
                return AttrValue::Null;
            }
            if is_all_digits(trimmed) {
                if let Ok(i) = trimmed.parse::<i64>() {
                    return AttrValue::Int(i);
                }
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                // Only treat as numeric if the string actually looks numeric;
                // a bare parse::<f64> would also accept "inf"/"nan", which are
                // not attribute values we want silently reinterpreted.
                if looks_numeric(trimmed) {
                    return AttrValue::Float(f);
                }
            }
            AttrValue::Str(trimmed.to_string())
        }
    }
}

fn is_all_digits(s: &str) -> bool {
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn looks_numeric(s: &str) -> bool {
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' || c == '-')
        && s.chars().any(|c| c.is_ascii_digit())
}

/// Two normalized values are equal under the diff engine's rules: null is
/// only equal to null, never to a non-null value post-normalization.
pub fn normalized_eq(a: Option<&AttrValue>, b: Option<&AttrValue>) -> bool {
    let na = a.map(normalize).unwrap_or(AttrValue::Null);
    let nb = b.map(normalize).unwrap_or(AttrValue::Null);
    na == nb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace_to_empty_becomes_null() {
        assert_eq!(normalize(&AttrValue::Str("   ".into())), AttrValue::Null);
    }

    #[test]
    fn digit_strings_coerce_to_int() {
        assert_eq!(normalize(&AttrValue::Str(" 42 ".into())), AttrValue::Int(42));
        assert_eq!(normalize(&AttrValue::Str("-7".into())), AttrValue::Int(-7));
    }

    #[test]
    fn float_strings_coerce_to_float() {
        assert_eq!(normalize(&AttrValue::Str("3.14".into())), AttrValue::Float(3.14));
    }

    #[test]
    fn non_numeric_strings_stay_strings() {
        assert_eq!(
            normalize(&AttrValue::Str("server1".into())),
            AttrValue::Str("server1".into())
        );
    }

    #[test]
    fn cidr_like_strings_are_not_numeric() {
        assert_eq!(
            normalize(&AttrValue::Str("10.0.0.0/8".into())),
            AttrValue::Str("10.0.0.0/8".into())
        );
    }

    #[test]
    fn null_equals_null_only() {
        assert!(normalized_eq(None, None));
        assert!(!normalized_eq(None, Some(&AttrValue::Int(0))));
        assert!(!normalized_eq(Some(&AttrValue::Str("".into())), Some(&AttrValue::Int(0))));
    }

    #[test]
    fn inf_and_nan_are_not_reinterpreted_as_numeric() {
        assert_eq!(normalize(&AttrValue::Str("inf".into())), AttrValue::Str("inf".into()));
        assert_eq!(normalize(&AttrValue::Str("nan".into())), AttrValue::Str("nan".into()));
    }
}
