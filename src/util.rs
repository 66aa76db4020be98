use serde_json::{Number, Value};

const FLOAT_TO_INT_MAX: f64 = 9007199254740991_f64;

/// Converting float to int has undefined behaviour for huge floats: https://stackoverflow.com/a/41139453.
/// To avoid this, refuse to convert floats with magnitude greater than 2**53 - 1, after which 64-bit floats no longer
/// retain integer precision.
pub(crate) fn f64_to_i64_safe(f: f64) -> Option<i64> {
    if f.abs() <= FLOAT_TO_INT_MAX {
        Some(f as i64)
    } else {
        None
    }
}

/// Builds a JSON number from a float, preferring the integer representation when the float is
/// integral so that `42` round-trips as `42` rather than `42.0`.
pub(crate) fn json_number(f: f64) -> Option<Value> {
    match f64_to_i64_safe(f) {
        Some(i) if i as f64 == f => Some(Value::from(i)),
        _ => Number::from_f64(f).map(Value::Number),
    }
}

pub(crate) fn is_false(b: &bool) -> bool {
    !(*b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spectral::prelude::*;

    #[test]
    fn float_bounds() {
        let test_cases = vec![
            (1.99, Some(1)),
            (9007199254740991.0, Some(9007199254740991)),
            (9007199254740992.0, None),
            (-1.99, Some(-1)),
            (-9007199254740991.0, Some(-9007199254740991)),
            (-9007199254740992.0, None),
        ];
        for (have, expect) in test_cases {
            assert_that!(f64_to_i64_safe(have)).is_equal_to(expect);
        }
    }

    #[test]
    fn json_numbers_prefer_integers() {
        assert_that!(json_number(42.0)).is_equal_to(Some(json!(42)));
        assert_that!(json_number(-0.5)).is_equal_to(Some(json!(-0.5)));
        assert_that!(json_number(f64::NAN)).is_none();
    }
}
