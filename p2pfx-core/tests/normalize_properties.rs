//! Property tests for the field normalizer.
//!
//! 1. Thousands-separated decimal strings parse back to the exact value
//! 2. Every wrapper shape yields the same value as the bare string
//! 3. Whatever the input, the result is finite or missing

use p2pfx_core::data::normalize::{parse_amount, parse_number_str, NumberLocale};
use proptest::prelude::*;
use serde_json::json;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_cents() -> impl Strategy<Value = u64> {
    0u64..10_000_000_000
}

fn group_thousands(whole: u64, sep: char) -> String {
    let digits = whole.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(ch);
    }
    out
}

fn decimal_point(cents: u64) -> String {
    format!("{}.{:02}", group_thousands(cents / 100, ','), cents % 100)
}

fn decimal_comma(cents: u64) -> String {
    format!("{},{:02}", group_thousands(cents / 100, '.'), cents % 100)
}

proptest! {
    #[test]
    fn grouped_decimal_point_round_trips(cents in arb_cents()) {
        let text = decimal_point(cents);
        prop_assert_eq!(
            parse_number_str(&text, NumberLocale::DecimalPoint),
            Some(cents as f64 / 100.0),
            "input {}", text
        );
    }

    #[test]
    fn grouped_decimal_comma_round_trips(cents in arb_cents()) {
        let text = decimal_comma(cents);
        prop_assert_eq!(
            parse_number_str(&text, NumberLocale::DecimalComma),
            Some(cents as f64 / 100.0),
            "input {}", text
        );
    }

    #[test]
    fn wrappers_match_bare_string(cents in arb_cents()) {
        let text = decimal_point(cents);
        let bare = parse_amount(&json!(text), NumberLocale::DecimalPoint);
        prop_assert_eq!(parse_amount(&json!({ "amount": text }), NumberLocale::DecimalPoint), bare);
        prop_assert_eq!(parse_amount(&json!([text]), NumberLocale::DecimalPoint), bare);
        prop_assert_eq!(parse_amount(&json!([{ "amount": text }]), NumberLocale::DecimalPoint), bare);
    }

    #[test]
    fn result_is_finite_or_missing(text in ".{0,24}") {
        for locale in [NumberLocale::DecimalPoint, NumberLocale::DecimalComma] {
            if let Some(v) = parse_number_str(&text, locale) {
                prop_assert!(v.is_finite());
            }
        }
    }
}

#[test]
fn reference_inputs() {
    let p = NumberLocale::DecimalPoint;
    for value in [json!("1,200.00"), json!(1200.0), json!({"amount": "1200"}), json!(["1200"])] {
        assert_eq!(parse_amount(&value, p), Some(1200.0), "{value}");
    }
    for value in [json!(""), json!("None"), serde_json::Value::Null] {
        assert_eq!(parse_amount(&value, p), None, "{value}");
    }
}
