//! Redaction of PII and payment secrets in audit payloads.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

/// Replacement written in place of a sensitive value.
pub const MASK_SENTINEL: &str = "[REDACTED]";

/// Dotted paths that are always redacted. Matched against the end of the
/// value's path, so `order.customer.phone` is covered by `customer.phone`.
/// Array positions are not part of a path.
const MASKED_PATHS: &[&str] = &[
    "customer.fullName",
    "customer.name",
    "customer.phone",
    "customer.email",
    "customer.address",
    "customer.taxId",
    "shippingAddress.fullName",
    "shippingAddress.phone",
    "shippingAddress.line1",
    "shippingAddress.line2",
    "shippingAddress.detail",
    "billingAddress.fullName",
    "billingAddress.phone",
    "billingAddress.line1",
    "billingAddress.line2",
    "billingAddress.detail",
    "billingAddress.taxId",
    "recipient.fullName",
    "recipient.phone",
    "invoice.taxId",
];

/// Containers whose secret-looking keys are redacted at any depth below them.
const PAYMENT_CONTAINERS: &[&str] = &["payment", "paymentInfo", "paymentDetails"];

lazy_static! {
    static ref PAYMENT_SECRET_KEY: Regex =
        Regex::new(r"(?i)(token|secret|card|cvv|cvc|iban|^pan$)").expect("valid payment key pattern");
}

/// Return a redacted copy of `value`. The input is never modified.
pub fn mask_sensitive_data(value: &Value) -> Value {
    let mut path = Vec::new();
    mask_value(value, &mut path, false)
}

fn mask_value<'a>(value: &'a Value, path: &mut Vec<&'a str>, in_payment: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut masked = Map::with_capacity(map.len());
            for (key, child) in map {
                path.push(key.as_str());
                let sensitive = is_masked_path(path)
                    || (in_payment && PAYMENT_SECRET_KEY.is_match(key));
                let out = if sensitive && !child.is_null() {
                    Value::String(MASK_SENTINEL.to_string())
                } else {
                    let entering_payment =
                        in_payment || PAYMENT_CONTAINERS.contains(&key.as_str());
                    mask_value(child, path, entering_payment)
                };
                path.pop();
                masked.insert(key.clone(), out);
            }
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| mask_value(item, path, in_payment))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_masked_path(path: &[&str]) -> bool {
    MASKED_PATHS.iter().any(|masked| {
        let segments: Vec<&str> = masked.split('.').collect();
        path.len() >= segments.len() && path[path.len() - segments.len()..] == segments[..]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_masks_customer_pii() {
        let input = json!({
            "status": "PAID",
            "customer": {
                "id": "c-1",
                "fullName": "Jane Doe",
                "phone": "555-0100",
                "email": "jane@example.com",
                "address": {"street": "1 Main St", "city": "Springfield"},
                "taxId": "123-45-6789"
            }
        });
        let masked = mask_sensitive_data(&input);
        assert_eq!(
            masked,
            json!({
                "status": "PAID",
                "customer": {
                    "id": "c-1",
                    "fullName": MASK_SENTINEL,
                    "phone": MASK_SENTINEL,
                    "email": MASK_SENTINEL,
                    "address": MASK_SENTINEL,
                    "taxId": MASK_SENTINEL
                }
            })
        );
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = json!({"customer": {"phone": "555-0100"}});
        let before = input.clone();
        let _ = mask_sensitive_data(&input);
        assert_eq!(input, before);
    }

    #[test]
    fn test_masks_payment_secrets_at_any_depth() {
        let input = json!({
            "paymentInfo": {
                "method": "CARD",
                "cardNumber": "4111111111111111",
                "cvv": "123",
                "gateway": {"accessToken": "tok_live_abc", "clientSecret": "sec_123", "region": "eu"},
                "pan": "4111"
            }
        });
        let masked = mask_sensitive_data(&input);
        assert_eq!(masked["paymentInfo"]["method"], "CARD");
        assert_eq!(masked["paymentInfo"]["cardNumber"], MASK_SENTINEL);
        assert_eq!(masked["paymentInfo"]["cvv"], MASK_SENTINEL);
        assert_eq!(masked["paymentInfo"]["gateway"]["accessToken"], MASK_SENTINEL);
        assert_eq!(masked["paymentInfo"]["gateway"]["clientSecret"], MASK_SENTINEL);
        assert_eq!(masked["paymentInfo"]["gateway"]["region"], "eu");
        assert_eq!(masked["paymentInfo"]["pan"], MASK_SENTINEL);
    }

    #[test]
    fn test_secret_looking_keys_outside_payment_pass_through() {
        let input = json!({"loyaltyCard": "gold", "company": "ACME"});
        assert_eq!(mask_sensitive_data(&input), input);
    }

    #[test]
    fn test_masks_through_arrays_and_nesting() {
        let input = json!({
            "orders": [
                {"id": 1, "customer": {"phone": "555-0001"}},
                {"id": 2, "customer": {"phone": "555-0002"}, "payment": {"token": "tok_1"}}
            ]
        });
        let masked = mask_sensitive_data(&input);
        let text = masked.to_string();
        assert!(!text.contains("555-0001"));
        assert!(!text.contains("555-0002"));
        assert!(!text.contains("tok_1"));
        assert_eq!(masked["orders"][1]["id"], 2);
    }

    #[test]
    fn test_null_values_stay_null() {
        let input = json!({"customer": {"email": null}});
        assert_eq!(mask_sensitive_data(&input), input);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(mask_sensitive_data(&json!("plain")), json!("plain"));
        assert_eq!(mask_sensitive_data(&Value::Null), Value::Null);
    }
}
