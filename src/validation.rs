use std::collections::HashMap;

use validator::Validate;

use crate::error::FieldErrors;

/// Flattens `validator` derive output into the field-keyed map the rest of
/// the validation pipeline uses.
pub fn collect_errors<T: Validate>(payload: &T) -> FieldErrors {
    let mut error_map = HashMap::new();

    if let Err(errors) = payload.validate() {
        for (field, field_errors) in errors.field_errors() {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), messages);
        }
    }

    error_map
}

#[cfg(test)]
mod tests {
    use super::collect_errors;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Deserialize, Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "Name is required."))]
        name: String,
        #[validate(email(message = "Enter a valid email address."))]
        email: String,
    }

    #[test]
    fn derive_failures_become_field_keyed_messages() {
        let probe = Probe {
            name: String::new(),
            email: "nope".to_string(),
        };

        let errors = collect_errors(&probe);
        assert_eq!(errors["name"], vec!["Name is required."]);
        assert_eq!(errors["email"], vec!["Enter a valid email address."]);
    }

    #[test]
    fn valid_payloads_produce_an_empty_map() {
        let probe = Probe {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        };

        assert!(collect_errors(&probe).is_empty());
    }
}
