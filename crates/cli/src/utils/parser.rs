use comliner_core::Conversion;
use comliner_core::mapping::parse_override_value;
use serde_json::Value;

/// Parse a `KEY=VALUE` option. The value is read as JSON when it parses,
/// otherwise it is kept as a string.
pub fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), parse_override_value(value)))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Parse a `NAME=CONVERSION` pair such as `values=list_of(float)`
pub fn parse_conversion(raw: &str) -> Result<(String, Conversion), String> {
    match raw.split_once('=') {
        Some((key, expr)) if !key.trim().is_empty() => expr
            .parse::<Conversion>()
            .map(|conversion| (key.trim().to_string(), conversion))
            .map_err(|e| e.to_string()),
        _ => Err(format!("expected NAME=CONVERSION, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_are_typed_when_possible() {
        assert_eq!(parse_key_value("factor=3").unwrap(), ("factor".into(), json!(3)));
        assert_eq!(parse_key_value("flag=true").unwrap(), ("flag".into(), json!(true)));
        assert_eq!(parse_key_value("name=abc").unwrap(), ("name".into(), json!("abc")));
        assert_eq!(parse_key_value("list=[1,2]").unwrap(), ("list".into(), json!([1, 2])));
        assert_eq!(parse_key_value("eq=a=b").unwrap(), ("eq".into(), json!("a=b")));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        assert!(parse_key_value("noequals").is_err());
        assert!(parse_key_value("=3").is_err());
    }

    #[test]
    fn test_conversion_pairs() {
        let (name, conversion) = parse_conversion("values=items_of(v) | list_of(int)").unwrap();
        assert_eq!(name, "values");
        assert_eq!(conversion.to_string(), "items_of(v) | list_of(int)");
        assert!(parse_conversion("values").is_err());
        assert!(parse_conversion("values=matrix").is_err());
    }
}
