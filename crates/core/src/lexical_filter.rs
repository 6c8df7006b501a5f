//! Lexical index filter-string building (C7 §4.6), with the escaping and
//! integer-validation rules that defend against filter injection (spec §8
//! scenario 3, §4.6: "All string filter values MUST be escaped ... non-
//! integer in `scan_ids` is rejected").

/// Escape a string value for embedding inside a `field = "value"` clause:
/// backslashes first, then double quotes.
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn string_eq_clause(field: &str, value: &str) -> String {
    format!("{field} = \"{}\"", escape_filter_value(value))
}

pub fn starts_with_clause(field: &str, prefix: &str) -> String {
    format!("{field} STARTS WITH \"{}\"", escape_filter_value(prefix))
}

/// OR-combine a list of string filter values for one field, then AND the
/// groups together as the caller assembles multiple filters.
pub fn or_group(field: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let clauses: Vec<String> = values.iter().map(|v| string_eq_clause(field, v)).collect();
    Some(format!("({})", clauses.join(" OR ")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidScanId(pub String);

/// Validate that every `scan_ids` filter value parses as an integer, per
/// spec's filter-injection defense. Returns the parsed ids or the first
/// invalid token.
pub fn validate_scan_ids(raw: &[String]) -> Result<Vec<i64>, InvalidScanId> {
    raw.iter().map(|s| s.parse::<i64>().map_err(|_| InvalidScanId(s.clone()))).collect()
}

pub fn int_in_group(field: &str, values: &[i64]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let clauses: Vec<String> = values.iter().map(|v| format!("{field} = {v}")).collect();
    Some(format!("({})", clauses.join(" OR ")))
}

/// AND-combine any number of already-built clauses, skipping empty ones.
pub fn and_all(clauses: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    let parts: Vec<String> = clauses.into_iter().flatten().collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes() {
        let escaped = escape_filter_value(r#"pdf" OR scan_id = 999"#);
        assert_eq!(escaped, r#"pdf\" OR scan_id = 999"#);
    }

    #[test]
    fn filter_injection_attempt_stays_a_literal_value() {
        let clause = string_eq_clause("file_type", r#"pdf" OR scan_id = 999"#);
        assert_eq!(clause, r#"file_type = "pdf\" OR scan_id = 999""#);
        // The payload is now fully inside one quoted literal; no bare ` OR `
        // appears outside the quotes for the query engine to parse as logic.
        let outside_quotes = clause.splitn(3, '"').nth(0).unwrap();
        assert!(!outside_quotes.contains("OR"));
    }

    #[test]
    fn escaping_is_idempotent_on_reparse() {
        // round-trip property: unescaping the escaped value returns the original
        let original = r#"back\slash and "quote""#;
        let escaped = escape_filter_value(original);
        let unescaped = escaped.replace("\\\"", "\"").replace("\\\\", "\\");
        assert_eq!(unescaped, original);
    }

    #[test]
    fn rejects_non_integer_scan_ids() {
        let result = validate_scan_ids(&["1".to_string(), "2\" OR 1=1".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_valid_integer_scan_ids() {
        let result = validate_scan_ids(&["1".to_string(), "42".to_string()]).unwrap();
        assert_eq!(result, vec![1, 42]);
    }

    #[test]
    fn project_path_becomes_starts_with_clause() {
        let clause = starts_with_clause("file_path", "/evidence/case1");
        assert_eq!(clause, r#"file_path STARTS WITH "/evidence/case1""#);
    }
}
