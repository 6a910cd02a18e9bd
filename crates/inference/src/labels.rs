use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `index: 'name'` or `index: "name"`.
static CLASS_ENTRY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(-?\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).ok());

/// Parses a class-name table such as `{0: 'carpetweed', 1: 'morningglory'}`.
///
/// This is the shape ultralytics writes into the `names` metadata of exported
/// models. Entries that do not match are skipped.
pub fn parse_class_names(raw: &str) -> HashMap<i64, String> {
    let Some(re) = CLASS_ENTRY.as_ref() else {
        return HashMap::new();
    };

    re.captures_iter(raw)
        .filter_map(|caps| {
            let id = caps.get(1)?.as_str().parse().ok()?;
            let name = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((id, name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_python_dict_literal() {
        let names = parse_class_names("{0: 'carpetweed', 1: 'morningglory', 2: 'palmer_amaranth'}");
        assert_eq!(names.len(), 3);
        assert_eq!(names[&0], "carpetweed");
        assert_eq!(names[&2], "palmer_amaranth");
    }

    #[test]
    fn test_parses_json_style_quotes() {
        let names = parse_class_names(r#"{"0": "waterhemp", 5: "purslane"}"#);
        assert_eq!(names.get(&5).map(String::as_str), Some("purslane"));
        // Quoted keys are not class indices
        assert!(!names.contains_key(&0));
    }

    #[test]
    fn test_class_entry_pattern_compiles() {
        assert!(CLASS_ENTRY.is_some());
        assert_eq!(parse_class_names("{3: 'a'}"), parse_class_names("{3: 'a'}"));
    }

    #[test]
    fn test_garbage_yields_empty_table() {
        assert!(parse_class_names("not a table").is_empty());
        assert!(parse_class_names("").is_empty());
    }
}
