use std::collections::BTreeMap;

/// Style variable name (e.g. `--page-margin`) → CSS value (e.g. `12mm`).
///
/// Ordered so that every pass applies variables in the same sequence.
pub type StyleSnapshot = BTreeMap<String, String>;

/// Merges a batch of style updates into `base`; later values win.
pub fn merge_styles(base: &mut StyleSnapshot, batch: &StyleSnapshot) {
    for (name, value) in batch {
        base.insert(name.clone(), value.clone());
    }
}

/// Splits a CSS length such as `12.5mm` or `1.4` into its number and unit.
///
/// Returns `None` when the value does not start with a finite number.
pub fn parse_length(value: &str) -> Option<(f64, &str)> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.parse().ok()?;
    number.is_finite().then_some((number, unit.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_styles_later_wins() {
        let mut base = StyleSnapshot::new();
        base.insert("--page-margin".to_string(), "12mm".to_string());
        base.insert("--line-height".to_string(), "1.5".to_string());

        let mut batch = StyleSnapshot::new();
        batch.insert("--page-margin".to_string(), "9mm".to_string());

        merge_styles(&mut base, &batch);
        assert_eq!(base["--page-margin"], "9mm");
        assert_eq!(base["--line-height"], "1.5");
    }

    #[test]
    fn test_parse_length_with_unit() {
        assert_eq!(parse_length("12.5mm"), Some((12.5, "mm")));
        assert_eq!(parse_length(" 11pt "), Some((11.0, "pt")));
    }

    #[test]
    fn test_parse_length_unitless() {
        assert_eq!(parse_length("1.45"), Some((1.45, "")));
    }

    #[test]
    fn test_parse_length_rejects_garbage() {
        assert_eq!(parse_length("auto"), None);
        assert_eq!(parse_length(""), None);
    }
}
