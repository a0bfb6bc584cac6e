use crate::taxonomy::local_segment;

/// `1234567` → `1,234,567`; missing values render as an em dash.
pub fn number_with_separators(value: Option<i64>) -> String {
    let Some(value) = value else {
        return "—".to_string();
    };
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// Short form with one fractional digit: `950`, `1.2K`, `3.4M`, `2B`.
pub fn compact_number(value: i64) -> String {
    const UNITS: [(f64, &str); 3] = [(1e3, "K"), (1e6, "M"), (1e9, "B")];
    let abs = value.unsigned_abs() as f64;
    let Some(mut unit) = UNITS.iter().rposition(|(scale, _)| abs >= *scale) else {
        return value.to_string();
    };
    let round = |scale: f64| (value as f64 / scale * 10.0).round() / 10.0;
    // 999_950 rounds to 1000K; carry into the next unit
    while unit + 1 < UNITS.len() && round(UNITS[unit].0).abs() >= 1000.0 {
        unit += 1;
    }
    let (scale, suffix) = UNITS[unit];
    let text = format!("{:.1}", round(scale));
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{}{}", text, suffix)
}

/// `en:sunflower-oil` → `Sunflower Oil`.
pub fn format_taxonomy_id(value: &str) -> String {
    local_segment(value)
        .split(['-', '_'])
        .filter(|segment| !segment.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators() {
        assert_eq!(number_with_separators(Some(0)), "0");
        assert_eq!(number_with_separators(Some(999)), "999");
        assert_eq!(number_with_separators(Some(1000)), "1,000");
        assert_eq!(number_with_separators(Some(1234567)), "1,234,567");
        assert_eq!(number_with_separators(Some(-45000)), "-45,000");
        assert_eq!(number_with_separators(None), "—");
    }

    #[test]
    fn compact() {
        assert_eq!(compact_number(950), "950");
        assert_eq!(compact_number(1000), "1K");
        assert_eq!(compact_number(1250), "1.3K");
        assert_eq!(compact_number(74_000), "74K");
        assert_eq!(compact_number(3_400_000), "3.4M");
        assert_eq!(compact_number(2_000_000_000), "2B");
    }

    #[test]
    fn compact_carries_into_next_unit() {
        assert_eq!(compact_number(999_950), "1M");
        assert_eq!(compact_number(999_949), "999.9K");
        assert_eq!(compact_number(999_960_000), "1B");
        assert_eq!(compact_number(-999_950), "-1M");
    }

    #[test]
    fn taxonomy_ids() {
        assert_eq!(format_taxonomy_id("en:sunflower-oil"), "Sunflower Oil");
        assert_eq!(format_taxonomy_id("fr:huile_de_palme"), "Huile De Palme");
        assert_eq!(format_taxonomy_id("salt"), "Salt");
    }

    #[test]
    fn taxonomy_id_separator_runs_collapse() {
        assert_eq!(format_taxonomy_id("en:a--b"), "A B");
        assert_eq!(format_taxonomy_id("en:citric_-acid_"), "Citric Acid");
    }
}
