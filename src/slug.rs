use std::collections::HashMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::SlugError;

/// Lowercase, hyphen-separated, ASCII-only form of `text`.
pub fn slugify(text: &str) -> String {
    let stripped: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered = stripped.to_lowercase().replace('&', "and");

    let mut slug = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;
    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Compact code fragment: alphanumerics only, lowercase, leading `e`.
pub fn normalize_code(code: &str) -> String {
    let compact: String = code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if compact.is_empty() || compact.starts_with('e') {
        compact
    } else {
        format!("e{}", compact)
    }
}

/// Combined `{code}-{title}` slug, falling back to whichever segment exists.
pub fn derive_slug(code: Option<&str>, title: Option<&str>) -> Result<String, SlugError> {
    let code_segment = code.map(normalize_code).unwrap_or_default();
    let title_segment = title.map(slugify).unwrap_or_default();

    match (code_segment.is_empty(), title_segment.is_empty()) {
        (false, false) => Ok(format!("{}-{}", code_segment, title_segment)),
        (false, true) => Ok(code_segment),
        (true, false) => Ok(title_segment),
        (true, true) => Err(SlugError::InvalidInput),
    }
}

/// Hands out unique slugs across one batch. Output depends on call order,
/// so callers feed it in a stable (sorted) order.
#[derive(Debug, Default)]
pub struct SlugAllocator {
    usage: HashMap<String, usize>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "item" } else { base };
        match self.usage.get_mut(base) {
            None => {
                self.usage.insert(base.to_string(), 1);
                base.to_string()
            }
            Some(count) => {
                *count += 1;
                let candidate = format!("{}-{}", base, count);
                // "sugar-2" may already be taken by a literal "Sugar 2"
                self.assign(&candidate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Citric Acid"), "citric-acid");
        assert_eq!(slugify("  Salt & Pepper!! "), "salt-and-pepper");
        assert_eq!(slugify("--already-slugged--"), "already-slugged");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn slugify_strips_diacritics() {
        assert_eq!(slugify("Crème brûlée"), "creme-brulee");
        assert_eq!(slugify("Jalapeño"), "jalapeno");
    }

    #[test]
    fn normalize_code_adds_marker() {
        assert_eq!(normalize_code("E330"), "e330");
        assert_eq!(normalize_code("150a"), "e150a");
        assert_eq!(normalize_code("E 160 (i)"), "e160i");
        assert_eq!(normalize_code(" - "), "");
    }

    #[test]
    fn derive_slug_joins_segments() {
        assert_eq!(derive_slug(Some("E330"), Some("Citric Acid")).unwrap(), "e330-citric-acid");
        assert_eq!(derive_slug(Some("E330"), None).unwrap(), "e330");
        assert_eq!(derive_slug(None, Some("Citric Acid")).unwrap(), "citric-acid");
        assert_eq!(derive_slug(Some(""), Some("???")), Err(SlugError::InvalidInput));
        assert_eq!(derive_slug(None, None), Err(SlugError::InvalidInput));
    }

    #[test]
    fn derive_slug_is_pure() {
        let first = derive_slug(Some("e471"), Some("Mono- and diglycerides")).unwrap();
        for _ in 0..5 {
            assert_eq!(derive_slug(Some("e471"), Some("Mono- and diglycerides")).unwrap(), first);
        }
    }

    #[test]
    fn allocator_suffixes_in_first_seen_order() {
        let mut alloc = SlugAllocator::new();
        let out: Vec<String> = ["Sugar", "Sugar", "Sugar"]
            .iter()
            .map(|t| alloc.assign(&slugify(t)))
            .collect();
        assert_eq!(out, vec!["sugar", "sugar-2", "sugar-3"]);
    }

    #[test]
    fn allocator_recurses_past_literal_collisions() {
        let mut alloc = SlugAllocator::new();
        let inputs = ["Sugar 2", "Sugar", "Sugar", "Sugar"];
        let out: Vec<String> = inputs.iter().map(|t| alloc.assign(&slugify(t))).collect();
        let distinct: HashSet<&String> = out.iter().collect();
        assert_eq!(distinct.len(), inputs.len());
        assert_eq!(out[0], "sugar-2");
        assert_eq!(out[1], "sugar");
        assert_eq!(out[2], "sugar-2-2");
        assert_eq!(out[3], "sugar-3");
    }

    #[test]
    fn allocator_empty_base_becomes_item() {
        let mut alloc = SlugAllocator::new();
        assert_eq!(alloc.assign(""), "item");
        assert_eq!(alloc.assign(""), "item-2");
    }
}
