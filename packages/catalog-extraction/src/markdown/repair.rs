//! JSON repair and the pipe-delimited catalog-line parser (§4.3, P9).
//!
//! The repair pass is a direct port of the original system's eight-step
//! algorithm, since the distilled spec's prose ("removes trailing commas,
//! closes unbalanced braces/brackets counted during parsing, normalizes
//! whitespace") under-specifies ordering and this is exactly the kind of
//! edge-case behavior §0 says to resolve from the source.

use regex::Regex;
use std::sync::OnceLock;

fn trailing_comma_before_brace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\}").unwrap())
}

fn trailing_comma_before_bracket() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\]").unwrap())
}

fn adjacent_objects() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\}\s*\{").unwrap())
}

fn adjacent_arrays() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\]\s*\[").unwrap())
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Attempt to parse `body` as JSON directly; on failure, run the repair
/// pass once and retry. Returns `None` if both attempts fail (declared a
/// failed extraction per §4.3, never surfaced as an empty value).
pub fn parse_json_with_repair(body: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }
    let repaired = repair_json(body);
    serde_json::from_str(&repaired).ok()
}

/// The eight-step repair algorithm, applied in order.
pub fn repair_json(input: &str) -> String {
    let mut s = input.to_string();

    // 1. strip trailing commas before `}`
    s = trailing_comma_before_brace().replace_all(&s, "}").to_string();
    // 2. strip trailing commas before `]`
    s = trailing_comma_before_bracket().replace_all(&s, "]").to_string();
    // 3. insert missing comma between adjacent objects
    s = adjacent_objects().replace_all(&s, "},{").to_string();
    // 4. insert missing comma between adjacent arrays
    s = adjacent_arrays().replace_all(&s, "],[").to_string();
    // 5. normalize whitespace
    s = whitespace_run().replace_all(&s, " ").trim().to_string();
    // 6. count and close unmatched braces/brackets
    s = close_unmatched(&s);
    // 7. collapse doubled escaping of quotes
    s = s.replace(r#"\\\""#, r#"\""#);
    // 8. truncate anything trailing the last `}` or `]`
    s = truncate_trailing_garbage(&s);

    s
}

fn close_unmatched(s: &str) -> String {
    let mut depth_brace = 0i32;
    let mut depth_bracket = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut order = Vec::new();

    for ch in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                depth_brace += 1;
                order.push('{');
            }
            '}' if !in_string => {
                depth_brace -= 1;
                order.pop();
            }
            '[' if !in_string => {
                depth_bracket += 1;
                order.push('[');
            }
            ']' if !in_string => {
                depth_bracket -= 1;
                order.pop();
            }
            _ => {}
        }
    }

    let mut out = s.to_string();
    for opener in order.into_iter().rev() {
        out.push(if opener == '{' { '}' } else { ']' });
    }
    let _ = (depth_brace, depth_bracket);
    out
}

fn truncate_trailing_garbage(s: &str) -> String {
    let last_brace = s.rfind('}');
    let last_bracket = s.rfind(']');
    match (last_brace, last_bracket) {
        (Some(b), Some(k)) => s[..=b.max(k)].to_string(),
        (Some(b), None) => s[..=b].to_string(),
        (None, Some(k)) => s[..=k].to_string(),
        (None, None) => s.to_string(),
    }
}

/// One catalog-page product line: a fixed sentinel token followed by
/// `KEY=value` segments separated by pipes (§4.3). Tolerates missing
/// segments; requires url and title for the product to be kept.
pub const CATALOG_LINE_SENTINEL: &str = "PRODUCT::";

#[derive(Debug, Clone, Default)]
pub struct CatalogLine {
    pub url: Option<String>,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub on_sale: Option<bool>,
}

impl CatalogLine {
    pub fn is_keepable(&self) -> bool {
        self.url.is_some() && self.title.is_some()
    }
}

/// Coerce a price string by stripping currency markers and grouping
/// separators ("$1,299.00" -> 1299.0).
pub fn coerce_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

pub fn parse_catalog_line(line: &str) -> Option<CatalogLine> {
    let rest = line.strip_prefix(CATALOG_LINE_SENTINEL)?;
    let mut parsed = CatalogLine::default();
    for segment in rest.split('|') {
        let segment = segment.trim();
        let Some((key, value)) = segment.split_once('=') else { continue };
        let value = value.trim();
        match key.trim().to_uppercase().as_str() {
            "URL" => parsed.url = Some(value.to_string()),
            "TITLE" => parsed.title = Some(value.to_string()),
            "PRICE" => parsed.price = coerce_price(value),
            "IMAGE" => parsed.image_url = Some(value.to_string()),
            "SALE" => parsed.on_sale = Some(value.eq_ignore_ascii_case("true")),
            _ => {}
        }
    }
    Some(parsed)
}

/// Parse every catalog line in a markdown/LLM response body, dropping
/// lines missing url or title.
pub fn parse_catalog_lines(body: &str) -> Vec<CatalogLine> {
    body.lines()
        .filter_map(parse_catalog_line)
        .filter(CatalogLine::is_keepable)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_two_missing_closing_brackets() {
        let input = r#"{"title":"A","price":"$10","image_urls":["u1","u2""#;
        let value = parse_json_with_repair(input).expect("should repair and parse");
        assert_eq!(value["title"], "A");
        assert_eq!(value["image_urls"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn tolerates_interleaved_whitespace_and_two_trailing_commas() {
        let input = "{\n  \"title\": \"B\",\n  \"price\": \"$5.00\",\n  \"image_urls\": [\"u1\",]  \n}";
        let value = parse_json_with_repair(input).expect("should parse");
        assert_eq!(value["title"], "B");
    }

    #[test]
    fn catalog_line_requires_url_and_title() {
        let line = "PRODUCT::URL=https://x/y|PRICE=$10.00";
        let parsed = parse_catalog_line(line).unwrap();
        assert!(!parsed.is_keepable());

        let line2 = "PRODUCT::URL=https://x/y|TITLE=Dress|PRICE=$49.99|IMAGE=https://cdn/a.jpg";
        let parsed2 = parse_catalog_line(line2).unwrap();
        assert!(parsed2.is_keepable());
        assert_eq!(parsed2.price, Some(49.99));
    }

    #[test]
    fn coerces_currency_and_grouping_separators() {
        assert_eq!(coerce_price("$1,299.00"), Some(1299.00));
        assert_eq!(coerce_price("£49.99"), Some(49.99));
    }
}
