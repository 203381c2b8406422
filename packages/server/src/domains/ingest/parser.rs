//! Extraction output parser.
//!
//! Model extraction output is expected to be JSON (a single object or an
//! array of objects) but arrives malformed often enough that a
//! delimiter-based fallback is kept: each non-empty line is split on the
//! delimiter, first token primary field, optional second token the
//! numeric field.
//!
//! Producing zero usable items is an error, not an empty result - a page
//! that yields nothing must surface as a failed extraction so the caller
//! can move on to the next candidate page.

use thiserror::Error;

use crate::graph::{MenuItemRow, ReviewRow};

const DEFAULT_DELIMITER: char = ',';

const MENU_ALIASES: &[&str] = &["dish", "name", "item"];
const REVIEW_ALIASES: &[&str] = &["review", "name", "item"];

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("extraction produced no usable items")]
    NoItems,
}

/// Parse menu extraction output into canonical rows.
pub fn parse_menu(raw: &str) -> Result<Vec<MenuItemRow>, ParseError> {
    let items = parse_items(raw, MENU_ALIASES, "price", DEFAULT_DELIMITER);
    if items.is_empty() {
        return Err(ParseError::NoItems);
    }
    Ok(items
        .into_iter()
        .map(|(dish, price)| MenuItemRow {
            dish,
            price: price.and_then(as_number),
        })
        .collect())
}

/// Parse review extraction output into canonical rows.
pub fn parse_reviews(raw: &str) -> Result<Vec<ReviewRow>, ParseError> {
    let items = parse_items(raw, REVIEW_ALIASES, "score", DEFAULT_DELIMITER);
    if items.is_empty() {
        return Err(ParseError::NoItems);
    }
    Ok(items
        .into_iter()
        .map(|(text, score)| ReviewRow {
            text,
            score: score.and_then(as_number),
        })
        .collect())
}

/// Items as (primary, optional secondary) pairs, secondary kept verbatim.
fn parse_items(
    raw: &str,
    aliases: &[&str],
    secondary_key: &str,
    delimiter: char,
) -> Vec<(String, Option<serde_json::Value>)> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => {
            resolve_object(&map, aliases, secondary_key).into_iter().collect()
        }
        Ok(serde_json::Value::Array(rows)) => rows
            .iter()
            .filter_map(|row| {
                row.as_object()
                    .and_then(|map| resolve_object(map, aliases, secondary_key))
            })
            .collect(),
        // Valid JSON of any other shape carries no items.
        Ok(_) => Vec::new(),
        Err(_) => parse_delimited(raw, delimiter),
    }
}

fn resolve_object(
    map: &serde_json::Map<String, serde_json::Value>,
    aliases: &[&str],
    secondary_key: &str,
) -> Option<(String, Option<serde_json::Value>)> {
    let primary = aliases
        .iter()
        .find_map(|key| map.get(*key))
        .and_then(as_text)
        .filter(|text| !text.is_empty())?;

    Some((primary, map.get(secondary_key).cloned()))
}

fn parse_delimited(raw: &str, delimiter: char) -> Vec<(String, Option<serde_json::Value>)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.split(delimiter).map(str::trim);
            let primary = parts.next().filter(|p| !p.is_empty())?.to_string();
            let secondary = parts
                .next()
                .filter(|p| !p.is_empty())
                .map(|p| serde_json::Value::String(p.to_string()));
            Some((primary, secondary))
        })
        .collect()
}

/// Primary fields may arrive as strings or bare numbers; anything else is
/// not a usable item.
fn as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce the secondary field to a number; "unknown" and other
/// non-numeric values become absent without dropping the item.
fn as_number(value: serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
