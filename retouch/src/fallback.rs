//! Deterministic keyword parser, used whenever no language model is available or its answer is unusable.
//!
//! Keywords are checked in a fixed order and the first one that yields a complete action wins:
//! rotate, blur, brightness, contrast, crop, generate.
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::action::Action;

lazy_static! {
    static ref INTEGER: Regex = Regex::new(r"[-+]?\d+").expect("valid integer pattern");
    static ref NUMBER: Regex = Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("valid number pattern");
    static ref CROP_SIDES: Vec<(&'static str, Regex)> = ["left", "top", "right", "bottom"]
        .into_iter()
        .map(|side| {
            let pattern = format!(
                r"\b{side}\b[\s:=]*(?:(?:by|of|at|to)\s+)?([-+]?\d+(?:\.\d+)?)"
            );
            (side, Regex::new(&pattern).expect("valid crop pattern"))
        })
        .collect();
    static ref GENERATE: Regex =
        Regex::new(r"(?i)\b(?:generate|create|make)\b").expect("valid generate pattern");
}

/// Parse a command with keyword matching only, and validate the result.
pub fn simple_parse(text: &str) -> Action {
    Action::from_proposal(&propose(text))
}

/// Produce the raw proposal for `text`, before validation.
///
/// Always returns an object with an `action` field; `{"action": "unknown"}` if nothing matched.
pub fn propose(text: &str) -> Value {
    let lowered = text.to_lowercase();

    if lowered.contains("rotate") {
        if let Some(angle) = first_integer(&lowered) {
            return json!({"action": "rotate", "angle": angle});
        }
    }
    if lowered.contains("blur") {
        if let Some(radius) = first_integer(&lowered) {
            return json!({"action": "blur", "radius": radius});
        }
    }
    for kind in ["brightness", "contrast"] {
        if lowered.contains(kind) {
            if let Some(percent) = first_number(&lowered) {
                return json!({"action": kind, "level": percent / 100.0});
            }
        }
    }
    if lowered.contains("crop") {
        if let Some(sides) = crop_sides(&lowered) {
            return sides;
        }
    }
    if let Some(found) = GENERATE.find(text) {
        let prompt = text[found.end()..].trim();
        if !prompt.is_empty() {
            return json!({"action": "generate", "prompt": prompt});
        }
    }
    json!({"action": "unknown"})
}

/// The first run of digits, kept exact when it fits in an `i64`.
fn first_integer(text: &str) -> Option<Value> {
    let digits = INTEGER.find(text)?.as_str();
    match digits.parse::<i64>() {
        Ok(n) => Some(n.into()),
        Err(_) => digits.parse::<f64>().ok().map(Value::from),
    }
}

fn first_number(text: &str) -> Option<f64> {
    NUMBER.find(text)?.as_str().parse().ok()
}

/// All four sides, each followed by its number, or nothing.
fn crop_sides(text: &str) -> Option<Value> {
    let mut proposal = json!({"action": "crop"});
    for (side, pattern) in CROP_SIDES.iter() {
        let value: f64 = pattern.captures(text)?.get(1)?.as_str().parse().ok()?;
        proposal[*side] = json!(value);
    }
    Some(proposal)
}
