//! Strict parsing of model output into an [`Action`].

use perceiver_structural::ReducedPage;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::action::{Action, ScrollDirection};

/// Reasons a model answer is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("response contained no JSON object")]
    NoJson,

    #[error("response JSON is malformed: {0}")]
    InvalidJson(String),

    #[error("response JSON must be an object with an \"action\" field")]
    MissingTag,

    #[error("unknown action \"{0}\"")]
    UnknownVariant(String),

    #[error("action \"{action}\" is missing field \"{field}\"")]
    MissingField { action: &'static str, field: &'static str },

    #[error("address \"{0}\" is not on the current page")]
    UnknownAddress(String),

    #[error("unsupported scroll direction \"{0}\"")]
    UnsupportedDirection(String),

    #[error("\"{0}\" is not a usable URL")]
    InvalidUrl(String),

    #[error("done requires visible page content or an explicit \"success\": true")]
    DoneOnEmptyPage,
}

/// Extract the first JSON object from free-form model text.
///
/// Accepts a bare object, a fenced code block, or the first balanced
/// `{ ... }` span inside prose (including an object followed by commentary).
pub fn extract_json_object(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let leading_object = trimmed.starts_with('{');
    if leading_object && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    // An unterminated leading object is still handed to the JSON parser so the
    // rejection names the syntax error.
    first_balanced_object(raw).or_else(|| leading_object.then(|| trim_symmetric(raw)))
}

fn first_balanced_object(raw: &str) -> Option<String> {
    let (_, rest) = raw.split_once('{')?;
    let mut depth = 1i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in rest.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let mut candidate = String::from("{");
                    candidate.push_str(&rest[..=idx]);
                    return Some(trim_symmetric(&candidate));
                }
            }
            _ => {}
        }
    }
    None
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

/// Parse raw model text into an action valid for `page`.
pub fn parse_action(raw: &str, page: &ReducedPage) -> Result<Action, ParseFailure> {
    let json = extract_json_object(raw).ok_or(ParseFailure::NoJson)?;
    let value: Value =
        serde_json::from_str(&json).map_err(|err| ParseFailure::InvalidJson(err.to_string()))?;
    let object = action_object(&value).ok_or(ParseFailure::MissingTag)?;
    let tag = tag_of(object).ok_or(ParseFailure::MissingTag)?;

    match normalize_tag(&tag).as_str() {
        "click" | "click_element" => Ok(Action::Click {
            address: resolve_address(object, page, "click")?,
        }),
        "type" | "type_text" | "input_text" | "fill" => Ok(Action::Type {
            address: resolve_address(object, page, "type")?,
            text: string_field(object, &["text", "value"]).ok_or(ParseFailure::MissingField {
                action: "type",
                field: "text",
            })?,
        }),
        "select" | "select_option" => Ok(Action::Select {
            address: resolve_address(object, page, "select")?,
            value: string_field(object, &["value", "option", "text"]).ok_or(
                ParseFailure::MissingField {
                    action: "select",
                    field: "value",
                },
            )?,
        }),
        "scroll" => {
            let raw = string_field(object, &["direction"]).ok_or(ParseFailure::MissingField {
                action: "scroll",
                field: "direction",
            })?;
            let direction =
                ScrollDirection::parse(&raw).ok_or(ParseFailure::UnsupportedDirection(raw))?;
            Ok(Action::Scroll { direction })
        }
        "scroll_down" => Ok(Action::Scroll {
            direction: ScrollDirection::Down,
        }),
        "scroll_up" => Ok(Action::Scroll {
            direction: ScrollDirection::Up,
        }),
        "navigate" | "go_to_url" | "goto" | "open_url" => {
            let raw = string_field(object, &["url", "href"]).ok_or(ParseFailure::MissingField {
                action: "navigate",
                field: "url",
            })?;
            Ok(Action::Navigate {
                url: resolve_url(&raw, page)?,
            })
        }
        "wait" => Ok(Action::Wait {
            seconds: wait_seconds(object),
        }),
        "done" | "finish" | "complete" => {
            let summary =
                string_field(object, &["summary", "text", "done_text", "result"]).unwrap_or_default();
            match bool_field(object, &["success", "done_success"]) {
                Some(false) => Ok(Action::Fail {
                    reason: if summary.is_empty() {
                        "model reported failure".to_string()
                    } else {
                        summary
                    },
                }),
                Some(true) => Ok(Action::Done { summary }),
                None if page.is_empty() => Err(ParseFailure::DoneOnEmptyPage),
                None => Ok(Action::Done { summary }),
            }
        }
        "fail" | "abort" | "give_up" => Ok(Action::Fail {
            reason: string_field(object, &["reason", "text", "summary"])
                .unwrap_or_else(|| "unspecified".to_string()),
        }),
        other => Err(ParseFailure::UnknownVariant(other.to_string())),
    }
}

/// The object describing the action, unwrapping common envelopes such as
/// `{"actions": [...]}` and `{"action": {...}}`.
fn action_object(value: &Value) -> Option<&Map<String, Value>> {
    let object = value.as_object()?;
    if let Some(first) = object
        .get("actions")
        .and_then(Value::as_array)
        .and_then(|actions| actions.first())
    {
        return action_object(first);
    }
    if let Some(inner) = object.get("action").filter(|v| v.is_object()) {
        return action_object(inner);
    }
    Some(object)
}

fn tag_of(object: &Map<String, Value>) -> Option<String> {
    ["action", "type", "name"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|tag| !tag.is_empty())
        .map(str::to_string)
}

/// Lowercase snake_case tag with any `Action` suffix removed, so
/// `ClickAction`, `click_action` and `click` are the same.
fn normalize_tag(raw: &str) -> String {
    let mut snake = String::with_capacity(raw.len() + 4);
    let mut prev: Option<char> = None;
    for ch in raw.trim().chars() {
        if ch.is_ascii_uppercase() {
            if prev.map(|p| p.is_ascii_lowercase() || p.is_ascii_digit()).unwrap_or(false) {
                snake.push('_');
            }
            snake.push(ch.to_ascii_lowercase());
        } else if ch == '-' || ch == ' ' {
            snake.push('_');
        } else {
            snake.push(ch);
        }
        prev = Some(ch);
    }
    let trimmed = snake.strip_suffix("_action").unwrap_or(&snake);
    trimmed.to_string()
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn bool_field(object: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_bool))
}

fn wait_seconds(object: &Map<String, Value>) -> f64 {
    if let Some(seconds) = ["seconds", "time_seconds"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_f64))
    {
        return seconds.clamp(0.0, 60.0);
    }
    if let Some(ms) = object.get("ms").and_then(Value::as_f64) {
        return (ms / 1000.0).clamp(0.0, 60.0);
    }
    1.0
}

/// Resolve the targeted element by address, address path, or the xpath of a
/// `selector` object.
fn resolve_address(
    object: &Map<String, Value>,
    page: &ReducedPage,
    action: &'static str,
) -> Result<String, ParseFailure> {
    let candidate = string_field(object, &["address", "element", "element_address", "target"])
        .or_else(|| string_field(object, &["element_index", "index"]));

    if let Some(raw) = candidate {
        let raw = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
        if page.contains(raw) {
            return Ok(raw.to_string());
        }
        let mut by_path = page
            .elements
            .iter()
            .filter(|el| el.address.split('-').next() == Some(raw));
        if let (Some(element), None) = (by_path.next(), by_path.next()) {
            return Ok(element.address.clone());
        }
        return Err(ParseFailure::UnknownAddress(raw.to_string()));
    }

    if let Some(xpath) = object
        .get("selector")
        .and_then(Value::as_object)
        .and_then(|selector| selector.get("value"))
        .and_then(Value::as_str)
    {
        return page
            .elements
            .iter()
            .find(|el| el.xpath == xpath)
            .map(|el| el.address.clone())
            .ok_or_else(|| ParseFailure::UnknownAddress(xpath.to_string()));
    }

    Err(ParseFailure::MissingField {
        action,
        field: "address",
    })
}

fn resolve_url(raw: &str, page: &ReducedPage) -> Result<String, ParseFailure> {
    let raw = raw.trim();
    if let Ok(url) = Url::parse(raw) {
        return Ok(url.to_string());
    }
    page.url
        .as_deref()
        .and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(raw).ok())
        .map(|url| url.to_string())
        .ok_or_else(|| ParseFailure::InvalidUrl(raw.to_string()))
}
