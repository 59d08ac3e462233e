//! Utility functions for request building and response flattening

use std::collections::HashMap;

use carina_core::resource::Value;
use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value as Json;

// =============================================================================
// Path search
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Index(i64),
    /// `[*]`
    Wildcard,
    /// `[]`
    Flatten,
    /// `[?lhs==literal]` or `[?lhs!=literal]`
    Filter {
        lhs: Vec<Token>,
        literal: Json,
        negate: bool,
    },
}

/// Evaluate a JMESPath-style expression against a JSON document.
///
/// Supported: dotted fields, quoted keys (`"a-b"`), `[n]` indexes (negative
/// counts from the end), `[*]` and `[]` projections, `[?key=='v']` filters
/// and `|` pipes. Missing paths, type mismatches and unparsable expressions
/// yield `None`.
pub fn path_search(expr: &str, json: &Json) -> Option<Json> {
    let mut current = json.clone();
    for stage in split_pipes(expr) {
        let stage = stage.trim();
        if stage.is_empty() {
            continue;
        }
        let tokens = match parse_tokens(stage) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("invalid path expression '{}': {}", expr, e);
                return None;
            }
        };
        current = eval(&tokens, &current)?;
    }
    if current.is_null() { None } else { Some(current) }
}

/// String at `expr`, or `None`
pub fn path_str(expr: &str, json: &Json) -> Option<String> {
    path_search(expr, json).and_then(|v| v.as_str().map(str::to_string))
}

/// Number at `expr` as an integer, or `None`
pub fn path_i64(expr: &str, json: &Json) -> Option<i64> {
    path_search(expr, json).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
}

/// Scalar at `expr` rendered as a string, numbers and booleans included
pub fn path_string(expr: &str, json: &Json) -> Option<String> {
    match path_search(expr, json)? {
        Json::String(s) => Some(s),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer at `expr`, also accepting numeric strings such as `"3"`
pub fn path_int(expr: &str, json: &Json) -> Option<i64> {
    match path_search(expr, json)? {
        Json::String(s) => s.trim().parse().ok(),
        other => other.as_i64(),
    }
}

/// Array at `expr`, or an empty list
pub fn path_array(expr: &str, json: &Json) -> Vec<Json> {
    match path_search(expr, json) {
        Some(Json::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn split_pipes(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (pos, c) in expr.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '|') if depth == 0 => {
                parts.push(&expr[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

fn parse_tokens(expr: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' | ' ' => i += 1,
            '"' => {
                let end = find_from(&chars, i + 1, '"').ok_or("unterminated quoted key")?;
                tokens.push(Token::Field(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            '[' => {
                let end = find_closing_bracket(&chars, i).ok_or("unterminated bracket")?;
                let inner: String = chars[i + 1..end].iter().collect();
                tokens.push(parse_bracket(inner.trim())?);
                i = end + 1;
            }
            // current node
            '@' => i += 1,
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Field(chars[start..i].iter().collect()));
            }
            c => return Err(format!("unexpected character '{}'", c)),
        }
    }
    Ok(tokens)
}

fn find_from(chars: &[char], from: usize, target: char) -> Option<usize> {
    (from..chars.len()).find(|&j| chars[j] == target)
}

fn find_closing_bracket(chars: &[char], open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (j, &c) in chars.iter().enumerate().skip(open + 1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, ']') => return Some(j),
            _ => {}
        }
    }
    None
}

fn parse_bracket(inner: &str) -> Result<Token, String> {
    match inner {
        "" => Ok(Token::Flatten),
        "*" => Ok(Token::Wildcard),
        _ if inner.starts_with('?') => {
            let body = inner[1..].trim();
            let (lhs, rhs, negate) = if let Some((l, r)) = body.split_once("!=") {
                (l, r, true)
            } else if let Some((l, r)) = body.split_once("==") {
                (l, r, false)
            } else {
                return Err(format!("unsupported filter '{}'", inner));
            };
            Ok(Token::Filter {
                lhs: parse_tokens(lhs.trim())?,
                literal: parse_literal(rhs.trim())?,
                negate,
            })
        }
        _ => inner
            .parse::<i64>()
            .map(Token::Index)
            .map_err(|_| format!("invalid index '{}'", inner)),
    }
}

fn parse_literal(raw: &str) -> Result<Json, String> {
    if let Some(s) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Ok(Json::String(s.to_string()));
    }
    if let Some(s) = raw.strip_prefix('`').and_then(|r| r.strip_suffix('`')) {
        return serde_json::from_str(s).map_err(|e| e.to_string());
    }
    serde_json::from_str(raw).map_err(|_| format!("invalid literal '{}'", raw))
}

fn eval(tokens: &[Token], value: &Json) -> Option<Json> {
    let Some((first, rest)) = tokens.split_first() else {
        return Some(value.clone());
    };

    match first {
        Token::Field(name) => value.get(name).and_then(|v| eval(rest, v)),
        Token::Index(i) => {
            let items = value.as_array()?;
            let idx = if *i < 0 { items.len() as i64 + i } else { *i };
            if idx < 0 {
                return None;
            }
            items.get(idx as usize).and_then(|v| eval(rest, v))
        }
        Token::Wildcard => project(value.as_array()?.iter(), rest),
        Token::Flatten => {
            let mut flat = Vec::new();
            for item in value.as_array()? {
                match item {
                    Json::Array(inner) => flat.extend(inner.iter().cloned()),
                    other => flat.push(other.clone()),
                }
            }
            project(flat.iter(), rest)
        }
        Token::Filter {
            lhs,
            literal,
            negate,
        } => {
            let items = value.as_array()?;
            let kept = items.iter().filter(|item| {
                let matches = eval(lhs, item).as_ref() == Some(literal);
                matches != *negate
            });
            project(kept, rest)
        }
    }
}

/// Apply `rest` to every item. A later `[]` flattens the projected results
/// as a whole, not per item.
fn project<'a>(items: impl Iterator<Item = &'a Json>, rest: &[Token]) -> Option<Json> {
    let split = rest.iter().position(|t| *t == Token::Flatten);
    let per_item = &rest[..split.unwrap_or(rest.len())];
    let projected = Json::Array(
        items
            .filter_map(|item| eval(per_item, item))
            .filter(|v| !v.is_null())
            .collect(),
    );
    match split {
        Some(k) => eval(&rest[k..], &projected),
        None => Some(projected),
    }
}

// =============================================================================
// Request building
// =============================================================================

/// Replace `{name}` placeholders in a URL template
pub fn replace_vars(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

/// Drop `null` values and empty maps/arrays, recursively
pub fn remove_nil(json: Json) -> Json {
    match json {
        Json::Object(map) => Json::Object(
            map.into_iter()
                .filter_map(|(k, v)| {
                    let v = remove_nil(v);
                    (!is_nil(&v)).then_some((k, v))
                })
                .collect(),
        ),
        Json::Array(items) => Json::Array(
            items
                .into_iter()
                .map(remove_nil)
                .filter(|v| !is_nil(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_nil(json: &Json) -> bool {
    match json {
        Json::Null => true,
        Json::Object(map) => map.is_empty(),
        Json::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Map zero values (empty string, 0, false, empty list) to `null`
pub fn value_ignore_empty(json: Json) -> Json {
    let empty = match &json {
        Json::String(s) => s.is_empty(),
        Json::Number(n) => n.as_f64() == Some(0.0),
        Json::Bool(b) => !b,
        Json::Array(items) => items.is_empty(),
        Json::Object(map) => map.is_empty(),
        Json::Null => true,
    };
    if empty { Json::Null } else { json }
}

/// Optional attribute as JSON, `null` when unset or empty
pub fn attr_ignore_empty(value: Option<&Value>) -> Json {
    value.map(value_to_json).map(value_ignore_empty).unwrap_or(Json::Null)
}

// =============================================================================
// Value conversion
// =============================================================================

/// Convert JSON value to DSL Value (`null` becomes `None`)
pub fn json_to_value(json: &Json) -> Option<Value> {
    match json {
        Json::Null => None,
        Json::String(s) => Some(Value::String(s.clone())),
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        Json::Array(items) => Some(Value::List(items.iter().filter_map(json_to_value).collect())),
        Json::Object(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}

/// Convert DSL Value to JSON value
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Bool(b) => Json::Bool(*b),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Copy the listed fields of a JSON object into flat attributes.
///
/// Each entry is `(attribute, path expression)`; missing fields are skipped.
pub fn flatten_fields(
    json: &Json,
    fields: &[(&str, &str)],
    attributes: &mut HashMap<String, Value>,
) {
    for (attr, expr) in fields {
        if let Some(v) = path_search(expr, json).as_ref().and_then(json_to_value) {
            attributes.insert(attr.to_string(), v);
        }
    }
}

/// Build a nested block (`List` of one `Map`) from the listed fields
pub fn flatten_block(json: Option<&Json>, fields: &[(&str, &str)]) -> Option<Value> {
    let json = json?;
    let mut block = HashMap::new();
    flatten_fields(json, fields, &mut block);
    Some(Value::List(vec![Value::Map(block)]))
}

/// Format unix seconds as RFC3339 in UTC; zero maps to an empty string
pub fn format_timestamp_rfc3339(secs: i64) -> String {
    if secs == 0 {
        return String::new();
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Json {
        json!({
            "users": [
                {"name": "alice", "status": "RUNNING", "databases": [{"name": "db1"}]},
                {"name": "bob", "status": "ERROR", "databases": [{"name": "db2"}, {"name": "db3"}]}
            ],
            "job": {"entities": {"image_id": "img-1"}},
            "tsd-link": "x"
        })
    }

    #[test]
    fn path_search_fields_and_indexes() {
        let d = doc();
        assert_eq!(path_str("job.entities.image_id", &d).as_deref(), Some("img-1"));
        assert_eq!(path_str("users[0].name", &d).as_deref(), Some("alice"));
        assert_eq!(path_str("users[-1].name", &d).as_deref(), Some("bob"));
        assert_eq!(path_str("\"tsd-link\"", &d).as_deref(), Some("x"));
        assert_eq!(path_search("users[5]", &d), None);
        assert_eq!(path_search("missing.field", &d), None);
    }

    #[test]
    fn lossy_scalars() {
        let d = json!({"port": 5066, "cu_num": "3", "auth": true, "bad": "x"});
        assert_eq!(path_string("port", &d).as_deref(), Some("5066"));
        assert_eq!(path_string("auth", &d).as_deref(), Some("true"));
        assert_eq!(path_int("cu_num", &d), Some(3));
        assert_eq!(path_int("port", &d), Some(5066));
        assert_eq!(path_int("bad", &d), None);
    }

    #[test]
    fn path_search_projections() {
        let d = doc();
        assert_eq!(path_search("users[*].name", &d), Some(json!(["alice", "bob"])));
        assert_eq!(
            path_search("users[].databases[].name", &d),
            Some(json!(["db1", "db2", "db3"]))
        );
        assert_eq!(path_str("users[*].name|[1]", &d).as_deref(), Some("bob"));
    }

    #[test]
    fn path_search_filters() {
        let d = doc();
        assert_eq!(
            path_str("users[?name=='bob']|[0].status", &d).as_deref(),
            Some("ERROR")
        );
        assert_eq!(
            path_search("users[?status!='ERROR'].name", &d),
            Some(json!(["alice"]))
        );
        assert_eq!(path_search("users[?name=='carol']|[0]", &d), None);
    }

    #[test]
    fn path_search_invalid_expression() {
        assert_eq!(path_search("users[abc]", &doc()), None);
        assert_eq!(path_search("users[0", &doc()), None);
    }

    #[test]
    fn replace_vars_fills_placeholders() {
        assert_eq!(
            replace_vars(
                "v1/{project_id}/instances/{instance_id}/users",
                &[("project_id", "p"), ("instance_id", "i")]
            ),
            "v1/p/instances/i/users"
        );
    }

    #[test]
    fn remove_nil_drops_empty_values() {
        let body = json!({
            "instance": {"name": "a", "param_group_id": null, "available_zones": []},
            "extend_param": {},
            "flag": false
        });
        assert_eq!(
            remove_nil(body),
            json!({"instance": {"name": "a"}, "flag": false})
        );
    }

    #[test]
    fn value_ignore_empty_maps_zero_values() {
        assert_eq!(value_ignore_empty(json!("")), Json::Null);
        assert_eq!(value_ignore_empty(json!(0)), Json::Null);
        assert_eq!(value_ignore_empty(json!(false)), Json::Null);
        assert_eq!(value_ignore_empty(json!("x")), json!("x"));
        assert_eq!(value_ignore_empty(json!(3)), json!(3));
    }

    #[test]
    fn json_value_conversion() {
        let v = json_to_value(&json!({"a": 1, "b": [true, null], "c": 1.5})).unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["b"], Value::List(vec![Value::Bool(true)]));
        assert_eq!(map["c"], Value::Float(1.5));
        assert_eq!(value_to_json(&Value::List(vec![Value::from("x")])), json!(["x"]));
    }

    #[test]
    fn flatten_fields_and_block() {
        let body = json!({"cu_num": 3, "name": "c1", "dn": {"country": "CN"}});
        let mut attrs = HashMap::new();
        flatten_fields(&body, &[("rs_num", "cu_num"), ("name", "name"), ("x", "nope")], &mut attrs);
        assert_eq!(attrs["rs_num"], Value::Int(3));
        assert!(!attrs.contains_key("x"));

        let block = flatten_block(body.get("dn"), &[("country", "country")]).unwrap();
        assert_eq!(block.as_list().unwrap()[0].as_map().unwrap()["country"], Value::from("CN"));
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp_rfc3339(0), "");
        assert_eq!(format_timestamp_rfc3339(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
