//! Wire codec for the backend's CLI line protocol.
//!
//! Commands are whitespace-delimited tokens, URL-escaped per token and
//! newline-terminated. The response is one line in the same encoding,
//! echoing the command tokens before the result tokens. Attribute
//! responses carry `name:value` tokens, split at the first `:`.

use std::collections::HashMap;

use rondoplayer::{PlayerError, Result};

/// Serialize command tokens into a wire line (without the newline).
pub fn encode_line(tokens: &[&str]) -> String {
    tokens
        .iter()
        .map(|token| urlencoding::encode(token).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a response line into decoded tokens.
pub fn decode_line(line: &str) -> Result<Vec<String>> {
    line.split_whitespace()
        .map(|token| {
            urlencoding::decode(token)
                .map(|cow| cow.into_owned())
                .map_err(|err| PlayerError::Protocol(format!("bad token encoding: {err}")))
        })
        .collect()
}

/// Collect `name:value` tokens into a map. Tokens without a `:` are
/// positional (command echo) and ignored.
pub fn attrs(tokens: &[String]) -> HashMap<String, String> {
    tokens
        .iter()
        .filter_map(|token| token.split_once(':'))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Segment a flat attribute list into per-record maps. A new record
/// starts at every occurrence of the `boundary` attribute; tokens
/// before the first boundary belong to no record.
pub fn split_records(tokens: &[String], boundary: &str) -> Vec<HashMap<String, String>> {
    let mut records = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;
    for token in tokens {
        let Some((name, value)) = token.split_once(':') else {
            continue;
        };
        if name == boundary {
            if let Some(done) = current.take() {
                records.push(done);
            }
            current = Some(HashMap::new());
        }
        if let Some(record) = current.as_mut() {
            record.insert(name.to_string(), value.to_string());
        }
    }
    if let Some(done) = current.take() {
        records.push(done);
    }
    records
}

/// Positional response token, or a protocol error naming the position.
pub fn field(tokens: &[String], index: usize) -> Result<&str> {
    tokens
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| PlayerError::Protocol(format!("response too short, no token {index}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_escaped_per_token() {
        let line = encode_line(&["00:04:20", "playlist", "add", "file:///a b.flac"]);
        assert_eq!(line, "00%3A04%3A20 playlist add file%3A%2F%2F%2Fa%20b.flac");
    }

    #[test]
    fn lines_round_trip() {
        let tokens = ["info", "total", "songs", "?"];
        let decoded = decode_line(&encode_line(&tokens)).unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn attrs_split_at_first_colon() {
        let tokens = vec!["count:2".to_string(), "url:file://x".to_string()];
        let map = attrs(&tokens);
        assert_eq!(map["count"], "2");
        assert_eq!(map["url"], "file://x");
    }

    #[test]
    fn records_split_on_boundary() {
        let tokens: Vec<String> = [
            "count:2",
            "id:10",
            "title:One",
            "id:11",
            "title:Two",
            "duration:180.5",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let records = split_records(&tokens, "id");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], "One");
        assert_eq!(records[1]["duration"], "180.5");
        assert!(!records[0].contains_key("count"));
    }

    #[test]
    fn missing_field_is_a_protocol_error() {
        let tokens = vec!["mode".to_string()];
        assert!(matches!(
            field(&tokens, 2),
            Err(PlayerError::Protocol(_))
        ));
    }
}
