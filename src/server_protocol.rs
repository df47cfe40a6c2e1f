use serde_json::Value;

use crate::types::Direction;

#[derive(Debug)]
pub enum ParsedClientMessage {
    Hello {
        name: Option<String>,
        seed: Option<u64>,
    },
    Input {
        /// None when the key is not a movement binding; the tick treats
        /// that as a no-op rather than an error.
        dir: Option<Direction>,
    },
    Restart {
        seed: Option<u64>,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = match object.get("name") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            let seed = parse_optional_u64(object.get("seed"))?;
            Some(ParsedClientMessage::Hello { name, seed })
        }
        "input" => {
            let key = object.get("key")?.as_str()?;
            Some(ParsedClientMessage::Input {
                dir: Direction::parse_key(key),
            })
        }
        "restart" => {
            let seed = parse_optional_u64(object.get("seed"))?;
            Some(ParsedClientMessage::Restart { seed })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_optional_u64(value: Option<&Value>) -> Option<Option<u64>> {
    let Some(value) = value else {
        return Some(None);
    };
    value.as_u64().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hello_message() {
        let parsed = parse_client_message(r#"{"type":"hello","name":"A","seed":7}"#)
            .expect("hello message should parse");
        match parsed {
            ParsedClientMessage::Hello { name, seed } => {
                assert_eq!(name.as_deref(), Some("A"));
                assert_eq!(seed, Some(7));
            }
            _ => panic!("expected hello message"),
        }
    }

    #[test]
    fn parse_hello_without_optional_fields() {
        let parsed =
            parse_client_message(r#"{"type":"hello"}"#).expect("bare hello should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::Hello {
                name: None,
                seed: None
            }
        ));
    }

    #[test]
    fn parse_hello_rejects_negative_seed() {
        assert!(parse_client_message(r#"{"type":"hello","seed":-1}"#).is_none());
        assert!(parse_client_message(r#"{"type":"hello","seed":1.5}"#).is_none());
    }

    #[test]
    fn parse_input_maps_movement_keys() {
        let parsed = parse_client_message(r#"{"type":"input","key":"ArrowUp"}"#)
            .expect("input should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::Input {
                dir: Some(Direction::Up)
            }
        ));
    }

    #[test]
    fn parse_input_treats_unknown_keys_as_no_op() {
        let parsed = parse_client_message(r#"{"type":"input","key":"Escape"}"#)
            .expect("input should parse even for non-movement keys");
        assert!(matches!(parsed, ParsedClientMessage::Input { dir: None }));
    }

    #[test]
    fn parse_input_requires_a_key_field() {
        assert!(parse_client_message(r#"{"type":"input"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"input","key":3}"#).is_none());
    }

    #[test]
    fn parse_restart_message() {
        let parsed = parse_client_message(r#"{"type":"restart","seed":99}"#)
            .expect("restart should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::Restart { seed: Some(99) }
        ));
    }

    #[test]
    fn parse_ping_requires_finite_number() {
        assert!(matches!(
            parse_client_message(r#"{"type":"ping","t":12.5}"#),
            Some(ParsedClientMessage::Ping { .. })
        ));
        assert!(parse_client_message(r#"{"type":"ping","t":"soon"}"#).is_none());
    }

    #[test]
    fn parse_rejects_unknown_types_and_malformed_json() {
        assert!(parse_client_message(r#"{"type":"warp"}"#).is_none());
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message("[1,2,3]").is_none());
    }
}
