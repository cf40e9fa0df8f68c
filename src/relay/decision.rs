//! Decision endpoint response parsing

use crate::chat_target;
use serde_json::Value;

/// A send instruction returned by the decision endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAction {
    pub to: String,
    pub body: String,
    pub is_group: bool,
}

/// Extract the send actions from a decision response.
///
/// `None` means the endpoint asked for nothing: `ok` is not `true` or there
/// is no `actions` array. Actions of any other shape are skipped.
pub fn parse_actions(response: &Value) -> Option<Vec<SendAction>> {
    if response.get("ok") != Some(&Value::Bool(true)) {
        return None;
    }
    let actions = response.get("actions")?.as_array()?;

    Some(actions.iter().filter_map(parse_action).collect())
}

fn parse_action(action: &Value) -> Option<SendAction> {
    if action.get("type").and_then(Value::as_str) != Some("send") {
        return None;
    }
    let to = non_empty_text(action.get("to")?)?;
    let body = non_empty_text(action.get("body")?)?;
    let is_group = action
        .get("isGroup")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| chat_target::looks_like_group(&to));

    Some(SendAction { to, body, is_group })
}

/// Text form of a scalar that counts as present
fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_send_action() {
        let actions = parse_actions(&json!({
            "ok": true,
            "actions": [{"type": "send", "to": "15551234567", "body": "hi"}]
        }))
        .unwrap();
        assert_eq!(
            actions,
            vec![SendAction {
                to: "15551234567".to_string(),
                body: "hi".to_string(),
                is_group: false,
            }]
        );
    }

    #[test]
    fn not_ok_means_no_actions() {
        assert!(parse_actions(&json!({"ok": false, "actions": []})).is_none());
        assert!(parse_actions(&json!({"ok": "true", "actions": []})).is_none());
        assert!(parse_actions(&json!({"actions": []})).is_none());
    }

    #[test]
    fn missing_or_non_array_actions() {
        assert!(parse_actions(&json!({"ok": true})).is_none());
        assert!(parse_actions(&json!({"ok": true, "actions": {"type": "send"}})).is_none());
        assert!(parse_actions(&json!(null)).is_none());
        assert!(parse_actions(&json!([1, 2])).is_none());
    }

    #[test]
    fn malformed_actions_are_skipped() {
        let actions = parse_actions(&json!({
            "ok": true,
            "actions": [
                null,
                "send",
                {"type": "tag", "to": "1", "body": "x"},
                {"type": "send", "to": "", "body": "x"},
                {"type": "send", "to": "1555"},
                {"type": "send", "to": "1555", "body": ""},
                {"type": "send", "to": 15551234567u64, "body": "numeric target"},
            ]
        }))
        .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].to, "15551234567");
    }

    #[test]
    fn group_targets() {
        let actions = parse_actions(&json!({
            "ok": true,
            "actions": [
                {"type": "send", "to": "120363@g.us", "body": "inferred"},
                {"type": "send", "to": "team", "body": "flagged", "isGroup": true},
                {"type": "send", "to": "120363@g.us", "body": "forced", "isGroup": false},
            ]
        }))
        .unwrap();
        assert!(actions[0].is_group);
        assert!(actions[1].is_group);
        assert!(!actions[2].is_group);
    }
}
