//! 响应提取：从模型原始输出中取出结构化载荷
//!
//! 贪婪匹配第一个 `{` 到最后一个 `}` 之间的内容（容忍前后夹杂的说明文字），然后整体解析为 JSON。
//! 本层不重试。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::{preview, ExtractionError};

fn json_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

/// 提取并解析载荷
pub fn extract_payload(raw: &str) -> Result<Value, ExtractionError> {
    let block = json_block()
        .find(raw)
        .ok_or(ExtractionError::NoJsonBlock)?
        .as_str();
    serde_json::from_str(block).map_err(|_| ExtractionError::InvalidJson(preview(block, 200)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_payload_surrounded_by_prose() {
        let raw = "Sure! Here is the call:\n{\"agent\": \"fitness_agent\", \"command\": \"suggest_plan\", \"params\": {\"goal\": \"run 5k\"}}\nLet me know.";
        assert_eq!(
            extract_payload(raw).unwrap(),
            json!({"agent": "fitness_agent", "command": "suggest_plan", "params": {"goal": "run 5k"}})
        );
    }

    #[test]
    fn test_matches_largest_enclosing_braces() {
        let raw = "```json\n{\"healthcare_agent\": {\"response\": {\"symptom\": \"headache\"}}}\n```";
        assert_eq!(
            extract_payload(raw).unwrap(),
            json!({"healthcare_agent": {"response": {"symptom": "headache"}}})
        );
    }

    #[test]
    fn test_no_block() {
        assert_eq!(
            extract_payload("I think you should see a doctor."),
            Err(ExtractionError::NoJsonBlock)
        );
    }

    #[test]
    fn test_invalid_block() {
        let err = extract_payload("{agent: fitness_agent}").unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidJson(s) if s.contains("fitness_agent")));
    }

    #[test]
    fn test_two_objects_are_not_split() {
        // 贪婪匹配把两段对象连在一起，整体不是合法 JSON
        let raw = "{\"a\": 1} and also {\"b\": 2}";
        assert!(matches!(extract_payload(raw), Err(ExtractionError::InvalidJson(_))));
    }
}
