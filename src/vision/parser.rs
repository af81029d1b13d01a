//! Vision APIレスポンスパーサー
//!
//! レスポンス全体のJSONパースを試み、失敗したら最初の `{...}` 部分を
//! 抜き出して再試行する。取り出した値はフィールドごとの形式検証を
//! 通ったものだけ採用する。

use crate::error::{BookCodeError, Result};
use crate::extractor::ExtractionResult;
use crate::isbn;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref JSON_OBJECT_RE: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
    static ref C_CODE_FULL_RE: Regex = Regex::new(r"^C\d{4}$").unwrap();
    static ref PRICE_FULL_RE: Regex = Regex::new(r"^¥\d{2,5}E$").unwrap();
}

/// レスポンステキストからJSON値を取り出す
///
/// 抽出優先順位:
/// 1. テキスト全体をそのままパース
/// 2. 最初の `{...}` 部分をパース
fn extract_json_value(response: &str) -> Result<serde_json::Value> {
    let trimmed = response.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let json_part = JSON_OBJECT_RE
        .find(trimmed)
        .map(|m| m.as_str())
        .ok_or_else(|| BookCodeError::VisionParse("JSONが見つかりません".to_string()))?;

    serde_json::from_str(json_part)
        .map_err(|e| BookCodeError::VisionParse(format!("JSONパースエラー: {}", e)))
}

/// Visionレスポンスを検証済みExtractionResultへパースする
///
/// モデルは4フィールド（isbn_text / jan_barcode / c_code / price_code）を
/// 返す契約。null・文字列"null"・形式不一致の値は未検出扱い。
pub fn parse_vision_fields(response: &str) -> Result<ExtractionResult> {
    let value = extract_json_value(response)?;

    let map = value
        .as_object()
        .ok_or_else(|| BookCodeError::VisionParse("JSONオブジェクトではありません".to_string()))?;

    Ok(ExtractionResult {
        isbn_barcode: None,
        isbn_text: get_string(map, "isbn_text").and_then(|s| isbn::normalize(&s)),
        jan_barcode: get_string(map, "jan_barcode").filter(|s| is_13_digits(s)),
        c_code: get_string(map, "c_code").filter(|s| C_CODE_FULL_RE.is_match(s)),
        price_code: get_string(map, "price_code").filter(|s| PRICE_FULL_RE.is_match(s)),
    })
}

fn is_13_digits(s: &str) -> bool {
    s.len() == 13 && s.chars().all(|c| c.is_ascii_digit())
}

/// JSONマップから文字列値を取り出す（null・"null"はNone）
fn get_string(map: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }

    let s = value.as_str()?.trim().to_string();
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return None;
    }

    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let response = r#"{
            "isbn_text": "ISBN978-4-00-310101-8",
            "jan_barcode": "9784003101018",
            "c_code": "C0197",
            "price_code": "¥700E"
        }"#;

        let result = parse_vision_fields(response).unwrap();
        assert_eq!(result.isbn_text.as_deref(), Some("9784003101018"));
        assert_eq!(result.jan_barcode.as_deref(), Some("9784003101018"));
        assert_eq!(result.c_code.as_deref(), Some("C0197"));
        assert_eq!(result.price_code.as_deref(), Some("¥700E"));
        assert!(result.isbn_barcode.is_none());
    }

    #[test]
    fn test_parse_json_with_surrounding_text() {
        let response = "結果は以下の通りです。\n{\"c_code\": \"C0095\", \"price_code\": null}\nご確認ください。";

        let result = parse_vision_fields(response).unwrap();
        assert_eq!(result.c_code.as_deref(), Some("C0095"));
        assert!(result.price_code.is_none());
    }

    #[test]
    fn test_null_values_ignored() {
        let response = r#"{"isbn_text": null, "jan_barcode": "null", "c_code": "NULL", "price_code": ""}"#;

        let result = parse_vision_fields(response).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_malformed_values_rejected() {
        // 形式に合わない値は採用しない
        let response = r#"{
            "isbn_text": "ISBN978-4-00-310101-9",
            "jan_barcode": "12345",
            "c_code": "C019",
            "price_code": "700円"
        }"#;

        let result = parse_vision_fields(response).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_isbn10_from_vision_converted() {
        let response = r#"{"isbn_text": "ISBN4-10-101001-3"}"#;
        let result = parse_vision_fields(response).unwrap();
        assert_eq!(result.isbn_text.as_deref(), Some("9784101010014"));
    }

    #[test]
    fn test_no_json_is_error() {
        let result = parse_vision_fields("JSONを含まないテキスト");
        assert!(result.is_err());
    }

    #[test]
    fn test_non_object_is_error() {
        let result = parse_vision_fields("[1, 2, 3]");
        assert!(result.is_err());
    }
}
