use serde::{Deserialize, Serialize};

/// 書籍コード抽出結果
///
/// 各フィールドは検出できなければNone。先に埋まったフィールドを
/// 後段のステージが上書きすることはない（fill_missing参照）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// ISBNバーコード（978/979で始まる13桁）
    #[serde(default)]
    pub isbn_barcode: Option<String>,

    /// JANコード（その他のEAN-13）
    #[serde(default)]
    pub jan_barcode: Option<String>,

    /// ISBN文字列（正規化済み13桁）
    #[serde(default)]
    pub isbn_text: Option<String>,

    /// Cコード（Cxxxx形式）
    #[serde(default)]
    pub c_code: Option<String>,

    /// 価格表示（¥xxxE形式）
    #[serde(default)]
    pub price_code: Option<String>,
}

impl ExtractionResult {
    /// 未設定のフィールドだけをotherの値で埋める
    ///
    /// バーコード → OCR → Vision の優先順位はこの片方向マージで保証する。
    pub fn fill_missing(&mut self, other: &ExtractionResult) {
        if self.isbn_barcode.is_none() {
            self.isbn_barcode = other.isbn_barcode.clone();
        }
        if self.jan_barcode.is_none() {
            self.jan_barcode = other.jan_barcode.clone();
        }
        if self.isbn_text.is_none() {
            self.isbn_text = other.isbn_text.clone();
        }
        if self.c_code.is_none() {
            self.c_code = other.c_code.clone();
        }
        if self.price_code.is_none() {
            self.price_code = other.price_code.clone();
        }
    }

    /// 全フィールド未設定かどうか
    pub fn is_empty(&self) -> bool {
        self.isbn_barcode.is_none()
            && self.jan_barcode.is_none()
            && self.isbn_text.is_none()
            && self.c_code.is_none()
            && self.price_code.is_none()
    }

    /// 登録に使うISBN（バーコード優先、なければテキスト）
    pub fn best_isbn(&self) -> Option<&str> {
        self.isbn_barcode.as_deref().or(self.isbn_text.as_deref())
    }

    /// 価格表示から数値部分を取り出す（"¥700E" → 700）
    pub fn price_yen(&self) -> Option<u32> {
        let code = self.price_code.as_deref()?;
        let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_missing_keeps_existing() {
        let mut result = ExtractionResult {
            isbn_barcode: Some("9784003101018".to_string()),
            ..Default::default()
        };
        let later = ExtractionResult {
            isbn_barcode: Some("9999999999999".to_string()),
            c_code: Some("C0197".to_string()),
            ..Default::default()
        };

        result.fill_missing(&later);

        // 設定済みフィールドは維持、未設定フィールドのみ補完
        assert_eq!(result.isbn_barcode.as_deref(), Some("9784003101018"));
        assert_eq!(result.c_code.as_deref(), Some("C0197"));
    }

    #[test]
    fn test_is_empty() {
        assert!(ExtractionResult::default().is_empty());

        let result = ExtractionResult {
            price_code: Some("¥700E".to_string()),
            ..Default::default()
        };
        assert!(!result.is_empty());
    }

    #[test]
    fn test_best_isbn_prefers_barcode() {
        let result = ExtractionResult {
            isbn_barcode: Some("9784003101018".to_string()),
            isbn_text: Some("9784101010014".to_string()),
            ..Default::default()
        };
        assert_eq!(result.best_isbn(), Some("9784003101018"));

        let text_only = ExtractionResult {
            isbn_text: Some("9784101010014".to_string()),
            ..Default::default()
        };
        assert_eq!(text_only.best_isbn(), Some("9784101010014"));
    }

    #[test]
    fn test_price_yen() {
        let result = ExtractionResult {
            price_code: Some("¥700E".to_string()),
            ..Default::default()
        };
        assert_eq!(result.price_yen(), Some(700));
        assert_eq!(ExtractionResult::default().price_yen(), None);
    }

    #[test]
    fn test_serde_snake_case_keys() {
        let json = r#"{"isbn_text": "9784003101018", "c_code": "C0197"}"#;
        let result: ExtractionResult = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert_eq!(result.isbn_text.as_deref(), Some("9784003101018"));
        assert_eq!(result.c_code.as_deref(), Some("C0197"));
        assert!(result.isbn_barcode.is_none());
    }
}
