//! バーコード検出モジュール
//!
//! 裏表紙のEAN-13（ISBN/JAN）を汎用スキャンで検出し、
//! 見つからない場合はQRコード限定の再スキャンにフォールバックする。
//! 978/979プレフィックスによるISBN/JAN分類もここで行う。

use crate::error::Result;
use crate::extractor::ExtractionResult;
use image::DynamicImage;

/// 検出コードの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeType {
    Ean13,
    QrCode,
    CCode,
}

/// 検出位置（検出器が返す場合のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 検出された1件のコード
#[derive(Debug, Clone)]
pub struct DetectedCode {
    pub text: String,
    pub code_type: CodeType,
    pub rect: Option<CodeRect>,
}

/// バーコード検出器のインターフェース
///
/// 検出ゼロはOk(空リスト)、検出器自体の失敗はErr。
/// どちらの場合もパイプラインはQRフォールバックへ進む。
pub trait BarcodeScanner: Send + Sync {
    /// 汎用スキャン（全対応シンボロジー）
    fn decode(&self, image: &DynamicImage) -> Result<Vec<DetectedCode>>;

    /// QRコード限定の再スキャン（グレースケール入力）
    fn decode_fallback(&self, gray: &image::GrayImage) -> Result<Vec<DetectedCode>>;
}

/// rxingによる検出器
pub struct RxingScanner;

impl BarcodeScanner for RxingScanner {
    fn decode(&self, image: &DynamicImage) -> Result<Vec<DetectedCode>> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();

        // 検出ゼロはNotFoundエラーとして返るため、失敗系とまとめて空リスト扱い
        let results = rxing::helpers::detect_multiple_in_luma(gray.into_raw(), width, height)
            .unwrap_or_default();

        Ok(results
            .iter()
            .filter_map(|r| {
                let code_type = match r.getBarcodeFormat() {
                    rxing::BarcodeFormat::EAN_13 => CodeType::Ean13,
                    rxing::BarcodeFormat::QR_CODE => CodeType::QrCode,
                    _ => return None,
                };
                Some(DetectedCode {
                    text: r.getText().to_string(),
                    code_type,
                    rect: None,
                })
            })
            .collect())
    }

    fn decode_fallback(&self, gray: &image::GrayImage) -> Result<Vec<DetectedCode>> {
        let (width, height) = gray.dimensions();

        match rxing::helpers::detect_in_luma(
            gray.as_raw().clone(),
            width,
            height,
            Some(rxing::BarcodeFormat::QR_CODE),
        ) {
            Ok(result) => Ok(vec![DetectedCode {
                text: result.getText().to_string(),
                code_type: CodeType::QrCode,
                rect: None,
            }]),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// 検出コードをExtractionResultへ分類する
///
/// - EAN-13で978/979始まりの13桁 → isbn_barcode
/// - その他の13桁 → jan_barcode
/// - QRコードのペイロードも同じプレフィックス規則で分類
/// - QRペイロードがCコード形式（C+数字4桁）ならc_code
///
/// チェックディジットの再検証は行わない。EAN-13はシンボロジー層が
/// デコード時に検証済みのため（元実装のpyzbar挙動と同じ）。
pub fn classify_codes(codes: &[DetectedCode], result: &mut ExtractionResult) {
    for code in codes {
        match code.code_type {
            CodeType::Ean13 | CodeType::QrCode => {
                classify_payload(&code.text, result);
            }
            CodeType::CCode => {
                if result.c_code.is_none() {
                    result.c_code = Some(code.text.clone());
                }
            }
        }
    }
}

fn classify_payload(text: &str, result: &mut ExtractionResult) {
    let is_13_digits = text.len() == 13 && text.chars().all(|c| c.is_ascii_digit());

    if is_13_digits && (text.starts_with("978") || text.starts_with("979")) {
        if result.isbn_barcode.is_none() {
            result.isbn_barcode = Some(text.to_string());
        }
    } else if is_13_digits {
        if result.jan_barcode.is_none() {
            result.jan_barcode = Some(text.to_string());
        }
    } else if is_c_code(text) {
        if result.c_code.is_none() {
            result.c_code = Some(text.to_string());
        }
    }
}

/// Cコード形式（C+数字4桁）かどうか
fn is_c_code(text: &str) -> bool {
    text.len() == 5 && text.starts_with('C') && text[1..].chars().all(|c| c.is_ascii_digit())
}
