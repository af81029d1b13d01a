//! OCRテキスト抽出モジュール
//!
//! 複数の前処理バリアントをOCRにかけ、ISBN文字列・Cコード・価格表示を
//! 正規表現で拾い出す。信頼度はマッチしたフィールドの重みの合計
//! （ISBN 0.4 / Cコード 0.3 / 価格 0.3、上限1.0）。

pub mod engine;
pub mod preprocess;

pub use engine::{OcrEngine, TesseractCli};

use crate::extractor::ExtractionResult;
use crate::isbn;
use image::GrayImage;
use lazy_static::lazy_static;
use regex::Regex;

/// OCRに渡す文字ホワイトリスト（対象パターンの構成文字のみ）
pub const CHAR_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-¥E";

/// Vision APIフォールバックの発動閾値
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

lazy_static! {
    static ref ISBN_TEXT_RE: Regex =
        Regex::new(r"ISBN[- ]?97[89][- ]?\d[- ]?\d{1,2}[- ]?\d{5,6}[- ]?[\dX]").unwrap();
    static ref C_CODE_RE: Regex = Regex::new(r"C\d{4}").unwrap();
    static ref PRICE_RE: Regex = Regex::new(r"¥\d{2,5}E").unwrap();
}

/// 前処理1パス分のOCR出力
#[derive(Debug, Clone)]
pub struct OcrCandidate {
    pub raw_text: String,
    pub preprocessing_method: &'static str,
}

/// グレースケール画像からテキスト系コードを抽出する
///
/// 各前処理パイプラインのOCR出力を宣言順に走査し、
/// フィールドごとに最初のマッチを採用する。
pub fn extract_text_codes(
    gray: &GrayImage,
    engine: &dyn OcrEngine,
    verbose: bool,
) -> (ExtractionResult, f64) {
    let candidates = run_ocr_passes(gray, engine, verbose);
    match_candidates(&candidates)
}

/// 前処理バリアントごとにOCRを実行する
///
/// 1パスの失敗はログのみで続行（残りのパスが候補を出せるため）。
fn run_ocr_passes(gray: &GrayImage, engine: &dyn OcrEngine, verbose: bool) -> Vec<OcrCandidate> {
    let mut candidates = Vec::new();

    for (method, processed) in preprocess::build_candidates(gray) {
        match engine.recognize(&processed, CHAR_WHITELIST) {
            Ok(raw_text) => {
                if verbose {
                    println!("  [OCR:{}] {} chars", method, raw_text.len());
                }
                candidates.push(OcrCandidate {
                    raw_text,
                    preprocessing_method: method,
                });
            }
            Err(e) => {
                eprintln!("OCR処理エラー ({}): {}", method, e);
            }
        }
    }

    candidates
}

/// OCR候補群からパターンを拾い、部分結果と信頼度を返す
pub fn match_candidates(candidates: &[OcrCandidate]) -> (ExtractionResult, f64) {
    let mut result = ExtractionResult::default();
    let mut confidence = 0.0f64;

    for candidate in candidates {
        let text = &candidate.raw_text;

        // ISBN文字列（正規化してチェックディジットが通るものだけ採用）
        if result.isbn_text.is_none() {
            for m in ISBN_TEXT_RE.find_iter(text) {
                if let Some(normalized) = isbn::normalize(m.as_str()) {
                    result.isbn_text = Some(normalized);
                    confidence += 0.4;
                    break;
                }
            }
        }

        // Cコード
        if result.c_code.is_none() {
            if let Some(m) = C_CODE_RE.find(text) {
                result.c_code = Some(m.as_str().to_string());
                confidence += 0.3;
            }
        }

        // 価格表示
        if result.price_code.is_none() {
            if let Some(m) = PRICE_RE.find(text) {
                result.price_code = Some(m.as_str().to_string());
                confidence += 0.3;
            }
        }
    }

    (result, confidence.min(1.0))
}
