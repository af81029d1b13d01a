//! 書籍コード抽出パイプライン
//!
//! 段階的フォールバック:
//! 1. バーコード検出（決定的、最優先）
//! 2. OCRテキスト抽出（複数前処理 + パターンマッチ + 信頼度算出）
//! 3. Vision APIフォールバック（信頼度不足・主要フィールド未検出時のみ）
//!
//! 先に埋まったフィールドは後段が上書きしない。検出ゼロは失敗ではなく
//! 全フィールドNoneの結果として返る。

mod types;

pub use types::ExtractionResult;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::decoder::{self, BarcodeScanner, RxingScanner};
use crate::error::Result;
use crate::ocr::{self, OcrEngine, TesseractCli};
use crate::vision::{GeminiClient, VisionFallback};
use std::path::Path;
use std::time::Duration;

/// これ未満のペイロードは破損画像として処理前に弾く
const MIN_IMAGE_BYTES: usize = 100;

/// 抽出パイプライン本体
///
/// バッチ処理では1インスタンスを複数ワーカーで共有する。
pub struct BookCodeExtractor {
    scanner: Box<dyn BarcodeScanner>,
    ocr: Box<dyn OcrEngine>,
    vision: Option<VisionFallback>,
    verbose: bool,
}

impl BookCodeExtractor {
    pub fn new(
        scanner: Box<dyn BarcodeScanner>,
        ocr: Box<dyn OcrEngine>,
        vision: Option<VisionFallback>,
        verbose: bool,
    ) -> Self {
        Self {
            scanner,
            ocr,
            vision,
            verbose,
        }
    }

    /// 設定から本番構成を組み立てる
    ///
    /// APIキー未設定の場合はVisionフォールバック無効のまま動作する。
    pub fn from_config(config: &Config, verbose: bool) -> Result<Self> {
        let vision = match config.get_api_key() {
            Ok(api_key) => {
                let client = GeminiClient::new(
                    api_key,
                    config.model.clone(),
                    Duration::from_secs(config.timeout_seconds),
                )?;
                let cache = CacheStore::open(&config.cache_dir())?;
                Some(VisionFallback::new(
                    Box::new(client),
                    cache,
                    Duration::from_millis(config.min_call_interval_ms),
                    config.max_image_size,
                ))
            }
            Err(_) => {
                if verbose {
                    println!("APIキー未設定のためVisionフォールバックは無効です");
                }
                None
            }
        };

        Ok(Self::new(
            Box::new(RxingScanner),
            Box::new(TesseractCli::new(&config.ocr_command)),
            vision,
            verbose,
        ))
    }

    /// 画像ファイルからコードを抽出する
    ///
    /// 読み込み失敗は全フィールドNoneの結果に縮退する（エラーにしない）。
    pub fn extract_from_path(&self, path: &Path) -> ExtractionResult {
        match std::fs::read(path) {
            Ok(bytes) => self.extract_from_bytes(&bytes),
            Err(e) => {
                eprintln!("画像読み込みエラー ({}): {}", path.display(), e);
                ExtractionResult::default()
            }
        }
    }

    /// 画像バイト列からコードを抽出する
    ///
    /// 各ステージのエラーは「そのステージは何も寄与しない」として処理し、
    /// 常に完全な形のExtractionResultを返す。
    pub fn extract_from_bytes(&self, bytes: &[u8]) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        if bytes.len() < MIN_IMAGE_BYTES {
            eprintln!(
                "画像データが小さすぎます ({} bytes)、破損として扱います",
                bytes.len()
            );
            return result;
        }

        let img = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                eprintln!("画像デコードエラー: {}", e);
                return result;
            }
        };
        let gray = img.to_luma8();

        // 1. バーコード検出（検出ゼロ・失敗時はQR限定フォールバック）
        match self.scanner.decode(&img) {
            Ok(codes) if !codes.is_empty() => decoder::classify_codes(&codes, &mut result),
            Ok(_) => self.run_decode_fallback(&gray, &mut result),
            Err(e) => {
                eprintln!("バーコード検出エラー: {}", e);
                self.run_decode_fallback(&gray, &mut result);
            }
        }

        if self.verbose && result.isbn_barcode.is_some() {
            println!("  バーコード検出: {}", result.isbn_barcode.as_deref().unwrap_or(""));
        }

        // 2. OCRテキスト抽出
        let confidence = if self.ocr.is_available() {
            let (partial, confidence) = ocr::extract_text_codes(&gray, self.ocr.as_ref(), self.verbose);
            result.fill_missing(&partial);
            confidence
        } else {
            if self.verbose {
                println!("  OCRエンジン利用不可、テキスト抽出をスキップ");
            }
            0.0
        };

        // 3. Visionフォールバック
        if let Some(vision) = &self.vision {
            if VisionFallback::should_trigger(confidence, &result) {
                if self.verbose {
                    println!("  信頼度 {:.1} → Vision APIフォールバック", confidence);
                }
                vision.run(bytes, &mut result, self.verbose);
            }
        }

        result
    }

    fn run_decode_fallback(&self, gray: &image::GrayImage, result: &mut ExtractionResult) {
        match self.scanner.decode_fallback(gray) {
            Ok(codes) => decoder::classify_codes(&codes, result),
            Err(e) => eprintln!("QRコード検出エラー: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{CodeType, DetectedCode};
    use crate::error::BookCodeError;

    struct FakeScanner {
        codes: Vec<DetectedCode>,
    }

    impl BarcodeScanner for FakeScanner {
        fn decode(&self, _image: &image::DynamicImage) -> Result<Vec<DetectedCode>> {
            Ok(self.codes.clone())
        }

        fn decode_fallback(&self, _gray: &image::GrayImage) -> Result<Vec<DetectedCode>> {
            Ok(Vec::new())
        }
    }

    struct FailingScanner;

    impl BarcodeScanner for FailingScanner {
        fn decode(&self, _image: &image::DynamicImage) -> Result<Vec<DetectedCode>> {
            Err(BookCodeError::DecoderUnavailable("テスト用".to_string()))
        }

        fn decode_fallback(&self, _gray: &image::GrayImage) -> Result<Vec<DetectedCode>> {
            Err(BookCodeError::DecoderUnavailable("テスト用".to_string()))
        }
    }

    struct FixedOcr {
        text: String,
    }

    impl OcrEngine for FixedOcr {
        fn is_available(&self) -> bool {
            true
        }

        fn recognize(&self, _image: &image::GrayImage, _whitelist: &str) -> Result<String> {
            Ok(self.text.clone())
        }
    }

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn is_available(&self) -> bool {
            false
        }

        fn recognize(&self, _image: &image::GrayImage, _whitelist: &str) -> Result<String> {
            Err(BookCodeError::OcrUnavailable("テスト用".to_string()))
        }
    }

    /// テスト用のデコード可能なPNGを生成する
    fn test_png() -> Vec<u8> {
        let mut img = image::GrayImage::new(64, 64);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Luma([((x * 7 + y * 13) % 256) as u8]);
        }
        let mut buf = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("PNG生成失敗");
        buf
    }

    fn ean(text: &str) -> DetectedCode {
        DetectedCode {
            text: text.to_string(),
            code_type: CodeType::Ean13,
            rect: None,
        }
    }

    #[test]
    fn test_tiny_payload_rejected() {
        let extractor = BookCodeExtractor::new(
            Box::new(FakeScanner { codes: vec![] }),
            Box::new(NoOcr),
            None,
            false,
        );
        let result = extractor.extract_from_bytes(&[0u8; 50]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_undecodable_bytes_yield_empty_result() {
        let extractor = BookCodeExtractor::new(
            Box::new(FakeScanner { codes: vec![] }),
            Box::new(NoOcr),
            None,
            false,
        );
        // 100バイト以上だが画像ではないデータ
        let result = extractor.extract_from_bytes(&[0xABu8; 512]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_unreadable_path_yields_empty_result() {
        let extractor = BookCodeExtractor::new(
            Box::new(FakeScanner { codes: vec![] }),
            Box::new(NoOcr),
            None,
            false,
        );
        let result = extractor.extract_from_path(Path::new("/nonexistent/image.jpg"));
        assert!(result.is_empty());
    }

    #[test]
    fn test_barcode_stage_fills_isbn() {
        let extractor = BookCodeExtractor::new(
            Box::new(FakeScanner {
                codes: vec![ean("9784000000001")],
            }),
            Box::new(NoOcr),
            None,
            false,
        );
        let result = extractor.extract_from_bytes(&test_png());
        assert_eq!(result.isbn_barcode.as_deref(), Some("9784000000001"));
    }

    #[test]
    fn test_ocr_cannot_overwrite_barcode() {
        // バーコードで確定したISBNはOCRのISBN文字列と別フィールド、
        // Cコード・価格だけがOCRから補完される
        let extractor = BookCodeExtractor::new(
            Box::new(FakeScanner {
                codes: vec![ean("9784003101018")],
            }),
            Box::new(FixedOcr {
                text: "ISBN978-4-10-101001-4 C0197 ¥700E".to_string(),
            }),
            None,
            false,
        );
        let result = extractor.extract_from_bytes(&test_png());
        assert_eq!(result.isbn_barcode.as_deref(), Some("9784003101018"));
        assert_eq!(result.isbn_text.as_deref(), Some("9784101010014"));
        assert_eq!(result.c_code.as_deref(), Some("C0197"));
        assert_eq!(result.price_code.as_deref(), Some("¥700E"));
    }

    #[test]
    fn test_scanner_failure_degrades_to_ocr() {
        let extractor = BookCodeExtractor::new(
            Box::new(FailingScanner),
            Box::new(FixedOcr {
                text: "C0095 ¥700E".to_string(),
            }),
            None,
            false,
        );
        let result = extractor.extract_from_bytes(&test_png());
        assert!(result.isbn_barcode.is_none());
        assert_eq!(result.c_code.as_deref(), Some("C0095"));
    }
}
