//! Vision APIフォールバックモジュール
//!
//! OCRの信頼度が低い、または主要フィールドが埋まらない場合の最終手段。
//! キャッシュ確認 → レート制限 → 画像最適化 → API呼び出し → マージの
//! 一連をひとつのクリティカルセクションとして実行する。

pub mod client;
pub mod parser;

pub use client::{GeminiClient, VisionModelClient};

use crate::cache::{self, CacheEntry, CacheStore};
use crate::error::{BookCodeError, Result};
use crate::extractor::ExtractionResult;
use crate::ocr::CONFIDENCE_THRESHOLD;
use image::GenericImageView;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 抽出プロンプト（4フィールド固定スキーマ、JSONのみ返答）
const PROMPT: &str = "\
この画像は書籍の裏表紙です。以下の情報を正確に抽出してください：

1. ISBNコード: 通常「ISBN」で始まり、「978」や「979」から始まる13桁の数字（例：ISBN978-4-00-112233-4）
2. JANコード: バーコード下に印刷された13桁の数字（通常ISBN-13と同じ）
3. Cコード: 「C」で始まる5文字のコード（例：C0095）
4. 価格表示: 「¥」で始まり、「E」で終わる表記（例：¥700E）

画像が不鮮明な場合も可能な限り識別してください。桁数や形式が合わない場合は無視してください。
以下のJSON形式のみで回答してください：
{
    \"isbn_text\": \"ISBNコード（形式：ISBN978-x-xx-xxxxxx-x）\",
    \"jan_barcode\": \"JANコード（13桁の数字）\",
    \"c_code\": \"Cコード（形式：Cxxxx）\",
    \"price_code\": \"価格表示（形式：¥xxxE）\"
}

抽出できない情報はnullとしてください。JSONのみを返してください。";

/// 直近の外部呼び出し時刻
#[derive(Default)]
struct RateLimitState {
    last_call: Option<Instant>,
}

/// Vision APIフォールバック
///
/// クライアント・キャッシュ・レート制限状態はプロセス内で共有される。
/// バッチ処理で複数ワーカーが同時に呼んでも、ゲートのMutexにより
/// 同一画像ハッシュへの二重API呼び出しは起きない。
pub struct VisionFallback {
    client: Box<dyn VisionModelClient>,
    cache: CacheStore,
    gate: Mutex<RateLimitState>,
    min_interval: Duration,
    max_image_size: u32,
}

impl VisionFallback {
    pub fn new(
        client: Box<dyn VisionModelClient>,
        cache: CacheStore,
        min_interval: Duration,
        max_image_size: u32,
    ) -> Self {
        Self {
            client,
            cache,
            gate: Mutex::new(RateLimitState::default()),
            min_interval,
            max_image_size,
        }
    }

    /// フォールバックを実行すべきかどうか
    ///
    /// 信頼度不足・ISBNバーコード未検出・Cコード未検出のいずれかで発動。
    pub fn should_trigger(confidence: f64, result: &ExtractionResult) -> bool {
        confidence < CONFIDENCE_THRESHOLD
            || result.isbn_barcode.is_none()
            || result.c_code.is_none()
    }

    /// フォールバックを実行し、未設定フィールドへマージする
    ///
    /// ネットワーク・認証・タイムアウト・パース失敗はすべてログのみで
    /// 「フィールドは未設定のまま」に縮退する。
    pub fn run(&self, image_bytes: &[u8], result: &mut ExtractionResult, verbose: bool) {
        let hash = cache::compute_image_hash(image_bytes);

        // キャッシュ確認からキャッシュ書き込みまでゲートを保持する
        let mut state = self.gate.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = self.cache.get(&hash) {
            if verbose {
                println!("  [Vision] キャッシュヒット: {}", &hash[..12]);
            }
            result.fill_missing(&entry.extracted_fields);
            return;
        }

        // レート制限: 直近の呼び出しから最小間隔を空ける
        if let Some(last) = state.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }

        // 最適化に失敗した場合は元画像をそのまま送る
        let payload = match self.optimize_image(image_bytes) {
            Ok(optimized) => optimized,
            Err(e) => {
                eprintln!("画像最適化エラー: {}", e);
                image_bytes.to_vec()
            }
        };

        if verbose {
            println!("  [Vision] API呼び出し: {} bytes", payload.len());
        }

        let response = match self.client.generate(PROMPT, &payload, "image/jpeg") {
            Ok(text) => {
                state.last_call = Some(Instant::now());
                text
            }
            Err(e) => {
                eprintln!("Vision API呼び出しエラー: {}", e);
                return;
            }
        };

        match parser::parse_vision_fields(&response) {
            Ok(fields) => {
                result.fill_missing(&fields);
                let entry = CacheEntry::new(hash, fields);
                if let Err(e) = self.cache.put(&entry) {
                    eprintln!("キャッシュ書き込みエラー: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Vision レスポンス解析エラー: {}", e);
            }
        }
    }

    /// API送信用に画像を最適化する
    ///
    /// 長辺を上限サイズまで縮小し、コントラスト調整と軽いノイズ除去を
    /// かけて高品質JPEGへ再エンコードする。一時ファイルはRAIIにより
    /// どの経路でも削除される。
    fn optimize_image(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| BookCodeError::ImageUnreadable(e.to_string()))?;

        let (w, h) = img.dimensions();
        let img = if w.max(h) > self.max_image_size {
            img.resize(
                self.max_image_size,
                self.max_image_size,
                image::imageops::FilterType::Triangle,
            )
        } else {
            img
        };

        // コントラスト・明るさ調整（ISBN部分を読みやすく）
        let mut rgb = img.to_rgb8();
        for pixel in rgb.pixels_mut() {
            for channel in pixel.0.iter_mut() {
                *channel = (1.3 * *channel as f32 + 10.0).clamp(0.0, 255.0) as u8;
            }
        }

        let denoised = image::imageops::blur(&rgb, 0.8);

        let temp = tempfile::Builder::new()
            .prefix("book-code-vision-")
            .suffix(".jpg")
            .tempfile()?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, 95);
            image::DynamicImage::ImageRgb8(denoised)
                .write_with_encoder(encoder)
                .map_err(|e| BookCodeError::ImageUnreadable(format!("JPEG書き出しエラー: {}", e)))?;
        }

        Ok(std::fs::read(temp.path())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_trigger_low_confidence() {
        let result = ExtractionResult {
            isbn_barcode: Some("9784003101018".to_string()),
            c_code: Some("C0197".to_string()),
            ..Default::default()
        };
        assert!(VisionFallback::should_trigger(0.6, &result));
    }

    #[test]
    fn test_should_trigger_missing_isbn_barcode() {
        // 信頼度が十分でもISBNバーコード未検出なら発動
        let result = ExtractionResult {
            c_code: Some("C0197".to_string()),
            ..Default::default()
        };
        assert!(VisionFallback::should_trigger(1.0, &result));
    }

    #[test]
    fn test_should_trigger_missing_c_code() {
        let result = ExtractionResult {
            isbn_barcode: Some("9784003101018".to_string()),
            ..Default::default()
        };
        assert!(VisionFallback::should_trigger(1.0, &result));
    }

    #[test]
    fn test_should_not_trigger_when_complete() {
        let result = ExtractionResult {
            isbn_barcode: Some("9784003101018".to_string()),
            c_code: Some("C0197".to_string()),
            ..Default::default()
        };
        assert!(!VisionFallback::should_trigger(0.7, &result));
    }
}
