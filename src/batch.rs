//! 一括処理モジュール
//!
//! フォルダ内の画像をワーカープールで並列処理する。
//! 1枚の失敗は全体を止めない（結果は全フィールドNoneのレコードになる）。

use crate::extractor::{BookCodeExtractor, ExtractionResult};
use crate::isbn;
use crate::scanner::ImageInfo;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;

/// 1画像分の処理結果
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub file_name: String,
    /// 登録用の正規化済みISBN（バーコード優先）
    pub isbn: Option<String>,
    /// 価格表示から取り出した数値（円）
    pub price: Option<u32>,
    pub codes: ExtractionResult,
}

/// 画像リストを並列処理してレコード列を返す
///
/// 出力順は入力順（ファイル名ソート済み）を維持する。
pub fn process_images(extractor: &BookCodeExtractor, images: &[ImageInfo]) -> Vec<BatchRecord> {
    let progress = ProgressBar::new(images.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let records: Vec<BatchRecord> = images
        .par_iter()
        .map(|image| {
            let codes = extractor.extract_from_path(&image.path);
            progress.inc(1);

            BatchRecord {
                file_name: image.file_name.clone(),
                isbn: codes.best_isbn().and_then(isbn::normalize),
                price: codes.price_yen(),
                codes,
            }
        })
        .collect();

    progress.finish_and_clear();
    records
}

/// 1件以上コードが取れたレコード数
pub fn count_resolved(records: &[BatchRecord]) -> usize {
    records.iter().filter(|r| !r.codes.is_empty()).count()
}
