//! 書籍裏表紙画像からISBN・JAN・Cコード・価格コードを抽出するライブラリ
//!
//! バーコード検出 → OCR → Vision APIフォールバックの段階的パイプライン。
//! 使い方は `extractor::BookCodeExtractor` を参照。

pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod isbn;
pub mod ocr;
pub mod scanner;
pub mod vision;

pub use extractor::{BookCodeExtractor, ExtractionResult};
