//! OCRエンジン連携モジュール
//!
//! tesseractバイナリを外部プロセスとして呼び出す。
//! バイナリが見つからない環境ではOCRステージ全体がスキップされる。

use crate::error::{BookCodeError, Result};
use image::GrayImage;
use std::process::Command;
use std::sync::OnceLock;

/// OCRエンジンのインターフェース
pub trait OcrEngine: Send + Sync {
    /// エンジンが実行可能かどうか
    fn is_available(&self) -> bool;

    /// ホワイトリスト指定付きでテキスト認識を実行する
    fn recognize(&self, image: &GrayImage, whitelist: &str) -> Result<String>;
}

/// tesseract CLIによるOCRエンジン
pub struct TesseractCli {
    command: String,
    available: OnceLock<bool>,
}

impl TesseractCli {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            available: OnceLock::new(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractCli {
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            Command::new(&self.command)
                .arg("--version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        })
    }

    fn recognize(&self, image: &GrayImage, whitelist: &str) -> Result<String> {
        // 前処理済み画像を一時PNGに書き出して渡す（終了時に自動削除）
        let temp = tempfile::Builder::new()
            .prefix("book-code-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save(temp.path())
            .map_err(|e| BookCodeError::OcrExecution(format!("一時画像の保存に失敗: {}", e)))?;

        let output = Command::new(&self.command)
            .arg(temp.path())
            .arg("stdout")
            .args(["--oem", "3", "--psm", "11"])
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", whitelist))
            .output()
            .map_err(|e| BookCodeError::OcrUnavailable(format!("tesseract実行エラー: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BookCodeError::OcrExecution(format!(
                "tesseract failed (code {:?}): {}",
                output.status.code(),
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
