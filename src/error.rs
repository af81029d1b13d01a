use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookCodeError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`book-code config --set-api-key YOUR_KEY` で設定してください")]
    MissingApiKey,

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageUnreadable(String),

    #[error("バーコードデコーダが利用できません: {0}")]
    DecoderUnavailable(String),

    #[error("OCRエンジンが利用できません: {0}")]
    OcrUnavailable(String),

    #[error("OCR実行エラー: {0}")]
    OcrExecution(String),

    #[error("Vision API呼び出しエラー: {0}")]
    VisionApi(String),

    #[error("Vision APIレスポンスのパースに失敗: {0}")]
    VisionParse(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("画像が見つかりません: {0}")]
    NoImagesFound(String),
}

pub type Result<T> = std::result::Result<T, BookCodeError>;
