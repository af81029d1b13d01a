//! Vision解析結果キャッシュモジュール
//!
//! 画像バイト列のSHA-256ハッシュをキーにしてVision APIの抽出結果を
//! 1エントリ1ファイルのJSONとして保存し、同じ画像の再問い合わせを防ぐ。
//! エビクションは行わない（手動の`cache --clear`のみ）。

use crate::error::Result;
use crate::extractor::ExtractionResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CURRENT_VERSION: u32 = 1;

/// キャッシュエントリ（1画像ハッシュにつき1ファイル）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// バージョン（互換性チェック用）
    version: u32,
    /// 画像バイト列のSHA-256ハッシュ
    pub image_hash: String,
    /// Vision APIから抽出したフィールド
    pub extracted_fields: ExtractionResult,
    /// 作成日時（RFC 3339）
    pub created_at: String,
}

impl CacheEntry {
    pub fn new(image_hash: String, extracted_fields: ExtractionResult) -> Self {
        Self {
            version: CURRENT_VERSION,
            image_hash,
            extracted_fields,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// ファイルベースのキャッシュストア
///
/// 読み書きはMutexで直列化する。バッチ処理では複数ワーカーが
/// 同一ストアを共有するため。
pub struct CacheStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl CacheStore {
    /// キャッシュディレクトリを開く（なければ作成）
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("vision-{}.json", hash))
    }

    /// エントリをルックアップ
    ///
    /// ファイルなし・JSON破損・バージョン不一致はすべてミス扱い。
    pub fn get(&self, hash: &str) -> Option<CacheEntry> {
        let _guard = self.lock.lock().ok()?;

        let path = self.entry_path(hash);
        let content = fs::read_to_string(path).ok()?;

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if entry.version == CURRENT_VERSION => Some(entry),
            Ok(_) => {
                eprintln!("キャッシュバージョン不一致、エントリを無視します: {}", hash);
                None
            }
            Err(_) => None,
        }
    }

    /// エントリを保存
    pub fn put(&self, entry: &CacheEntry) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let path = self.entry_path(&entry.image_hash);
        let content = serde_json::to_string_pretty(entry)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// エントリ件数
    pub fn len(&self) -> usize {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| {
                        let name = e.file_name();
                        let name = name.to_string_lossy();
                        name.starts_with("vision-") && name.ends_with(".json")
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全エントリを削除し、削除件数を返す
    pub fn clear(&self) -> Result<usize> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("vision-") && name.ends_with(".json") {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// 画像バイト列のハッシュを計算（SHA-256、16進文字列）
pub fn compute_image_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
