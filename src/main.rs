use book_code_rust::{batch, cache, cli, config, error, extractor, scanner};
use cache::CacheStore;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use error::Result;
use extractor::BookCodeExtractor;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Scan { image, output } => {
            println!("📖 book-code - コード抽出\n");

            let extractor = BookCodeExtractor::from_config(&config, cli.verbose)?;
            let result = extractor.extract_from_path(&image);

            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("✔ 結果を保存: {}", path.display());
                }
                None => println!("{}", json),
            }

            if result.is_empty() {
                println!("\nコードは検出されませんでした（手動入力が必要です）");
            }
        }

        Commands::Batch {
            folder,
            output,
            recursive,
            jobs,
        } => {
            println!("📚 book-code - 一括処理\n");

            // 1. 画像スキャン
            println!("[1/3] 画像をスキャン中...");
            let images = scanner::scan_folder(&folder, recursive)?;
            println!("✔ {}枚の画像を検出\n", images.len());

            if images.is_empty() {
                return Err(error::BookCodeError::NoImagesFound(
                    folder.display().to_string(),
                ));
            }

            if let Some(jobs) = jobs {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .build_global()
                    .ok();
            }

            // 2. コード抽出
            println!("[2/3] コード抽出中...");
            let extractor = BookCodeExtractor::from_config(&config, cli.verbose)?;
            let records = batch::process_images(&extractor, &images);
            println!(
                "✔ 抽出完了 ({}/{}件でコード検出)\n",
                batch::count_resolved(&records),
                records.len()
            );

            // 3. 結果保存
            println!("[3/3] 結果を保存中...");
            let output = output.unwrap_or_else(|| folder.join("book-codes.json"));
            let json = serde_json::to_string_pretty(&records)?;
            std::fs::write(&output, json)?;
            println!("✔ 結果を保存: {}", output.display());

            println!("\n✅ 完了");
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  モデル: {}", config.model);
                println!("  最大画像サイズ: {}px", config.max_image_size);
                println!("  API最小呼び出し間隔: {}ms", config.min_call_interval_ms);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  OCRコマンド: {}", config.ocr_command);
                println!("  キャッシュ: {}", config.cache_dir().display());
                println!(
                    "  APIキー: {}",
                    if config.api_key.is_some() {
                        "設定済み"
                    } else {
                        "未設定"
                    }
                );
            }
        }

        Commands::Cache { clear, info } => {
            let store = CacheStore::open(&config.cache_dir())?;

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                println!("キャッシュ情報:");
                println!("  パス: {}", store.dir().display());
                println!("  件数: {}", store.len());
            }

            if clear {
                match store.clear() {
                    Ok(0) => println!("キャッシュエントリは存在しません"),
                    Ok(n) => println!("✔ {}件のキャッシュを削除しました", n),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}
