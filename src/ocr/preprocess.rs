//! OCR前処理モジュール
//!
//! 同一のグレースケール画像から複数の前処理バリアントを生成する。
//! 宣言順がそのままパターンマッチの優先順位になる（先勝ち）。

use image::GrayImage;

/// 前処理パイプライン一覧（宣言順 = 候補の優先順位）
///
/// 1. denoise-adaptive: ノイズ除去 + コントラスト調整 + 適応的二値化
/// 2. denoise-otsu:     ノイズ除去 + 強コントラスト + 大津の二値化
/// 3. blur-edges:       ガウスぼかし + エッジ抽出
pub fn build_candidates(gray: &GrayImage) -> Vec<(&'static str, GrayImage)> {
    let adaptive = {
        let denoised = median3(gray);
        let enhanced = contrast_scale(&denoised, 1.5, 10.0);
        let binary = adaptive_mean_threshold(&enhanced, 11, 2.0);
        morph_close3(&binary)
    };

    let otsu = {
        let denoised = median3(gray);
        let enhanced = contrast_scale(&denoised, 2.0, 5.0);
        let binary = otsu_threshold(&enhanced);
        morph_close3(&binary)
    };

    let edges = {
        let blurred = image::imageops::blur(gray, 1.5);
        sobel_edges(&blurred)
    };

    vec![
        ("denoise-adaptive", adaptive),
        ("denoise-otsu", otsu),
        ("blur-edges", edges),
    ]
}

/// 3x3メディアンフィルタ（ごま塩ノイズ除去）
pub fn median3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut window = [0u8; 9];
            let mut n = 0;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx >= 0 && ny >= 0 && nx < w as i32 && ny < h as i32 {
                        window[n] = img.get_pixel(nx as u32, ny as u32)[0];
                        n += 1;
                    }
                }
            }
            window[..n].sort_unstable();
            out.put_pixel(x, y, image::Luma([window[n / 2]]));
        }
    }

    out
}

/// 線形コントラスト調整: `out = clamp(alpha * p + beta)`
pub fn contrast_scale(img: &GrayImage, alpha: f32, beta: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);

    for (x, y, pixel) in img.enumerate_pixels() {
        let v = (alpha * pixel[0] as f32 + beta).clamp(0.0, 255.0) as u8;
        out.put_pixel(x, y, image::Luma([v]));
    }

    out
}

/// 適応的平均二値化
///
/// 各画素をblock x block近傍の平均値 - cと比較する。
/// 近傍和は積分画像で求める。
pub fn adaptive_mean_threshold(img: &GrayImage, block: u32, c: f64) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    // 積分画像（(w+1) x (h+1)）
    let iw = (w + 1) as usize;
    let mut integral = vec![0u64; iw * (h + 1) as usize];
    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += img.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * iw + (x + 1)] = integral[y * iw + (x + 1)] + row_sum;
        }
    }

    let r = (block / 2) as i64;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let x0 = (x - r).max(0) as usize;
            let y0 = (y - r).max(0) as usize;
            let x1 = (x + r + 1).min(w as i64) as usize;
            let y1 = (y + r + 1).min(h as i64) as usize;

            let sum = integral[y1 * iw + x1] + integral[y0 * iw + x0]
                - integral[y0 * iw + x1]
                - integral[y1 * iw + x0];
            let count = ((x1 - x0) * (y1 - y0)) as f64;
            let mean = sum as f64 / count;

            let p = img.get_pixel(x as u32, y as u32)[0] as f64;
            let v = if p > mean - c { 255 } else { 0 };
            out.put_pixel(x as u32, y as u32, image::Luma([v]));
        }
    }

    out
}

/// 大津の方法による二値化
pub fn otsu_threshold(img: &GrayImage) -> GrayImage {
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return img.clone();
    }

    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    // クラス間分散が最大になる閾値を探す
    let mut best_threshold = 0u8;
    let mut best_variance = 0.0f64;
    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;

    for t in 0..256usize {
        weight_bg += histogram[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }

        sum_bg += t as f64 * histogram[t] as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;

        let variance =
            weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }

    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    for (x, y, pixel) in img.enumerate_pixels() {
        let v = if pixel[0] > best_threshold { 255 } else { 0 };
        out.put_pixel(x, y, image::Luma([v]));
    }

    out
}

/// Sobel勾配強度によるエッジ抽出
pub fn sobel_edges(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    if w < 3 || h < 3 {
        return out;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dx: i32, dy: i32| -> i32 {
                img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i32
            };

            let gx = -p(-1, -1) - 2 * p(-1, 0) - p(-1, 1) + p(1, -1) + 2 * p(1, 0) + p(1, 1);
            let gy = -p(-1, -1) - 2 * p(0, -1) - p(1, -1) + p(-1, 1) + 2 * p(0, 1) + p(1, 1);

            let magnitude = ((gx * gx + gy * gy) as f64).sqrt().min(255.0) as u8;
            out.put_pixel(x, y, image::Luma([magnitude]));
        }
    }

    out
}

/// 3x3クロージング（膨張→収縮）
///
/// 二値化で途切れた文字ストロークをつなぐ。
pub fn morph_close3(img: &GrayImage) -> GrayImage {
    erode3(&dilate3(img))
}

fn dilate3(img: &GrayImage) -> GrayImage {
    neighborhood_extreme(img, true)
}

fn erode3(img: &GrayImage) -> GrayImage {
    neighborhood_extreme(img, false)
}

fn neighborhood_extreme(img: &GrayImage, maximum: bool) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut value = if maximum { 0u8 } else { 255u8 };
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx >= 0 && ny >= 0 && nx < w as i32 && ny < h as i32 {
                        let p = img.get_pixel(nx as u32, ny as u32)[0];
                        value = if maximum { value.max(p) } else { value.min(p) };
                    }
                }
            }
            out.put_pixel(x, y, image::Luma([value]));
        }
    }

    out
}
