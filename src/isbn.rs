//! ISBN正規化モジュール
//!
//! バーコード・OCR・Vision APIから得た生文字列を13桁ISBNに正規化する。
//!
//! ## 処理フロー
//! 1. 数字と'X'以外の文字を除去
//! 2. 10桁ならISBN-13へ変換（978付与 + チェックディジット再計算）
//! 3. 13桁候補はチェックディジットを検証

/// 数字と'X'以外を除去する（'x'は大文字化）
pub fn clean(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || c.eq_ignore_ascii_case(&'X'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// ISBN-13のチェックディジットを計算する
///
/// 先頭12桁に対し重み1,3を交互に掛けた和から
/// `(10 - (sum % 10)) % 10` で求める。
fn check_digit13(digits: &str) -> Option<u32> {
    if digits.len() < 12 {
        return None;
    }

    let mut sum = 0u32;
    for (i, c) in digits.chars().take(12).enumerate() {
        let d = c.to_digit(10)?;
        sum += if i % 2 == 0 { d } else { d * 3 };
    }

    Some((10 - (sum % 10)) % 10)
}

/// 13桁ISBNのチェックディジットを検証する
pub fn validate_isbn13(isbn: &str) -> bool {
    if isbn.len() != 13 || !isbn.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let expected = match check_digit13(isbn) {
        Some(d) => d,
        None => return false,
    };

    isbn.chars().last().and_then(|c| c.to_digit(10)) == Some(expected)
}

/// ISBN-10をISBN-13へ変換する
///
/// 先頭9桁に978を付与し、チェックディジットを再計算して付加する。
/// 旧チェックディジット（10桁目、X含む）は捨てる。
pub fn isbn10_to_isbn13(isbn10: &str) -> Option<String> {
    if isbn10.len() != 10 {
        return None;
    }
    // 先頭9桁は数字のみ
    if !isbn10[..9].chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut isbn13 = format!("978{}", &isbn10[..9]);
    let check = check_digit13(&isbn13)?;
    isbn13.push(char::from_digit(check, 10)?);

    Some(isbn13)
}

/// 生文字列を検証済み13桁ISBNへ正規化する
///
/// 区切り文字を除去した結果が10桁ならISBN-13へ変換、
/// 13桁ならチェックディジットを検証。不正な候補はNone。
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned = clean(raw);

    match cleaned.len() {
        10 => isbn10_to_isbn13(&cleaned),
        13 => {
            if validate_isbn13(&cleaned) {
                Some(cleaned)
            } else {
                None
            }
        }
        _ => None,
    }
}
