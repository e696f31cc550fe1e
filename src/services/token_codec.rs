use data_encoding::HEXLOWER;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 生成するトークンのバイト数（16進で64文字）
pub const RAW_TOKEN_BYTES: usize = 32;

/// 32バイトのランダムトークンを生成し、小文字16進でエンコード
///
/// OSの乱数生成器から毎回直接取得する（シード固定なし）。
pub fn generate_raw_token() -> String {
    let mut bytes = [0u8; RAW_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

/// トークンをSHA256でハッシュ化（小文字16進、64文字）
pub fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}

/// 平文とハッシュを照合
///
/// # Security
/// 比較は定数時間で行う（タイミング攻撃対策）
pub fn verify(raw: &str, hash: &str) -> bool {
    digest(raw).as_bytes().ct_eq(hash.as_bytes()).into()
}
