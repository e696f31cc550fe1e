use rand::{Rng, rngs::OsRng};

pub const OTP_LENGTH: usize = 6;
const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;

/// 6桁のワンタイムパスコードを生成
///
/// 先頭は必ず 1〜9（100000〜999999 の一様分布）。
pub fn generate_otp() -> String {
    OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string()
}

/// 6桁の数字かどうか（形式チェックのみ）
pub fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_otp_range() {
        for _ in 0..200 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));

            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn test_generate_otp_varies() {
        let codes: std::collections::HashSet<String> = (0..50).map(|_| generate_otp()).collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed("123456"));
        assert!(is_well_formed("012345"));
        assert!(!is_well_formed("12345"));
        assert!(!is_well_formed("1234567"));
        assert!(!is_well_formed("12345a"));
        assert!(!is_well_formed("１２３４５６"));
    }
}
