use crate::error::AppError;
use crate::services::otp::is_well_formed;

const MIN_PASSWORD_LEN: usize = 8;

/// メールアドレスの簡易チェック（存在確認はしない）
pub fn email(value: &str) -> Result<(), AppError> {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        )),
    }
}

pub fn reset_token(value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation("トークンは必須です".to_string()));
    }
    Ok(())
}

pub fn new_password(value: &str) -> Result<(), AppError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "パスワードは{MIN_PASSWORD_LEN}文字以上で入力してください"
        )));
    }
    Ok(())
}

pub fn otp_code(value: &str) -> Result<(), AppError> {
    if !is_well_formed(value.trim()) {
        return Err(AppError::Validation(
            "認証コードは6桁の数字で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        let cases = [
            ("bartender@example.com", true),
            ("  bartender@example.com ", true),
            ("", false),
            ("   ", false),
            ("no-at-sign", false),
            ("@example.com", false),
            ("bartender@", false),
        ];
        for (input, ok) in cases {
            assert_eq!(email(input).is_ok(), ok, "input: {input:?}");
        }
    }

    #[test]
    fn test_reset_token() {
        assert!(reset_token("abc").is_ok());
        assert!(reset_token("").is_err());
        assert!(reset_token(" \t").is_err());
    }

    #[test]
    fn test_new_password_counts_characters() {
        assert!(new_password("password").is_ok());
        assert!(new_password("short").is_err());
        // マルチバイト文字はバイト数ではなく文字数で数える
        assert!(new_password("カクテル").is_err());
        assert!(new_password("カクテルシェイカー").is_ok());
    }

    #[test]
    fn test_otp_code() {
        assert!(otp_code("482913").is_ok());
        assert!(otp_code(" 482913 ").is_ok());
        assert!(otp_code("48291").is_err());
        assert!(otp_code("48291x").is_err());
    }
}
