use crate::AuthError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// 解析 MQTT 用户名 `{productKey}&{deviceName}`。
pub fn parse_username(username: &str) -> Result<(String, String), AuthError> {
    let parts: Vec<&str> = username.split('&').collect();
    match parts.as_slice() {
        [product_key, device_name] => Ok((product_key.to_string(), device_name.to_string())),
        _ => Err(AuthError::InvalidUsernameFormat(username.to_string())),
    }
}

/// 签名原文，逐字节拼接且无分隔符。
pub fn build_auth_content(device_name: &str, product_key: &str) -> String {
    format!("deviceName{}productKey{}", device_name, product_key)
}

/// 小写十六进制的 HMAC-SHA256(key = secret, message = content)。
pub fn build_password(secret: &str, content: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| AuthError::Internal(err.to_string()))?;
    mac.update(content.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 常量时间比较期望口令与提交口令。
pub fn validate_password(
    secret: &str,
    device_name: &str,
    product_key: &str,
    password: &str,
) -> bool {
    let content = build_auth_content(device_name, product_key);
    let Ok(expected) = build_password(secret, &content) else {
        return false;
    };
    expected.as_bytes().ct_eq(password.as_bytes()).into()
}
