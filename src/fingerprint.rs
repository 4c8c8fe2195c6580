use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256}; // 引入 SHA2 算法和 Digest 特性(方法集)
use std::fmt;
use std::str::FromStr;

use crate::canonical::{self, ImageInput};
use crate::error::EncodingError;

/// SHA-256 输出 32 字节，Hex 后 64 个字符
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// 内容指纹 (Fingerprint)
///
/// 规范化字节的 SHA-256，小写十六进制。两张图指纹相同当且仅当
/// 它们的规范化编码逐位相同。一经计算不可修改。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fingerprint {0:?}: expected 64 hex characters")]
pub struct InvalidFingerprint(pub String);

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.len() != FINGERPRINT_HEX_LEN || hex::decode(&lower).is_err() {
            return Err(InvalidFingerprint(s.to_string()));
        }
        Ok(Fingerprint(lower))
    }
}

/// 计算指纹
///
/// 空输入返回 `None` ("不可用")，让调用方把它归为"无法验证"，而不是崩溃。
pub fn fingerprint(bytes: &[u8]) -> Option<Fingerprint> {
    if bytes.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    // `{:x}` 把 32 字节摘要格式化为小写十六进制
    Some(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// 规范化编码 + 哈希，一步到位
///
/// 编码失败返回 `Err`，编码成功但结果为空返回 `Ok(None)`。
pub fn fingerprint_image(input: &ImageInput) -> Result<Option<Fingerprint>, EncodingError> {
    let bytes = canonical::encode(input)?;
    Ok(fingerprint(&bytes))
}
