use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical::{decode_rgb, ImageInput};
use crate::fingerprint::{fingerprint_image, Fingerprint};
use crate::provenance::ProvenanceRecord;
use crate::registry::Registry;

// 置信度是策略常量，不是统计量:
// 命中即确定；未命中是高置信但非绝对的否定 (库可能不完整)；算不出指纹给 0。
pub const CONFIDENCE_EXACT_MATCH: f32 = 1.0;
pub const CONFIDENCE_NO_MATCH: f32 = 0.9;
pub const CONFIDENCE_UNFINGERPRINTABLE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictReason {
    #[serde(rename = "exact match")]
    ExactMatch,
    #[serde(rename = "no match")]
    NoMatch,
    #[serde(rename = "unfingerprintable")]
    Unfingerprintable,
}

/// 单次验证的判决结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_authentic: bool,
    pub confidence: f32,
    pub fingerprint: Option<Fingerprint>,
    pub reason: VerdictReason,
    /// 命中时的来源记录。注意序列化后分区字段名为 `split`，取值
    /// `train` / `validation` / `test` / `unknown`。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProvenanceRecord>,
}

impl Verdict {
    fn unfingerprintable() -> Self {
        Self {
            is_authentic: false,
            confidence: CONFIDENCE_UNFINGERPRINTABLE,
            fingerprint: None,
            reason: VerdictReason::Unfingerprintable,
            metadata: None,
        }
    }
}

/// 验证候选图片是否在已知真票库中
///
/// 编码失败不会变成错误返回，而是 "unfingerprintable" 判决。
pub fn verify(candidate: &ImageInput, registry: &Registry) -> Verdict {
    let fp = match fingerprint_image(candidate) {
        Ok(Some(fp)) => fp,
        Ok(None) => return Verdict::unfingerprintable(),
        Err(e) => {
            debug!(error = %e, "candidate could not be canonicalized");
            return Verdict::unfingerprintable();
        }
    };

    if registry.contains(&fp) {
        let metadata = registry.lookup_metadata(&fp).cloned();
        Verdict {
            is_authentic: true,
            confidence: CONFIDENCE_EXACT_MATCH,
            fingerprint: Some(fp),
            reason: VerdictReason::ExactMatch,
            metadata,
        }
    } else {
        Verdict {
            is_authentic: false,
            confidence: CONFIDENCE_NO_MATCH,
            fingerprint: Some(fp),
            reason: VerdictReason::NoMatch,
            metadata: None,
        }
    }
}

/// 验证上传的原始文件: 先解码并转成 RGB，再走 [`verify`]
pub fn verify_encoded(file_bytes: &[u8], registry: &Registry) -> Verdict {
    match decode_rgb(file_bytes) {
        Ok(rgb) => verify(&ImageInput::Pixels(rgb), registry),
        Err(e) => {
            debug!(error = %e, "uploaded file could not be decoded");
            Verdict::unfingerprintable()
        }
    }
}
