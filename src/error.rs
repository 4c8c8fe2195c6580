use std::path::PathBuf;
use thiserror::Error;

/// 规范化编码失败
///
/// 候选图片无法被重新序列化时返回。验证器会把它折算成
/// "unfingerprintable" 判决，而不是向调用方抛错。
#[derive(Debug, Error)]
pub enum EncodingError {
    /// 图片宽或高为 0，没有可编码的像素
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// 原始字节无法解码为图片
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// PNG 编码器报错
    #[error("failed to encode canonical PNG: {0}")]
    Encode(String),
}

/// 指纹库 (Registry) 相关的错误分类
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// 持久化文件不存在。可恢复：调用方可以转而触发数据集入库。
    #[error("registry artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    /// 文件存在但无法反序列化成预期结构。不能当作"不存在"静默处理。
    #[error("registry artifact {} is corrupt: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    /// 外部语料库不可访问，入库中止，不落盘任何东西
    #[error("corpus unavailable: {0}")]
    CorpusAccess(String),

    #[error("registry I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize registry: {0}")]
    Serialize(String),
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RegistryError::CorruptArtifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// 是否属于"文件不存在"这种可以回退到重新入库的情况
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
