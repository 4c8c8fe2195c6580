//! 真票指纹库: 以精确内容匹配判断发票图片是否来自已知的真实语料。
//!
//! 候选图片 → 规范化编码 → SHA-256 指纹 → 在已知指纹库里查找 → 判决。

pub mod analysis;
pub mod api;
pub mod canonical;
pub mod config;
pub mod corpus_dir;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod persistence;
pub mod provenance;
pub mod registry;
pub mod service;
pub mod verifier;

pub use canonical::ImageInput;
pub use error::{EncodingError, RegistryError};
pub use fingerprint::Fingerprint;
pub use provenance::{Partition, ProvenanceRecord};
pub use registry::Registry;
pub use service::{RegistryHandle, RegistryStats};
pub use verifier::{Verdict, VerdictReason};
