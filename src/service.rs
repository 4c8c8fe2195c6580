use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::canonical::ImageInput;
use crate::error::{RegistryError, Result};
use crate::ingest::{self, Corpus};
use crate::persistence;
use crate::registry::Registry;
use crate::verifier::{self, Verdict};

const STATS_SAMPLE_SIZE: usize = 5;

/// 只读统计信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_fingerprints: usize,
    pub artifact_path: String,
    pub artifact_present: bool,
    pub sample_fingerprints: Vec<String>,
}

/// 进程内共享的指纹库句柄
///
/// 查询先拿一份 `Arc` 快照再释放锁；重载时在旁边建好完整的新库，
/// 最后一次性替换指针，进行中的查询永远看不到半成品。
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<Registry>>,
    artifact_path: PathBuf,
}

impl RegistryHandle {
    pub fn new(registry: Registry, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
            artifact_path: artifact_path.into(),
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.current.read())
    }

    /// 整体替换当前指纹库，返回旧的那份
    pub fn publish(&self, registry: Registry) -> Arc<Registry> {
        let next = Arc::new(registry);
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// 从持久化文件重新加载并发布。加载失败时当前库保持不变。
    pub fn reload(&self) -> Result<RegistryStats> {
        let fresh = persistence::load(&self.artifact_path)?;
        let size = fresh.size();
        self.publish(fresh);
        info!(fingerprints = size, "🔄 指纹库已重新加载");
        Ok(self.get_stats())
    }

    pub fn verify(&self, candidate: &ImageInput) -> Verdict {
        verifier::verify(candidate, &self.snapshot())
    }

    pub fn verify_encoded(&self, file_bytes: &[u8]) -> Verdict {
        verifier::verify_encoded(file_bytes, &self.snapshot())
    }

    pub fn get_stats(&self) -> RegistryStats {
        let registry = self.snapshot();
        RegistryStats {
            total_fingerprints: registry.size(),
            artifact_path: self.artifact_path.display().to_string(),
            artifact_present: self.artifact_path.exists(),
            sample_fingerprints: registry
                .sorted_fingerprints()
                .into_iter()
                .take(STATS_SAMPLE_SIZE)
                .map(|fp| fp.to_string())
                .collect(),
        }
    }
}

/// 启动时的 "先加载，不存在再入库"
///
/// 只有在文件不存在时才会调用 `open_corpus`；文件损坏直接报错，
/// 不会悄悄用重建的库盖掉它。
pub fn initialize<C, F>(artifact_path: &Path, open_corpus: F) -> Result<Registry>
where
    C: Corpus,
    F: FnOnce() -> Result<C>,
{
    match persistence::load(artifact_path) {
        Ok(registry) => Ok(registry),
        Err(RegistryError::NotFound(path)) => {
            warn!(path = %path.display(), "指纹库文件不存在，开始从语料库构建");
            let corpus = open_corpus()?;
            let (registry, report) = ingest::ingest(&corpus, artifact_path)?;
            info!(
                processed = report.processed,
                skipped = report.skipped,
                unique = report.unique_fingerprints,
                "registry built from corpus"
            );
            Ok(registry)
        }
        Err(e) => Err(e),
    }
}
