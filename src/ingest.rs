use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::canonical::ImageInput;
use crate::error::{RegistryError, Result};
use crate::fingerprint::{fingerprint_image, Fingerprint};
use crate::persistence;
use crate::provenance::{Partition, ProvenanceRecord};
use crate::registry::Registry;

/// 约定的分区顺序
pub const DEFAULT_PARTITIONS: [&str; 3] = ["train", "validation", "test"];

/// 每处理多少条打一次进度日志
const PROGRESS_EVERY: usize = 50;
/// 一批取多少条交给 rayon 并行算指纹
const BATCH_SIZE: usize = 64;

// ==========================================
// 1. 语料库接口 (Corpus Interface)
// ==========================================

/// 语料库里的一条样本。图片可能缺失，标注可选。
#[derive(Debug, Clone)]
pub struct CorpusItem {
    pub image: Option<ImageInput>,
    pub ground_truth: Option<serde_json::Value>,
}

impl CorpusItem {
    pub fn new(image: impl Into<ImageInput>) -> Self {
        Self {
            image: Some(image.into()),
            ground_truth: None,
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: serde_json::Value) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }

    pub fn without_image(ground_truth: Option<serde_json::Value>) -> Self {
        Self {
            image: None,
            ground_truth,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CorpusError(pub String);

/// 外部语料库需要适配成的形状。核心只依赖这个 trait，不关心数据从哪来。
pub trait Corpus {
    /// 语料库标识，写进每条来源记录的 `source`
    fn source_id(&self) -> &str;

    /// 分区名，按入库顺序排列
    fn partitions(&self) -> std::result::Result<Vec<String>, CorpusError>;

    fn partition_len(&self, partition: &str) -> std::result::Result<usize, CorpusError>;

    fn item(&self, partition: &str, index: usize) -> std::result::Result<CorpusItem, CorpusError>;
}

/// 完全在内存里的语料库
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    source: String,
    partitions: Vec<(String, Vec<CorpusItem>)>,
}

impl MemoryCorpus {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            partitions: Vec::new(),
        }
    }

    pub fn with_partition(mut self, name: impl Into<String>, items: Vec<CorpusItem>) -> Self {
        self.partitions.push((name.into(), items));
        self
    }

    fn find(&self, partition: &str) -> std::result::Result<&[CorpusItem], CorpusError> {
        self.partitions
            .iter()
            .find(|(name, _)| name == partition)
            .map(|(_, items)| items.as_slice())
            .ok_or_else(|| CorpusError(format!("no partition named {partition:?}")))
    }
}

impl Corpus for MemoryCorpus {
    fn source_id(&self) -> &str {
        &self.source
    }

    fn partitions(&self) -> std::result::Result<Vec<String>, CorpusError> {
        Ok(self.partitions.iter().map(|(name, _)| name.clone()).collect())
    }

    fn partition_len(&self, partition: &str) -> std::result::Result<usize, CorpusError> {
        Ok(self.find(partition)?.len())
    }

    fn item(&self, partition: &str, index: usize) -> std::result::Result<CorpusItem, CorpusError> {
        self.find(partition)?
            .get(index)
            .cloned()
            .ok_or_else(|| CorpusError(format!("{partition}[{index}] out of range")))
    }
}

// ==========================================
// 2. 单条结果 (Per-item Outcome)
// ==========================================

#[derive(Debug, Clone)]
pub struct FingerprintOutcome {
    pub fingerprint: Fingerprint,
    pub ground_truth: Option<serde_json::Value>,
}

/// 单条样本被跳过的原因。只计数，不向上抛。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("item has no image")]
    MissingImage,

    #[error("item could not be read: {0}")]
    ItemUnavailable(String),

    #[error("image could not be fingerprinted: {0}")]
    Unfingerprintable(String),
}

pub fn fingerprint_item(
    item: std::result::Result<CorpusItem, CorpusError>,
) -> std::result::Result<FingerprintOutcome, SkipReason> {
    let item = item.map_err(|e| SkipReason::ItemUnavailable(e.0))?;
    let image = item.image.ok_or(SkipReason::MissingImage)?;
    let fingerprint = fingerprint_image(&image)
        .map_err(|e| SkipReason::Unfingerprintable(e.to_string()))?
        .ok_or_else(|| SkipReason::Unfingerprintable("empty canonical encoding".to_string()))?;

    Ok(FingerprintOutcome {
        fingerprint,
        ground_truth: item.ground_truth,
    })
}

// ==========================================
// 3. 入库报告 (Report)
// ==========================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct PartitionReport {
    pub items: usize,
    pub processed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub processed: usize,
    pub skipped: usize,
    pub unique_fingerprints: usize,
    /// 重复指纹导致来源记录被覆盖的次数
    pub overwritten: usize,
    pub partitions: BTreeMap<String, PartitionReport>,
}

// ==========================================
// 4. 入库流程 (Pipeline)
// ==========================================

/// 遍历语料库构建指纹库并保存到 `artifact_path`。
///
/// 单条样本出错只会被跳过；只有语料库本身不可访问才会失败，此时不写任何文件。
pub fn ingest<C: Corpus + ?Sized>(corpus: &C, artifact_path: &Path) -> Result<(Registry, IngestReport)> {
    let (registry, report) = build_registry(corpus)?;
    persistence::save(&registry, artifact_path)?;
    Ok((registry, report))
}

/// 与 [`ingest`] 相同，但不落盘
pub fn build_registry<C: Corpus + ?Sized>(corpus: &C) -> Result<(Registry, IngestReport)> {
    let source = corpus.source_id().to_string();
    let partitions = corpus
        .partitions()
        .map_err(|e| RegistryError::CorpusAccess(e.0))?;

    // 先拿到全部分区长度，任何一个分区打不开都在动手之前失败
    let mut sizes = Vec::with_capacity(partitions.len());
    for name in &partitions {
        let len = corpus
            .partition_len(name)
            .map_err(|e| RegistryError::CorpusAccess(format!("{name}: {}", e.0)))?;
        info!(partition = %name, items = len, "partition opened");
        sizes.push((name.clone(), len));
    }

    let mut registry = Registry::new();
    let mut report = IngestReport {
        source: source.clone(),
        ..Default::default()
    };

    for (name, len) in sizes {
        info!("🧾 正在处理分区 {name} ...");
        let partition = Partition::from_name(&name);
        let mut part_report = PartitionReport {
            items: len,
            ..Default::default()
        };

        let mut start = 0;
        while start < len {
            let end = (start + BATCH_SIZE).min(len);
            let batch: Vec<_> = (start..end).map(|idx| (idx, corpus.item(&name, idx))).collect();

            // 编码 + 哈希是纯函数，可以并行；插入必须按下标顺序串行
            let outcomes: Vec<_> = batch
                .into_par_iter()
                .map(|(idx, item)| (idx, fingerprint_item(item)))
                .collect();

            for (idx, outcome) in outcomes {
                match outcome {
                    Ok(out) => {
                        let record = ProvenanceRecord::new(partition, idx as u64, out.ground_truth, source.as_str());
                        if let Some(previous) = registry.add(out.fingerprint.clone(), record) {
                            report.overwritten += 1;
                            warn!(
                                fingerprint = %out.fingerprint,
                                previous = %format!("{}[{}]", previous.partition, previous.index),
                                current = %format!("{}[{}]", partition, idx),
                                "duplicate fingerprint, provenance overwritten"
                            );
                        }
                        part_report.processed += 1;
                        report.processed += 1;
                        if report.processed % PROGRESS_EVERY == 0 {
                            info!("已处理 {} 张发票...", report.processed);
                        }
                    }
                    Err(reason) => {
                        warn!(partition = %name, index = idx, %reason, "skipping item");
                        part_report.skipped += 1;
                        report.skipped += 1;
                    }
                }
            }
            start = end;
        }

        report.partitions.insert(name, part_report);
    }

    report.unique_fingerprints = registry.size();
    info!(
        processed = report.processed,
        skipped = report.skipped,
        unique = report.unique_fingerprints,
        overwritten = report.overwritten,
        "✅ 入库完成"
    );
    Ok((registry, report))
}
