//! 指纹库持久化
//!
//! 主文件: bincode 编码的二进制快照，`load` 只读它，往返必须无损。
//! 副文件: 人类可读的 JSON 摘要 (完整指纹列表 + 总数 + 前 5 条元数据样本)，
//! 仅用于排查，永远不会被读回。

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::fingerprint::Fingerprint;
use crate::provenance::{Partition, ProvenanceRecord};
use crate::registry::Registry;

const ARTIFACT_MAGIC: [u8; 4] = *b"VRTY";
const ARTIFACT_VERSION: u32 = 1;
/// 反序列化时允许读取的最大字节数，防止损坏文件里的长度字段导致巨量分配
const ARTIFACT_BYTE_LIMIT: u64 = 1 << 30;
/// 摘要里最多放几条元数据样本
pub const METADATA_SAMPLE_SIZE: usize = 5;

/// 二进制快照的磁盘格式
#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    magic: [u8; 4],
    format_version: u32,
    fingerprints: Vec<Fingerprint>,
    provenance: Vec<(Fingerprint, StoredRecord)>,
}

/// bincode 不支持自描述类型，标注数据以 JSON 文本的形式落盘
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    partition: Partition,
    index: u64,
    ground_truth: String,
    source: String,
}

#[derive(Serialize)]
struct RegistrySummary<'a> {
    legitimate_hashes: Vec<&'a Fingerprint>,
    total_hashes: usize,
    metadata_sample: BTreeMap<&'a Fingerprint, &'a ProvenanceRecord>,
    generated_at: String,
}

fn artifact_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(ARTIFACT_BYTE_LIMIT)
}

/// 由主文件路径推导摘要文件路径: `hashes.bin` → `hashes.json`
pub fn summary_path(primary: &Path) -> PathBuf {
    match primary.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let stem = primary
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            primary.with_file_name(format!("{stem}.summary.json"))
        }
        _ => primary.with_extension("json"),
    }
}

/// 保存指纹库 (主文件 + 摘要)
pub fn save(registry: &Registry, primary_path: &Path) -> Result<()> {
    let mut fingerprints: Vec<Fingerprint> = registry.fingerprints().cloned().collect();
    fingerprints.sort();

    let mut provenance = Vec::with_capacity(registry.metadata_len());
    for (fp, rec) in registry.provenance() {
        let ground_truth = serde_json::to_string(&rec.ground_truth)
            .map_err(|e| RegistryError::Serialize(e.to_string()))?;
        provenance.push((
            fp.clone(),
            StoredRecord {
                partition: rec.partition,
                index: rec.index,
                ground_truth,
                source: rec.source.clone(),
            },
        ));
    }

    let envelope = ArtifactEnvelope {
        magic: ARTIFACT_MAGIC,
        format_version: ARTIFACT_VERSION,
        fingerprints,
        provenance,
    };
    let payload = artifact_options()
        .serialize(&envelope)
        .map_err(|e| RegistryError::Serialize(e.to_string()))?;

    write_atomic(primary_path, &payload)?;
    info!(
        path = %primary_path.display(),
        fingerprints = registry.size(),
        "💾 指纹库已保存"
    );

    let summary = RegistrySummary {
        legitimate_hashes: registry.sorted_fingerprints(),
        total_hashes: registry.size(),
        metadata_sample: registry.provenance().take(METADATA_SAMPLE_SIZE).collect(),
        generated_at: chrono::Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_vec_pretty(&summary).map_err(|e| RegistryError::Serialize(e.to_string()))?;
    let json_path = summary_path(primary_path);
    write_atomic(&json_path, &json)?;
    info!(path = %json_path.display(), "📝 指纹摘要已保存");

    Ok(())
}

/// 从主文件加载指纹库
///
/// - 文件不存在: `NotFound`，调用方可以转而重新入库。
/// - 文件存在但解不开: `CorruptArtifact`，不能当作空库处理。
pub fn load(primary_path: &Path) -> Result<Registry> {
    let bytes = match fs::read(primary_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RegistryError::NotFound(primary_path.to_path_buf()));
        }
        // 路径存在但不是文件，同样属于"解不开"
        Err(_) if primary_path.is_dir() => {
            return Err(RegistryError::corrupt(primary_path, "artifact path is a directory"));
        }
        Err(e) => return Err(RegistryError::io(primary_path, e)),
    };

    let envelope: ArtifactEnvelope = artifact_options()
        .deserialize(&bytes)
        .map_err(|e| RegistryError::corrupt(primary_path, e))?;

    if envelope.magic != ARTIFACT_MAGIC {
        return Err(RegistryError::corrupt(primary_path, "bad magic header"));
    }
    if envelope.format_version != ARTIFACT_VERSION {
        return Err(RegistryError::corrupt(
            primary_path,
            format!("unsupported format version {}", envelope.format_version),
        ));
    }

    let mut fingerprints = HashSet::with_capacity(envelope.fingerprints.len());
    for fp in envelope.fingerprints {
        fingerprints.insert(checked(fp, primary_path)?);
    }

    let mut provenance = BTreeMap::new();
    for (fp, stored) in envelope.provenance {
        let fp = checked(fp, primary_path)?;
        let ground_truth = serde_json::from_str(&stored.ground_truth)
            .map_err(|e| RegistryError::corrupt(primary_path, format!("bad annotation for {fp}: {e}")))?;
        provenance.insert(
            fp,
            ProvenanceRecord {
                partition: stored.partition,
                index: stored.index,
                ground_truth,
                source: stored.source,
            },
        );
    }

    let registry = Registry::from_parts(fingerprints, provenance).map_err(|orphan| {
        RegistryError::corrupt(primary_path, format!("metadata for unregistered fingerprint {orphan}"))
    })?;

    info!(
        path = %primary_path.display(),
        fingerprints = registry.size(),
        "📚 指纹库加载完成"
    );
    Ok(registry)
}

/// 反序列化绕过了 `FromStr` 的校验，这里补上
fn checked(fp: Fingerprint, path: &Path) -> Result<Fingerprint> {
    match fp.as_str().parse::<Fingerprint>() {
        Ok(parsed) if parsed == fp => Ok(fp),
        _ => Err(RegistryError::corrupt(path, format!("malformed fingerprint {:?}", fp.as_str()))),
    }
}

/// 先写同目录下唯一命名的临时文件再 rename，中途崩溃不会留下半截文件；
/// 失败时临时文件随 `NamedTempFile` 一起删除
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| RegistryError::io(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".registry-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| RegistryError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| RegistryError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| RegistryError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = data.len(), "artifact written");
    Ok(())
}
