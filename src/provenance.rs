use serde::{Deserialize, Serialize};
use std::fmt;

/// 数据集分区。所有分区都视为同等可信。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Validation,
    Test,
    Unknown,
}

impl Partition {
    /// 按约定名称解析，其他名字一律归为 `Unknown`
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "train" => Partition::Train,
            "validation" | "valid" | "val" => Partition::Validation,
            "test" => Partition::Test,
            _ => Partition::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Validation => "validation",
            Partition::Test => "test",
            Partition::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 来源记录 (Provenance Record)
///
/// 每个登记在库的指纹最多对应一条。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// 来自哪个分区。JSON 字段名是 `split` (沿用数据集的叫法)。
    #[serde(rename = "split")]
    pub partition: Partition,

    /// 在分区内的下标
    pub index: u64,

    /// 标注数据 (结构不透明)。没有标注时为空对象 `{}`。
    pub ground_truth: serde_json::Value,

    /// 语料库标识，例如 "donut-data-v1"
    pub source: String,
}

impl ProvenanceRecord {
    pub fn new(
        partition: Partition,
        index: u64,
        ground_truth: Option<serde_json::Value>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            partition,
            index,
            ground_truth: ground_truth.unwrap_or_else(empty_annotation),
            source: source.into(),
        }
    }
}

pub(crate) fn empty_annotation() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_names() {
        assert_eq!(Partition::from_name("train"), Partition::Train);
        assert_eq!(Partition::from_name("VALIDATION"), Partition::Validation);
        assert_eq!(Partition::from_name("holdout"), Partition::Unknown);
        assert_eq!(Partition::Test.to_string(), "test");
    }

    #[test]
    fn missing_annotation_becomes_empty_object() {
        let rec = ProvenanceRecord::new(Partition::Train, 3, None, "corpus-v1");
        assert_eq!(rec.ground_truth, serde_json::json!({}));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["split"], "train");
    }
}
