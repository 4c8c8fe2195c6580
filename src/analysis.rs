use serde::Serialize;
use std::collections::BTreeMap;

use crate::registry::Registry;

const SAMPLE_HASHES: usize = 10;

/// 指纹库分布报告
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub total_hashes: usize,
    pub metadata_entries: usize,
    pub split_distribution: BTreeMap<String, usize>,
    pub source_distribution: BTreeMap<String, usize>,
    pub sample_hashes: Vec<String>,
    pub hash_length: usize,
    pub uniform_hash_length: bool,
}

pub fn analyze(registry: &Registry) -> AnalysisReport {
    let mut split_distribution = BTreeMap::new();
    let mut source_distribution = BTreeMap::new();
    for (_, rec) in registry.provenance() {
        *split_distribution.entry(rec.partition.to_string()).or_insert(0) += 1;
        *source_distribution.entry(rec.source.clone()).or_insert(0) += 1;
    }

    let sorted = registry.sorted_fingerprints();
    let hash_length = sorted.first().map(|fp| fp.as_str().len()).unwrap_or(0);

    AnalysisReport {
        total_hashes: registry.size(),
        metadata_entries: registry.metadata_len(),
        split_distribution,
        source_distribution,
        sample_hashes: sorted.iter().take(SAMPLE_HASHES).map(|fp| fp.to_string()).collect(),
        hash_length,
        uniform_hash_length: sorted.iter().all(|fp| fp.as_str().len() == hash_length),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{fingerprint, FINGERPRINT_HEX_LEN};
    use crate::provenance::{Partition, ProvenanceRecord};

    #[test]
    fn counts_by_split_and_source() {
        let mut reg = Registry::new();
        for i in 0..12u64 {
            let part = match i % 3 {
                0 => Partition::Train,
                1 => Partition::Validation,
                _ => Partition::Test,
            };
            let source = if i < 10 { "donut-data-v1" } else { "manual" };
            reg.add(
                fingerprint(&i.to_le_bytes()).unwrap(),
                ProvenanceRecord::new(part, i, None, source),
            );
        }

        let report = analyze(&reg);
        assert_eq!(report.total_hashes, 12);
        assert_eq!(report.split_distribution["train"], 4);
        assert_eq!(report.source_distribution["manual"], 2);
        assert_eq!(report.sample_hashes.len(), SAMPLE_HASHES);
        assert_eq!(report.hash_length, FINGERPRINT_HEX_LEN);
        assert!(report.uniform_hash_length);
    }

    #[test]
    fn empty_registry() {
        let report = analyze(&Registry::new());
        assert_eq!(report.total_hashes, 0);
        assert_eq!(report.hash_length, 0);
        assert!(report.sample_hashes.is_empty());
    }
}
