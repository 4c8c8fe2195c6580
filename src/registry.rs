use std::collections::{BTreeMap, HashSet};

use crate::fingerprint::Fingerprint;
use crate::provenance::ProvenanceRecord;

/// 指纹库 (Registry)
///
/// **职责**: 保存所有已知真票的指纹，以及指纹 → 来源记录的映射。
///
/// - `fingerprints` 用 `HashSet`，成员判断期望 O(1)。
/// - `provenance` 用 `BTreeMap`，遍历顺序按指纹排序，这样摘要文件里的
///   样本每次都一样。
///
/// 不变量: `provenance` 的键一定在 `fingerprints` 里，反之不要求
/// (例如只登记了指纹而没有元数据)。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    fingerprints: HashSet<Fingerprint>,
    provenance: BTreeMap<Fingerprint, ProvenanceRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.fingerprints.contains(fp)
    }

    pub fn lookup_metadata(&self, fp: &Fingerprint) -> Option<&ProvenanceRecord> {
        self.provenance.get(fp)
    }

    /// 登记指纹及其来源。
    ///
    /// 指纹已存在时来源记录被覆盖 (last write wins)，返回被替换掉的旧记录。
    pub fn add(&mut self, fp: Fingerprint, record: ProvenanceRecord) -> Option<ProvenanceRecord> {
        self.fingerprints.insert(fp.clone());
        self.provenance.insert(fp, record)
    }

    /// 只登记指纹，不带元数据。已有的来源记录保持不变。
    pub fn insert_fingerprint(&mut self, fp: Fingerprint) -> bool {
        self.fingerprints.insert(fp)
    }

    pub fn size(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.fingerprints.iter()
    }

    /// 全部指纹，排好序
    pub fn sorted_fingerprints(&self) -> Vec<&Fingerprint> {
        let mut all: Vec<&Fingerprint> = self.fingerprints.iter().collect();
        all.sort();
        all
    }

    pub fn provenance(&self) -> impl Iterator<Item = (&Fingerprint, &ProvenanceRecord)> {
        self.provenance.iter()
    }

    pub fn metadata_len(&self) -> usize {
        self.provenance.len()
    }

    /// 从反序列化出来的原始部件组装。
    ///
    /// 违反"元数据键 ⊆ 指纹集合"时返回第一个越界的键。
    pub(crate) fn from_parts(
        fingerprints: HashSet<Fingerprint>,
        provenance: BTreeMap<Fingerprint, ProvenanceRecord>,
    ) -> Result<Self, Fingerprint> {
        if let Some(orphan) = provenance.keys().find(|fp| !fingerprints.contains(*fp)) {
            return Err(orphan.clone());
        }
        Ok(Self {
            fingerprints,
            provenance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::provenance::Partition;

    fn record(partition: Partition, index: u64) -> ProvenanceRecord {
        ProvenanceRecord::new(partition, index, None, "corpus-v1")
    }

    #[test]
    fn add_then_lookup() {
        let mut reg = Registry::new();
        let fp = fingerprint(b"invoice-1").unwrap();
        assert!(!reg.contains(&fp));

        let meta = record(Partition::Test, 4);
        assert!(reg.add(fp.clone(), meta.clone()).is_none());
        assert!(reg.contains(&fp));
        assert_eq!(reg.lookup_metadata(&fp), Some(&meta));
        assert_eq!(reg.size(), 1);
    }

    #[test]
    fn duplicate_add_keeps_last_record() {
        let mut reg = Registry::new();
        let fp = fingerprint(b"same").unwrap();
        reg.add(fp.clone(), record(Partition::Train, 1));
        let old = reg.add(fp.clone(), record(Partition::Test, 9));

        assert_eq!(old.map(|r| r.partition), Some(Partition::Train));
        assert_eq!(reg.size(), 1);
        assert_eq!(reg.lookup_metadata(&fp).unwrap().partition, Partition::Test);
    }

    #[test]
    fn bare_fingerprint_has_no_metadata() {
        let mut reg = Registry::new();
        let fp = fingerprint(b"bare").unwrap();
        assert!(reg.insert_fingerprint(fp.clone()));
        assert!(reg.contains(&fp));
        assert!(reg.lookup_metadata(&fp).is_none());
        assert_eq!(reg.metadata_len(), 0);
    }

    #[test]
    fn from_parts_rejects_orphan_metadata() {
        let fp = fingerprint(b"orphan").unwrap();
        let mut provenance = BTreeMap::new();
        provenance.insert(fp.clone(), record(Partition::Train, 0));
        assert_eq!(Registry::from_parts(HashSet::new(), provenance), Err(fp));
    }
}
