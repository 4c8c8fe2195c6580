//! 本地目录形式的语料库
//!
//! ```text
//! <root>/
//!   train/       0001.png  0001.json  0002.jpg ...
//!   validation/  ...
//!   test/        ...
//! ```
//!
//! 同名 `.json` 是可选的标注文件。同一分区内按文件名排序确定下标。

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::canonical::{decode_rgb, ImageInput};
use crate::ingest::{Corpus, CorpusError, CorpusItem, DEFAULT_PARTITIONS};

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff"];

#[derive(Debug, Default, Clone)]
struct Entry {
    image: Option<PathBuf>,
    annotation: Option<PathBuf>,
}

#[derive(Debug)]
pub struct DirectoryCorpus {
    source: String,
    partitions: Vec<(String, Vec<Entry>)>,
}

impl DirectoryCorpus {
    /// 扫描目录。根目录不存在或不可读时失败。
    pub fn open(root: impl AsRef<Path>, source: impl Into<String>) -> Result<Self, CorpusError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CorpusError(format!("corpus directory {} does not exist", root.display())));
        }

        // 约定分区在前，其他子目录按名字排在后面
        let mut names: Vec<String> = DEFAULT_PARTITIONS.iter().map(|s| s.to_string()).collect();
        let mut extra = Vec::new();
        for entry in read_dir(root)? {
            if entry.is_dir() {
                if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                    if !names.iter().any(|n| n == name) {
                        extra.push(name.to_string());
                    }
                }
            }
        }
        extra.sort();
        names.extend(extra);

        let mut partitions = Vec::with_capacity(names.len());
        for name in names {
            let dir = root.join(&name);
            let entries = if dir.is_dir() { scan_partition(&dir)? } else { Vec::new() };
            debug!(partition = %name, items = entries.len(), "scanned corpus partition");
            partitions.push((name, entries));
        }

        Ok(Self {
            source: source.into(),
            partitions,
        })
    }

    fn entries(&self, partition: &str) -> Result<&[Entry], CorpusError> {
        self.partitions
            .iter()
            .find(|(name, _)| name == partition)
            .map(|(_, e)| e.as_slice())
            .ok_or_else(|| CorpusError(format!("no partition named {partition:?}")))
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let rd = fs::read_dir(dir).map_err(|e| CorpusError(format!("{}: {e}", dir.display())))?;
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.map_err(|e| CorpusError(format!("{}: {e}", dir.display())))?;
        out.push(entry.path());
    }
    Ok(out)
}

/// 每张图片单独成为一条样本 (按完整文件名排序)，同名 `.json` 标注挂到所有同 stem 的图片上。
/// 只有标注没有图片的 stem 也算一条样本 (入库时作为缺图跳过)。
fn scan_partition(dir: &Path) -> Result<Vec<Entry>, CorpusError> {
    let mut images: Vec<(String, String, PathBuf)> = Vec::new();
    let mut annotations: BTreeMap<String, (String, PathBuf)> = BTreeMap::new();
    for path in read_dir(dir)? {
        if !path.is_file() {
            continue;
        }
        let (Some(name), Some(stem), Some(ext)) = (
            path.file_name().and_then(|s| s.to_str()).map(str::to_string),
            path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
            path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase),
        ) else {
            continue;
        };

        if ext == "json" {
            annotations.insert(stem, (name, path));
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            images.push((name, stem, path));
        }
    }

    let image_stems: BTreeSet<String> = images.iter().map(|(_, stem, _)| stem.clone()).collect();
    let mut by_name: BTreeMap<String, Entry> = BTreeMap::new();
    for (name, stem, path) in images {
        let annotation = annotations.get(&stem).map(|(_, p)| p.clone());
        by_name.insert(
            name,
            Entry {
                image: Some(path),
                annotation,
            },
        );
    }
    for (stem, (name, path)) in annotations {
        if !image_stems.contains(&stem) {
            debug!(stem = %stem, "annotation without image");
            by_name.insert(
                name,
                Entry {
                    image: None,
                    annotation: Some(path),
                },
            );
        }
    }
    Ok(by_name.into_values().collect())
}

/// 标注是可选的：读不出或解析失败只告警，图片照常入库
fn read_annotation(path: &Path) -> Option<serde_json::Value> {
    let parsed = fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_slice(&raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable annotation");
            None
        }
    }
}

impl Corpus for DirectoryCorpus {
    fn source_id(&self) -> &str {
        &self.source
    }

    fn partitions(&self) -> Result<Vec<String>, CorpusError> {
        Ok(self.partitions.iter().map(|(name, _)| name.clone()).collect())
    }

    fn partition_len(&self, partition: &str) -> Result<usize, CorpusError> {
        Ok(self.entries(partition)?.len())
    }

    fn item(&self, partition: &str, index: usize) -> Result<CorpusItem, CorpusError> {
        let entry = self
            .entries(partition)?
            .get(index)
            .ok_or_else(|| CorpusError(format!("{partition}[{index}] out of range")))?;

        let ground_truth = entry.annotation.as_deref().and_then(read_annotation);

        let image = match &entry.image {
            Some(path) => {
                let raw = fs::read(path).map_err(|e| CorpusError(format!("{}: {e}", path.display())))?;
                let rgb = decode_rgb(&raw).map_err(|e| CorpusError(format!("{}: {e}", path.display())))?;
                Some(ImageInput::Pixels(rgb))
            }
            None => None,
        };

        Ok(CorpusItem { image, ground_truth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::build_registry;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_png(path: &Path, seed: u8) {
        let img = RgbImage::from_fn(8, 8, |x, y| Rgb([seed, x as u8, y as u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        fs::write(path, buf).unwrap();
    }

    #[test]
    fn missing_root_is_an_access_error() {
        let dir = tempdir().unwrap();
        assert!(DirectoryCorpus::open(dir.path().join("absent"), "x").is_err());
    }

    #[test]
    fn scans_partitions_and_sidecars() {
        let dir = tempdir().unwrap();
        let train = dir.path().join("train");
        fs::create_dir_all(&train).unwrap();
        write_png(&train.join("b.png"), 2);
        write_png(&train.join("a.png"), 1);
        fs::write(train.join("a.json"), r#"{"invoice_no": "A-1"}"#).unwrap();
        fs::write(train.join("c.json"), r#"{"invoice_no": "C-3"}"#).unwrap();
        fs::write(train.join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(dir.path().join("holdout")).unwrap();
        write_png(&dir.path().join("holdout").join("z.png"), 9);

        let corpus = DirectoryCorpus::open(dir.path(), "local").unwrap();
        assert_eq!(
            corpus.partitions().unwrap(),
            vec!["train", "validation", "test", "holdout"]
        );
        assert_eq!(corpus.partition_len("train").unwrap(), 3);
        assert_eq!(corpus.partition_len("validation").unwrap(), 0);

        let first = corpus.item("train", 0).unwrap();
        assert!(first.image.is_some());
        assert_eq!(first.ground_truth.unwrap()["invoice_no"], "A-1");
        assert!(corpus.item("train", 2).unwrap().image.is_none());

        let (registry, report) = build_registry(&corpus).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(registry.size(), 3);
    }

    #[test]
    fn images_sharing_a_stem_are_separate_items() {
        let dir = tempdir().unwrap();
        let train = dir.path().join("train");
        fs::create_dir_all(&train).unwrap();
        write_png(&train.join("inv.png"), 1);
        let jpg = RgbImage::from_fn(8, 8, |_, _| Rgb([200, 10, 10]));
        DynamicImage::ImageRgb8(jpg).save(train.join("inv.jpg")).unwrap();
        fs::write(train.join("inv.json"), r#"{"invoice_no": "INV"}"#).unwrap();

        let corpus = DirectoryCorpus::open(dir.path(), "local").unwrap();
        assert_eq!(corpus.partition_len("train").unwrap(), 2);
        for idx in 0..2 {
            let item = corpus.item("train", idx).unwrap();
            assert!(item.image.is_some());
            assert_eq!(item.ground_truth.unwrap()["invoice_no"], "INV");
        }

        let (registry, report) = build_registry(&corpus).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(registry.size(), 2);
    }

    #[test]
    fn malformed_annotation_does_not_drop_the_image() {
        let dir = tempdir().unwrap();
        let train = dir.path().join("train");
        fs::create_dir_all(&train).unwrap();
        write_png(&train.join("a.png"), 4);
        fs::write(train.join("a.json"), "{not json").unwrap();

        let corpus = DirectoryCorpus::open(dir.path(), "local").unwrap();
        let item = corpus.item("train", 0).unwrap();
        assert!(item.image.is_some());
        assert!(item.ground_truth.is_none());

        let (registry, report) = build_registry(&corpus).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 0);
        let meta = registry.provenance().next().unwrap().1;
        assert_eq!(meta.ground_truth, serde_json::json!({}));
    }
}
