//! Spatial sources: lazy, restartable record streams scoped to a bounding box.
//!
//! A source performs the spatial filter itself; callers never re-check
//! geometry. Every `query` opens an independent stream with no state shared
//! between calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use foundation::bounds::BoundingBox;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::error::SourceError;
use crate::feature::FeatureRecord;
use crate::geometry::geometry_bounds;

pub type RecordStream = BoxStream<'static, Result<FeatureRecord, SourceError>>;

pub trait SpatialSource: Send + Sync {
    /// Open a fresh stream of the records at `locator` intersecting `bbox`.
    fn query(&self, locator: &str, bbox: BoundingBox) -> RecordStream;
}

fn intersects(record: &FeatureRecord, bbox: &BoundingBox) -> bool {
    geometry_bounds(&record.geometry).is_some_and(|b| b.intersects(bbox))
}

/// Newline-delimited GeoJSON features (RFC 8142 text sequences are accepted
/// too) read lazily from files under a root directory.
#[derive(Debug, Clone)]
pub struct GeoJsonSeqSource {
    root: PathBuf,
}

impl GeoJsonSeqSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

struct SeqCursor {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    path: PathBuf,
}

impl SeqCursor {
    async fn next_match(&mut self, bbox: &BoundingBox) -> Option<Result<FeatureRecord, SourceError>> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    let msg = format!("read {}:{}", self.path.display(), self.line_no + 1);
                    return Some(Err(SourceError::with_source(msg, err)));
                }
            };
            self.line_no += 1;

            let text = line.trim_start_matches('\u{1e}').trim();
            if text.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(text) {
                Ok(v) => v,
                Err(err) => {
                    let msg = format!("parse {}:{}", self.path.display(), self.line_no);
                    return Some(Err(SourceError::with_source(msg, err)));
                }
            };
            let Some(record) = FeatureRecord::from_geojson(value) else {
                let msg = format!("{}:{} is not a feature object", self.path.display(), self.line_no);
                return Some(Err(SourceError::new(msg)));
            };
            if intersects(&record, bbox) {
                return Some(Ok(record));
            }
        }
    }
}

impl SpatialSource for GeoJsonSeqSource {
    fn query(&self, locator: &str, bbox: BoundingBox) -> RecordStream {
        let path = self.root.join(locator);
        let opened = async move {
            match File::open(&path).await {
                Ok(file) => Ok(SeqCursor {
                    lines: BufReader::new(file).lines(),
                    line_no: 0,
                    path,
                }),
                Err(err) => Err(SourceError::with_source(
                    format!("open {}", path.display()),
                    err,
                )),
            }
        };

        stream::once(opened)
            .flat_map(move |opened| match opened {
                Ok(cursor) => stream::unfold(Some(cursor), move |state| async move {
                    let mut cursor = state?;
                    match cursor.next_match(&bbox).await? {
                        Ok(record) => Some((Ok(record), Some(cursor))),
                        // Stop after the first error.
                        Err(err) => Some((Err(err), None)),
                    }
                })
                .left_stream(),
                Err(err) => stream::iter([Err(err)]).right_stream(),
            })
            .boxed()
    }
}

/// Records held in memory, keyed by locator. Records a log of queries.
#[derive(Debug, Default)]
pub struct MemorySource {
    datasets: Mutex<HashMap<String, Vec<FeatureRecord>>>,
    queries: Mutex<Vec<(String, BoundingBox)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: impl Into<String>, records: Vec<FeatureRecord>) {
        self.datasets.lock().insert(locator.into(), records);
    }

    pub fn push(&self, locator: &str, record: FeatureRecord) {
        self.datasets
            .lock()
            .entry(locator.to_string())
            .or_default()
            .push(record);
    }

    /// Every query issued so far, in order.
    pub fn queries(&self) -> Vec<(String, BoundingBox)> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }
}

impl SpatialSource for MemorySource {
    fn query(&self, locator: &str, bbox: BoundingBox) -> RecordStream {
        self.queries.lock().push((locator.to_string(), bbox));
        let matches: Vec<_> = self
            .datasets
            .lock()
            .get(locator)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| intersects(r, &bbox))
                    .cloned()
                    .map(Ok)
                    .collect()
            })
            .unwrap_or_default();
        stream::iter(matches).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use foundation::bounds::BoundingBox;
    use futures_util::StreamExt;
    use serde_json::json;

    use super::{GeoJsonSeqSource, MemorySource, SpatialSource};
    use crate::feature::FeatureRecord;

    fn point(name: &str, x: f64, y: f64) -> FeatureRecord {
        FeatureRecord::from_geojson(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [x, y]},
            "properties": {"name": name}
        }))
        .unwrap()
    }

    fn names(records: &[FeatureRecord]) -> Vec<&str> {
        records.iter().filter_map(|r| r.natural_key()).collect()
    }

    #[tokio::test]
    async fn memory_source_filters_by_bbox_and_logs_queries() {
        let src = MemorySource::new();
        src.insert("a.fgb", vec![point("in", 1.0, 1.0), point("out", 9.0, 9.0)]);
        let bbox = BoundingBox::new(0.0, 0.0, 2.0, 2.0);

        let got: Vec<_> = src.query("a.fgb", bbox).map(|r| r.unwrap()).collect().await;
        assert_eq!(names(&got), vec!["in"]);

        let none: Vec<_> = src.query("missing", bbox).collect().await;
        assert!(none.is_empty());
        assert_eq!(src.query_count(), 2);
        assert_eq!(src.queries()[0].0, "a.fgb");
    }

    #[tokio::test]
    async fn file_source_streams_matching_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("regions.geojsonl")).unwrap();
        for (name, x) in [("west", -5.0), ("centre", 0.5), ("east", 5.0)] {
            let feature = json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [x, 0.5]},
                "properties": {"name": name}
            });
            writeln!(file, "\u{1e}{feature}").unwrap();
        }
        writeln!(file).unwrap();

        let src = GeoJsonSeqSource::new(dir.path());
        let bbox = BoundingBox::new(0.0, 0.0, 6.0, 1.0);
        let got: Vec<_> = src
            .query("regions.geojsonl", bbox)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(names(&got), vec!["centre", "east"]);

        // Restartable: a second query opens a fresh stream.
        let again: Vec<_> = src.query("regions.geojsonl", bbox).collect().await;
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn file_source_reports_missing_file_and_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let src = GeoJsonSeqSource::new(dir.path());
        let bbox = BoundingBox::new(-1.0, -1.0, 1.0, 1.0);

        let missing: Vec<_> = src.query("nope.geojsonl", bbox).collect().await;
        assert_eq!(missing.len(), 1);
        assert!(missing[0].is_err());

        std::fs::write(
            dir.path().join("broken.geojsonl"),
            "{\"type\":\"Feature\",\"geometry\":{\"type\":\"Point\",\"coordinates\":[0,0]},\"properties\":{\"name\":\"ok\"}}\n{not json\n{\"type\":\"Feature\",\"geometry\":{\"type\":\"Point\",\"coordinates\":[0,0]},\"properties\":{\"name\":\"late\"}}\n",
        )
        .unwrap();
        let items: Vec<_> = src.query("broken.geojsonl", bbox).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
