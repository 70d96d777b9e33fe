//! Empirical IMB measurements: loading, filtered queries and replicate
//! assembly.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use sc_types::{
    DataError, GroundTruthPoint, GroundTruthSet, ScResult, Scenario, ScenarioKey,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Columns the dataset must provide.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "benchmark",
    "benchmark_parent",
    "node_count",
    "processes",
    "bytes",
    "Mbytes/sec",
    "repetitions",
    "remark",
];

/// Parent category that selects the whole dataset.
pub const ALL_PARENTS: &str = "all";

/// One measurement row.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthRow {
    /// 1-based line number in the source file.
    pub line: usize,
    pub benchmark: String,
    pub benchmark_parent: String,
    pub node_count: u32,
    pub processes: u32,
    pub bytes: u64,
    /// `None` for a blank or unreadable cell.
    pub mbytes_per_sec: Option<f64>,
    pub repetitions: u64,
    pub remark: Option<String>,
    fields: Vec<String>,
}

impl GroundTruthRow {
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey {
            benchmark: self.benchmark.clone(),
            node_count: self.node_count,
            processes: self.processes,
        }
    }

    fn matches_key(&self, key: &ScenarioKey) -> bool {
        self.benchmark == key.benchmark
            && self.node_count == key.node_count
            && self.processes == key.processes
    }
}

/// Equality predicates for [`GroundTruthStore::query`]; `None` leaves a
/// column unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthQuery {
    pub benchmark: Option<String>,
    pub node_count: Option<u32>,
    pub processes: Option<u32>,
    /// Columns to project onto; all columns when `None`.
    pub metrics: Option<Vec<String>>,
}

impl GroundTruthQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }

    pub fn node_count(mut self, node_count: u32) -> Self {
        self.node_count = Some(node_count);
        self
    }

    pub fn processes(mut self, processes: u32) -> Self {
        self.processes = Some(processes);
        self
    }

    pub fn metrics<S: Into<String>>(mut self, metrics: impl IntoIterator<Item = S>) -> Self {
        self.metrics = Some(metrics.into_iter().map(Into::into).collect());
        self
    }

    fn matches(&self, row: &GroundTruthRow) -> bool {
        self.benchmark.as_ref().map_or(true, |b| &row.benchmark == b)
            && self.node_count.map_or(true, |n| row.node_count == n)
            && self.processes.map_or(true, |p| row.processes == p)
    }
}

/// Rows returned by a query, projected onto the requested columns.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    columns: Vec<&'a str>,
    indices: Vec<usize>,
    rows: Vec<&'a GroundTruthRow>,
}

impl<'a> Selection<'a> {
    pub fn columns(&self) -> &[&'a str] {
        &self.columns
    }

    pub fn rows(&self) -> &[&'a GroundTruthRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Projected cells of every row, in column order.
    pub fn records(&self) -> Vec<Vec<&'a str>> {
        self.rows
            .iter()
            .map(|row| {
                self.indices
                    .iter()
                    .map(|&i| row.fields[i].as_str())
                    .collect()
            })
            .collect()
    }
}

/// How byte sizes missing from a replicate are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Cross-replicate mean for that byte size.
    #[default]
    Mean,
    /// Mean of the values between the first and third quartile.
    InterquartileMean,
}

impl FillPolicy {
    fn fill_value(&self, values: &mut [f64]) -> f64 {
        let kept = match self {
            Self::Mean => &values[..],
            Self::InterquartileMean => {
                values.sort_by(|a, b| a.total_cmp(b));
                let q = values.len() / 4;
                &values[q..values.len() - q]
            }
        };
        kept.iter().sum::<f64>() / kept.len().max(1) as f64
    }
}

/// Which scenarios take part in a calibration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSelection {
    pub benchmarks: Option<Vec<String>>,
    pub node_counts: Option<Vec<u32>>,
    pub byte_sizes: Option<Vec<u64>>,
    /// Benchmarks whose name contains any of these fragments are held out.
    pub exclude_benchmarks_containing: Vec<String>,
    pub fill: FillPolicy,
}

impl ScenarioSelection {
    fn admits(&self, key: &ScenarioKey) -> bool {
        self.benchmarks
            .as_ref()
            .map_or(true, |b| b.iter().any(|name| name == &key.benchmark))
            && self
                .node_counts
                .as_ref()
                .map_or(true, |n| n.contains(&key.node_count))
            && !self
                .exclude_benchmarks_containing
                .iter()
                .any(|fragment| key.benchmark.contains(fragment.as_str()))
    }
}

/// In-memory ground-truth dataset with a parent-category view.
///
/// Loaded once, then only read; every query takes `&self`.
#[derive(Debug, Clone)]
pub struct GroundTruthStore {
    columns: Vec<String>,
    rows: Vec<GroundTruthRow>,
    parent: Option<String>,
    mbytes_column: usize,
}

impl GroundTruthStore {
    /// Load a CSV dataset from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> ScResult<Self> {
        let path = path.as_ref();
        info!("Loading ground truth from: {}", path.display());

        if !path.exists() {
            return Err(DataError::SourceNotFound(path.display().to_string()).into());
        }

        let file = std::fs::File::open(path)?;
        let store = Self::from_reader(file)?;
        info!(
            "Loaded {} ground-truth rows from {}",
            store.rows.len(),
            path.display()
        );
        Ok(store)
    }

    /// Parse a CSV dataset from any reader.
    pub fn from_reader<R: Read>(reader: R) -> ScResult<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        debug!("Ground-truth columns: {:?}", columns);

        let index = |name: &str| -> ScResult<usize> {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| {
                    DataError::MissingColumn {
                        column: name.to_string(),
                    }
                    .into()
                })
        };
        let benchmark = index("benchmark")?;
        let parent = index("benchmark_parent")?;
        let node_count = index("node_count")?;
        let processes = index("processes")?;
        let bytes = index("bytes")?;
        let mbytes = index("Mbytes/sec")?;
        let repetitions = index("repetitions")?;
        let remark = index("remark")?;

        let mut rows = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let line = i + 2;
            let record = result.map_err(|e| DataError::ParseError {
                line,
                message: e.to_string(),
            })?;
            let fields: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
            if fields.len() != columns.len() {
                return Err(DataError::ParseError {
                    line,
                    message: format!(
                        "record has {} fields, header has {}",
                        fields.len(),
                        columns.len()
                    ),
                }
                .into());
            }

            let remark_text = fields[remark].clone();
            rows.push(GroundTruthRow {
                line,
                benchmark: fields[benchmark].clone(),
                benchmark_parent: fields[parent].clone(),
                node_count: parse_integer(&fields[node_count], "node_count", line)?,
                processes: parse_integer(&fields[processes], "processes", line)?,
                bytes: parse_integer(&fields[bytes], "bytes", line)?,
                mbytes_per_sec: parse_float(&fields[mbytes]),
                repetitions: parse_integer(&fields[repetitions], "repetitions", line)?,
                remark: (!remark_text.is_empty()).then_some(remark_text),
                fields,
            });
        }

        Ok(Self {
            columns,
            rows,
            parent: None,
            mbytes_column: mbytes,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Restrict the active view to one benchmark parent, or reset it with
    /// [`ALL_PARENTS`].
    pub fn filter_by_parent(&mut self, category: &str) {
        if category == ALL_PARENTS {
            self.parent = None;
        } else {
            self.parent = Some(category.to_string());
        }
        debug!(
            "Ground-truth view: parent={:?}, {} rows",
            self.parent,
            self.active_rows().count()
        );
    }

    fn active_rows(&self) -> impl Iterator<Item = &GroundTruthRow> {
        self.rows.iter().filter(move |row| {
            self.parent
                .as_ref()
                .map_or(true, |p| &row.benchmark_parent == p)
        })
    }

    /// Rows of the active view matching every supplied predicate.
    pub fn query(&self, query: &GroundTruthQuery) -> ScResult<Selection<'_>> {
        let (columns, indices) = match &query.metrics {
            None => (
                self.columns.iter().map(String::as_str).collect(),
                (0..self.columns.len()).collect(),
            ),
            Some(metrics) => {
                let mut names = Vec::with_capacity(metrics.len());
                let mut indices = Vec::with_capacity(metrics.len());
                for metric in metrics {
                    let i = self
                        .columns
                        .iter()
                        .position(|c| c == metric)
                        .ok_or_else(|| DataError::MissingColumn {
                            column: metric.clone(),
                        })?;
                    names.push(self.columns[i].as_str());
                    indices.push(i);
                }
                (names, indices)
            }
        };

        Ok(Selection {
            columns,
            indices,
            rows: self.active_rows().filter(|row| query.matches(row)).collect(),
        })
    }

    /// Unique (benchmark, node_count, processes) triples in first-seen order.
    pub fn distinct_scenarios(&self, node_count: Option<u32>) -> Vec<ScenarioKey> {
        let mut seen = HashSet::new();
        self.active_rows()
            .filter(|row| node_count.map_or(true, |n| row.node_count == n))
            .map(GroundTruthRow::key)
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    /// Assemble the scenarios and replicate vectors a calibration scores
    /// against. Rows carrying a remark are left out.
    pub fn ground_truth(&self, selection: &ScenarioSelection) -> ScResult<GroundTruthSet> {
        let mut set = GroundTruthSet::new();

        for key in self.distinct_scenarios(None) {
            if !selection.admits(&key) {
                continue;
            }
            let rows: Vec<&GroundTruthRow> = self
                .active_rows()
                .filter(|row| row.matches_key(&key) && row.remark.is_none())
                .filter(|row| {
                    selection
                        .byte_sizes
                        .as_ref()
                        .map_or(true, |sizes| sizes.contains(&row.bytes))
                })
                .collect();
            if rows.is_empty() {
                warn!("No usable ground truth for {}, skipping", key);
                continue;
            }
            for row in &rows {
                let cell = &row.fields[self.mbytes_column];
                if row.mbytes_per_sec.is_none() && !cell.is_empty() {
                    return Err(DataError::ParseError {
                        line: row.line,
                        message: format!("invalid Mbytes/sec value {:?}", cell),
                    }
                    .into());
                }
            }

            let (byte_sizes, replicates) = assemble_replicates(&rows, selection.fill);
            debug!(
                "Scenario {}: {} replicates x {} sizes",
                key,
                replicates.len(),
                byte_sizes.len()
            );
            let point = GroundTruthPoint::new(byte_sizes.len(), replicates)?;
            set.push(Scenario::new(key, byte_sizes), point)?;
        }

        if set.is_empty() {
            return Err(DataError::EmptyScenario {
                scenario: format!("{:?}", selection),
            }
            .into());
        }
        info!("Selected {} calibration scenarios", set.len());
        Ok(set)
    }
}

/// Split rows in file order into replicate runs and align them by byte size.
///
/// A new replicate starts whenever `bytes` fails to increase. Blank
/// measurements count as missing and are filled like absent sizes; fill
/// values are not rounded.
fn assemble_replicates(rows: &[&GroundTruthRow], fill: FillPolicy) -> (Vec<u64>, Vec<Vec<f64>>) {
    let mut runs: Vec<BTreeMap<u64, f64>> = Vec::new();
    let mut current = BTreeMap::new();
    let mut last: Option<u64> = None;

    for row in rows {
        if last.map_or(false, |prev| row.bytes <= prev) && !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
        if let Some(value) = row.mbytes_per_sec {
            current.insert(row.bytes, value);
        }
        last = Some(row.bytes);
    }
    if !current.is_empty() {
        runs.push(current);
    }

    let byte_sizes: Vec<u64> = runs
        .iter()
        .flat_map(|run| run.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let fill_values: BTreeMap<u64, f64> = byte_sizes
        .iter()
        .map(|size| {
            let mut present: Vec<f64> = runs.iter().filter_map(|run| run.get(size).copied()).collect();
            (*size, fill.fill_value(&mut present))
        })
        .collect();

    let replicates = runs
        .iter()
        .map(|run| {
            byte_sizes
                .iter()
                .map(|size| run.get(size).copied().unwrap_or(fill_values[size]))
                .collect()
        })
        .collect();

    (byte_sizes, replicates)
}

fn parse_integer<T: TryFrom<u64>>(cell: &str, column: &str, line: usize) -> ScResult<T> {
    let invalid = || DataError::ParseError {
        line,
        message: format!("invalid {} value {:?}", column, cell),
    };
    let value = match cell.parse::<u64>() {
        Ok(v) => v,
        Err(_) => {
            let v: f64 = cell.parse().map_err(|_| invalid())?;
            if v < 0.0 || v.fract() != 0.0 || !v.is_finite() {
                return Err(invalid().into());
            }
            v as u64
        }
    };
    T::try_from(value).map_err(|_| invalid().into())
}

fn parse_float(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
benchmark,benchmark_parent,node_count,processes,bytes,Mbytes/sec,repetitions,remark,t_avg[usec]
PingPong,P2P,2,2,0,0.0,1000,,1.1
PingPong,P2P,2,2,8,10.0,1000,,1.2
PingPong,P2P,2,2,16,20.0,1000,,1.3
PingPong,P2P,2,2,0,0.0,1000,,1.0
PingPong,P2P,2,2,8,14.0,1000,,1.1
PingPing,P2P,2,2,0,0.0,1000,,0.9
PingPing,P2P,2,2,8,5.0,1000,,1.0
PingPing,P2P,4,4,8,6.0,1000,,1.0
Stencil2D,P2P,2,2,8,3.0,1000,,2.0
PingPong,P2P,2,2,32,50.0,1000,timeout,9.9
Allreduce,COLL,2,2,8,1.0,1000,,4.0
";

    fn store() -> GroundTruthStore {
        GroundTruthStore::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    fn query_len(store: &GroundTruthStore, query: GroundTruthQuery) -> usize {
        store.query(&query).unwrap().len()
    }

    #[test]
    fn test_missing_column_is_a_format_error() {
        let csv = "benchmark,node_count\nPingPong,2\n";
        let err = GroundTruthStore::from_reader(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "DataFormatError");
        assert!(err.to_string().contains("benchmark_parent"));
    }

    #[test]
    fn test_bad_number_reports_line() {
        let csv = format!(
            "{}\nPingPong,P2P,two,2,0,0.0,1000,\n",
            REQUIRED_COLUMNS.join(",")
        );
        let err = GroundTruthStore::from_reader(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "DataFormatError");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_float_counts_are_accepted() {
        let csv = format!(
            "{}\nPingPong,P2P,128.0,2,8,1.5,1000,\n",
            REQUIRED_COLUMNS.join(",")
        );
        let store = GroundTruthStore::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(query_len(&store, GroundTruthQuery::new().node_count(128)), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let store = GroundTruthStore::load(file.path()).unwrap();
        assert_eq!(query_len(&store, GroundTruthQuery::new()), 11);

        let missing = GroundTruthStore::load("/nonexistent/imb.csv").unwrap_err();
        assert!(matches!(
            missing,
            sc_types::ScError::Data(DataError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_empty_query_returns_active_view() {
        let mut store = store();
        assert_eq!(query_len(&store, GroundTruthQuery::new()), 11);
        store.filter_by_parent("P2P");
        assert_eq!(query_len(&store, GroundTruthQuery::new()), 10);
    }

    #[test]
    fn test_filter_all_equals_unfiltered() {
        let unfiltered = store();
        let mut filtered = store();
        filtered.filter_by_parent("COLL");
        filtered.filter_by_parent(ALL_PARENTS);

        for query in [
            GroundTruthQuery::new(),
            GroundTruthQuery::new().benchmark("PingPong"),
            GroundTruthQuery::new().node_count(2).processes(2),
        ] {
            let a = unfiltered.query(&query).unwrap();
            let b = filtered.query(&query).unwrap();
            assert_eq!(a.records(), b.records());
        }
    }

    #[test]
    fn test_parent_filter_does_not_compound() {
        let mut store = store();
        store.filter_by_parent("COLL");
        store.filter_by_parent("P2P");
        assert_eq!(query_len(&store, GroundTruthQuery::new()), 10);
    }

    #[test]
    fn test_query_predicates_are_conjunctive() {
        let store = store();
        assert_eq!(
            query_len(&store, GroundTruthQuery::new().benchmark("PingPing")),
            3
        );
        assert_eq!(
            query_len(
                &store,
                GroundTruthQuery::new().benchmark("PingPing").node_count(2)
            ),
            2
        );
        assert_eq!(
            query_len(
                &store,
                GroundTruthQuery::new()
                    .benchmark("PingPing")
                    .node_count(2)
                    .processes(4)
            ),
            0
        );
    }

    #[test]
    fn test_query_projection() {
        let store = store();
        let selection = store
            .query(
                &GroundTruthQuery::new()
                    .benchmark("PingPing")
                    .node_count(4)
                    .metrics(["bytes", "Mbytes/sec"]),
            )
            .unwrap();
        assert_eq!(selection.columns(), &["bytes", "Mbytes/sec"]);
        assert_eq!(selection.records(), vec![vec!["8", "6.0"]]);

        let err = store
            .query(&GroundTruthQuery::new().metrics(["latency"]))
            .unwrap_err();
        assert_eq!(err.kind(), "DataFormatError");
    }

    #[test]
    fn test_distinct_scenarios() {
        let store = store();
        let all = store.distinct_scenarios(None);
        let names: Vec<_> = all
            .iter()
            .map(|k| (k.benchmark.as_str(), k.node_count))
            .collect();
        assert_eq!(
            names,
            vec![
                ("PingPong", 2),
                ("PingPing", 2),
                ("PingPing", 4),
                ("Stencil2D", 2),
                ("Allreduce", 2)
            ]
        );
        assert_eq!(store.distinct_scenarios(Some(4)).len(), 1);
    }

    #[test]
    fn test_ground_truth_splits_and_fills_replicates() {
        let mut store = store();
        store.filter_by_parent("P2P");
        let selection = ScenarioSelection {
            benchmarks: Some(vec!["PingPong".into()]),
            ..Default::default()
        };
        let set = store.ground_truth(&selection).unwrap();
        assert_eq!(set.len(), 1);

        let (scenario, point) = set.iter().next().unwrap();
        // The remarked 32-byte row is excluded.
        assert_eq!(scenario.byte_sizes, vec![0, 8, 16]);
        assert_eq!(point.replicates().len(), 2);
        assert_eq!(point.replicates()[0], vec![0.0, 10.0, 20.0]);
        // Second run lacks 16 bytes: filled with the cross-replicate mean.
        assert_eq!(point.replicates()[1], vec![0.0, 14.0, 20.0]);
    }

    #[test]
    fn test_ground_truth_selection() {
        let mut store = store();
        store.filter_by_parent("P2P");
        let selection = ScenarioSelection {
            node_counts: Some(vec![2]),
            byte_sizes: Some(vec![8]),
            exclude_benchmarks_containing: vec!["Stencil".into()],
            ..Default::default()
        };
        let set = store.ground_truth(&selection).unwrap();
        let keys: Vec<_> = set.scenarios().map(|s| s.benchmark().to_string()).collect();
        assert_eq!(keys, vec!["PingPong", "PingPing"]);
        assert!(set.scenarios().all(|s| s.byte_sizes == vec![8]));

        let none = ScenarioSelection {
            benchmarks: Some(vec!["Barrier".into()]),
            ..Default::default()
        };
        assert!(store.ground_truth(&none).is_err());
    }

    #[test]
    fn test_blank_measurements_on_unused_rows() {
        let csv = format!(
            "{}\n\
             PingPong,P2P,2,2,0,1.0,1000,\n\
             PingPong,P2P,2,2,8,2.0,1000,\n\
             PingPong,P2P,2,2,16,,0,timeout\n\
             Allreduce,COLL,2,2,8,n/a,1000,\n",
            REQUIRED_COLUMNS.join(",")
        );
        let mut store = GroundTruthStore::from_reader(csv.as_bytes()).unwrap();
        store.filter_by_parent("P2P");
        let set = store.ground_truth(&ScenarioSelection::default()).unwrap();
        let (scenario, point) = set.iter().next().unwrap();
        assert_eq!(scenario.byte_sizes, vec![0, 8]);
        assert_eq!(point.replicates(), &[vec![1.0, 2.0]]);

        // The unreadable cell only matters once its row is selected.
        store.filter_by_parent(ALL_PARENTS);
        let err = store.ground_truth(&ScenarioSelection::default()).unwrap_err();
        assert_eq!(err.kind(), "DataFormatError");
        assert!(err.to_string().contains("line 5"));
    }

    #[test]
    fn test_blank_measurement_is_filled() {
        let csv = format!(
            "{}\n\
             PingPong,P2P,2,2,0,1.0,1000,\n\
             PingPong,P2P,2,2,8,2.0,1000,\n\
             PingPong,P2P,2,2,0,3.0,1000,\n\
             PingPong,P2P,2,2,8,,1000,\n",
            REQUIRED_COLUMNS.join(",")
        );
        let store = GroundTruthStore::from_reader(csv.as_bytes()).unwrap();
        let set = store.ground_truth(&ScenarioSelection::default()).unwrap();
        let (_, point) = set.iter().next().unwrap();
        assert_eq!(point.replicates(), &[vec![1.0, 2.0], vec![3.0, 2.0]]);
    }

    #[test]
    fn test_repeated_size_starts_replicate_and_fill_is_unrounded() {
        let csv = format!(
            "{}\n\
             PingPong,P2P,2,2,8,1.0,1000,\n\
             PingPong,P2P,2,2,16,1.0,1000,\n\
             PingPong,P2P,2,2,16,2.0,1000,\n\
             PingPong,P2P,2,2,8,1.0,1000,\n\
             PingPong,P2P,2,2,16,1.001,1000,\n\
             PingPong,P2P,2,2,8,1.0,1000,\n",
            REQUIRED_COLUMNS.join(",")
        );
        let store = GroundTruthStore::from_reader(csv.as_bytes()).unwrap();
        let set = store.ground_truth(&ScenarioSelection::default()).unwrap();
        let (_, point) = set.iter().next().unwrap();
        let replicates = point.replicates();
        // 8,16 | 16 | 8,16 | 8: an equal size closes the run too.
        assert_eq!(replicates.len(), 4);
        assert_eq!(replicates[0], vec![1.0, 1.0]);
        assert_eq!(replicates[2], vec![1.0, 1.001]);
        let fill = (1.0 + 2.0 + 1.001) / 3.0;
        assert_eq!(replicates[1], vec![1.0, 2.0]);
        assert_eq!(replicates[3], vec![1.0, fill]);
    }

    #[test]
    fn test_interquartile_fill() {
        let mut values = vec![1.0, 100.0, 2.0, 3.0, -50.0, 2.5, 2.0, 1.5];
        let iqm = FillPolicy::InterquartileMean.fill_value(&mut values);
        assert!((iqm - 2.0).abs() < 1e-12);

        let mut values = vec![2.0, 4.0];
        assert_eq!(FillPolicy::Mean.fill_value(&mut values), 3.0);
        assert_eq!(FillPolicy::Mean.fill_value(&mut []), 0.0);
    }
}
