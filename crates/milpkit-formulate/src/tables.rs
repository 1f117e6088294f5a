//! Input tables consumed by the builders.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;

use crate::error::FormulateError;

/// A square table of arc costs between labelled nodes.
///
/// `None` marks a forbidden arc. Builders fix the corresponding variable to
/// zero instead of inventing a large cost.
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    labels: Vec<usize>,
    cells: Vec<Option<f64>>,
}

impl CostMatrix {
    pub fn new(labels: Vec<usize>, rows: Vec<Vec<Option<f64>>>) -> Result<Self, FormulateError> {
        let n = labels.len();
        if n == 0 {
            return Err(FormulateError::invalid("cost matrix has no nodes"));
        }
        check_unique(&labels, "cost matrix")?;
        if rows.len() != n {
            return Err(FormulateError::invalid(format!(
                "cost matrix has {} labels but {} rows",
                n,
                rows.len()
            )));
        }

        let mut cells = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(FormulateError::invalid(format!(
                    "cost matrix row for node {} has {} entries, expected {}",
                    labels[i],
                    row.len(),
                    n
                )));
            }
            for (j, cell) in row.into_iter().enumerate() {
                if let Some(cost) = cell {
                    check_quantity(cost, || format!("cost[{},{}]", labels[i], labels[j]))?;
                }
                cells.push(cell);
            }
        }

        Ok(Self { labels, cells })
    }

    /// A fully specified matrix over nodes `0..n`
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, FormulateError> {
        let labels = (0..rows.len()).collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Some).collect())
            .collect();
        Self::new(labels, rows)
    }

    /// Reads a matrix whose first row holds the node labels. With
    /// `index_column`, every row (the header included) starts with a label
    /// column that must repeat the header order. Empty cells and `-` are
    /// forbidden arcs.
    pub fn from_csv<R: io::Read>(reader: R, index_column: bool) -> Result<Self, FormulateError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| FormulateError::invalid(format!("cannot read header row: {}", e)))?
            .clone();
        let skip = usize::from(index_column);
        let labels = headers
            .iter()
            .skip(skip)
            .map(|h| parse_label(h, "header"))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(labels.len());
        for (r, record) in reader.records().enumerate() {
            let record = record.map_err(|e| FormulateError::invalid(format!("row {}: {}", r + 1, e)))?;
            let mut fields = record.iter();
            if index_column {
                let field = fields.next().unwrap_or_default();
                let label = parse_label(field, "index column")?;
                if labels.get(r) != Some(&label) {
                    return Err(FormulateError::invalid(format!(
                        "row {} is labelled {} but the header expects {:?}",
                        r + 1,
                        label,
                        labels.get(r)
                    )));
                }
            }
            let row = fields
                .map(|field| parse_cell(field, r + 1))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }

        Self::new(labels, rows)
    }

    pub fn from_csv_path(path: impl AsRef<Path>, index_column: bool) -> Result<Self, FormulateError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| FormulateError::invalid(format!("{}: {}", path.display(), e)))?;
        Self::from_csv(file, index_column)
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn position(&self, label: usize) -> Option<usize> {
        self.labels.iter().position(|&l| l == label)
    }

    /// Cost between node positions, `None` if forbidden
    pub fn cost(&self, i: usize, j: usize) -> Option<f64> {
        self.cells[i * self.size() + j]
    }

    /// Cost between node labels, `None` if forbidden or unknown
    pub fn cost_between(&self, from: usize, to: usize) -> Option<f64> {
        let i = self.position(from)?;
        let j = self.position(to)?;
        self.cost(i, j)
    }

    pub fn forbid(&mut self, from: usize, to: usize) -> Result<(), FormulateError> {
        let (Some(i), Some(j)) = (self.position(from), self.position(to)) else {
            return Err(FormulateError::invalid(format!(
                "cannot forbid arc ({}, {}): node not in the matrix",
                from, to
            )));
        };
        let n = self.size();
        self.cells[i * n + j] = None;
        Ok(())
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.size();
        (0..n).all(|i| (0..n).all(|j| self.cost(i, j) == self.cost(j, i)))
    }
}

/// Planar node positions used to derive Euclidean arc costs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coordinates {
    points: BTreeMap<usize, (f64, f64)>,
}

impl Coordinates {
    pub fn new(points: impl IntoIterator<Item = (usize, (f64, f64))>) -> Result<Self, FormulateError> {
        let mut map = BTreeMap::new();
        for (label, (x, y)) in points {
            if !x.is_finite() || !y.is_finite() {
                return Err(FormulateError::invalid(format!("node {} has a non-finite coordinate", label)));
            }
            if map.insert(label, (x, y)).is_some() {
                return Err(FormulateError::invalid(format!("node {} has two coordinates", label)));
            }
        }
        Ok(Self { points: map })
    }

    /// Reads `node,x,y` records after a header row
    pub fn from_csv<R: io::Read>(reader: R) -> Result<Self, FormulateError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut points = Vec::new();
        for (r, record) in reader.records().enumerate() {
            let record = record.map_err(|e| FormulateError::invalid(format!("row {}: {}", r + 1, e)))?;
            if record.len() != 3 {
                return Err(FormulateError::invalid(format!(
                    "row {} has {} fields, expected node,x,y",
                    r + 1,
                    record.len()
                )));
            }
            let label = parse_label(&record[0], "node column")?;
            let x = parse_number(&record[1], r + 1)?;
            let y = parse_number(&record[2], r + 1)?;
            points.push((label, (x, y)));
        }
        Self::new(points)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, FormulateError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| FormulateError::invalid(format!("{}: {}", path.display(), e)))?;
        Self::from_csv(file)
    }

    pub fn labels(&self) -> impl Iterator<Item = usize> + '_ {
        self.points.keys().copied()
    }

    pub fn get(&self, label: usize) -> Option<(f64, f64)> {
        self.points.get(&label).copied()
    }

    pub fn distance(&self, from: usize, to: usize) -> Option<f64> {
        let (x1, y1) = self.get(from)?;
        let (x2, y2) = self.get(to)?;
        Some((x1 - x2).hypot(y1 - y2))
    }

    /// Arcs `i != j` whose Euclidean length is at most `max_edge_length`
    pub fn euclidean_arcs(&self, max_edge_length: f64) -> Result<ArcCosts, FormulateError> {
        let nodes: Vec<usize> = self.labels().collect();
        let mut arcs = Vec::new();
        for &i in &nodes {
            for &j in &nodes {
                if i == j {
                    continue;
                }
                let d = self.distance(i, j).unwrap_or(f64::INFINITY);
                if d <= max_edge_length {
                    arcs.push((i, j, d));
                }
            }
        }
        ArcCosts::new(nodes, arcs)
    }
}

/// A sparse set of valid arcs with their costs
#[derive(Debug, Clone, PartialEq)]
pub struct ArcCosts {
    nodes: Vec<usize>,
    arcs: BTreeMap<(usize, usize), f64>,
}

impl ArcCosts {
    pub fn new(
        nodes: Vec<usize>,
        arcs: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self, FormulateError> {
        check_unique(&nodes, "arc table")?;
        let known: HashSet<usize> = nodes.iter().copied().collect();

        let mut map = BTreeMap::new();
        for (from, to, cost) in arcs {
            if !known.contains(&from) || !known.contains(&to) {
                return Err(FormulateError::invalid(format!(
                    "arc ({}, {}) references a node outside the declared set",
                    from, to
                )));
            }
            if from == to {
                return Err(FormulateError::invalid(format!("arc ({}, {}) is a self-loop", from, to)));
            }
            check_quantity(cost, || format!("cost[{},{}]", from, to))?;
            if map.insert((from, to), cost).is_some() {
                return Err(FormulateError::invalid(format!("arc ({}, {}) is listed twice", from, to)));
            }
        }

        Ok(Self { nodes, arcs: map })
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn cost(&self, from: usize, to: usize) -> Option<f64> {
        self.arcs.get(&(from, to)).copied()
    }

    pub fn contains(&self, from: usize, to: usize) -> bool {
        self.arcs.contains_key(&(from, to))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.arcs.iter().map(|(&(i, j), &c)| (i, j, c))
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }
}

pub(crate) fn check_unique(labels: &[usize], table: &str) -> Result<(), FormulateError> {
    let mut seen = HashSet::new();
    for &label in labels {
        if !seen.insert(label) {
            return Err(FormulateError::invalid(format!("{} lists node {} twice", table, label)));
        }
    }
    Ok(())
}

/// Rejects negative and non-finite table entries
pub(crate) fn check_quantity(value: f64, what: impl FnOnce() -> String) -> Result<(), FormulateError> {
    if !value.is_finite() || value < 0.0 {
        return Err(FormulateError::invalid(format!(
            "{} must be finite and non-negative, got {}",
            what(),
            value
        )));
    }
    Ok(())
}

fn parse_label(field: &str, what: &str) -> Result<usize, FormulateError> {
    field
        .parse()
        .map_err(|_| FormulateError::invalid(format!("{} entry '{}' is not a node id", what, field)))
}

fn parse_number(field: &str, row: usize) -> Result<f64, FormulateError> {
    field
        .parse()
        .map_err(|_| FormulateError::invalid(format!("row {}: '{}' is not a number", row, field)))
}

fn parse_cell(field: &str, row: usize) -> Result<Option<f64>, FormulateError> {
    if field.is_empty() || field == "-" {
        return Ok(None);
    }
    parse_number(field, row).map(Some)
}
