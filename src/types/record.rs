//! Raw record and tabular frame types shared by training and serving.

use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single raw cell as received from a merged transaction + identity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Flag(bool),
    Text(String),
    /// JSON `null` or an absent cell
    Missing,
}

impl FeatureValue {
    /// Numeric view of the cell. Text is parsed; NaN counts as missing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(x) if x.is_nan() => None,
            FeatureValue::Number(x) => Some(*x),
            FeatureValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Text(s) => s.trim().parse::<f64>().ok().filter(|x| !x.is_nan()),
            FeatureValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            FeatureValue::Missing => true,
            FeatureValue::Number(x) => x.is_nan(),
            _ => false,
        }
    }

    /// Category key used by the label and one-hot encoders.
    pub fn category_key(&self) -> String {
        match self {
            FeatureValue::Number(x) => x.to_string(),
            FeatureValue::Flag(b) => b.to_string(),
            FeatureValue::Text(s) => s.clone(),
            FeatureValue::Missing => "nan".to_string(),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(x: f64) -> Self {
        FeatureValue::Number(x)
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        FeatureValue::Text(s.to_string())
    }
}

/// One record keyed by column name.
pub type Record = BTreeMap<String, FeatureValue>;

/// Row-major table of raw cells with a named, ordered column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<FeatureValue>>,
}

impl Frame {
    /// Build a frame, checking that column names are unique and that every
    /// row has one cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<FeatureValue>>) -> Result<Self, TransformError> {
        let mut seen = BTreeSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TransformError::DuplicateFeature(name.clone()));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TransformError::Shape {
                    row: i,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Build a frame from records. Columns are the sorted union of all keys;
    /// keys absent from a record become `Missing`.
    pub fn from_records(records: &[Record]) -> Self {
        let columns: Vec<String> = records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(FeatureValue::Missing))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<FeatureValue>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &FeatureValue> {
        self.rows.iter().map(move |row| &row[idx])
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut FeatureValue {
        &mut self.rows[row][col]
    }

    /// Project onto `columns`: absent columns are synthesized as numeric 0,
    /// extra columns are dropped, and the output order equals `columns`.
    pub fn reindex(&self, columns: &[String]) -> Frame {
        let sources: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| match src {
                        Some(i) => row[*i].clone(),
                        None => FeatureValue::Number(0.0),
                    })
                    .collect()
            })
            .collect();

        Frame {
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Remove a column and return its cells.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<FeatureValue>> {
        let idx = self.column_index(name)?;
        self.columns.remove(idx);
        Some(self.rows.iter_mut().map(|row| row.remove(idx)).collect())
    }

    /// Keep only the columns for which `keep` returns true.
    pub fn retain_columns<F: Fn(&str) -> bool>(&mut self, keep: F) {
        let mask: Vec<bool> = self.columns.iter().map(|c| keep(c)).collect();
        let mut it = mask.iter();
        self.columns.retain(|_| *it.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut it = mask.iter();
            row.retain(|_| *it.next().unwrap_or(&true));
        }
    }

    /// Keep only the rows for which `keep` returns true.
    pub fn retain_rows<F: Fn(&[FeatureValue]) -> bool>(&mut self, keep: F) {
        self.rows.retain(|row| keep(row));
    }

    /// Copy the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Convert to a numeric matrix. Every cell must be numeric by now.
    pub fn into_matrix(self) -> Result<FeatureMatrix, TransformError> {
        let Frame { columns, rows } = self;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(row.len());
            for (j, cell) in row.iter().enumerate() {
                match cell.as_number() {
                    Some(x) => values.push(x),
                    None => {
                        return Err(TransformError::NonNumeric {
                            column: columns[j].clone(),
                        })
                    }
                }
            }
            out.push(values);
        }
        Ok(FeatureMatrix { columns, rows: out })
    }
}

/// Dense model input, one row per record, columns in the fitted layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn take_rows(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, FeatureValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_feature_value_deserialization() {
        let json = r#"{"amt": 12.5, "card4": "visa", "online": true, "id_12": null}"#;
        let rec: Record = serde_json::from_str(json).unwrap();

        assert_eq!(rec["amt"], FeatureValue::Number(12.5));
        assert_eq!(rec["card4"], FeatureValue::Text("visa".to_string()));
        assert_eq!(rec["online"], FeatureValue::Flag(true));
        assert_eq!(rec["id_12"], FeatureValue::Missing);
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(FeatureValue::Text(" 3.5 ".into()).as_number(), Some(3.5));
        assert_eq!(FeatureValue::Text("visa".into()).as_number(), None);
        assert_eq!(FeatureValue::Number(f64::NAN).as_number(), None);
        assert!(FeatureValue::Number(f64::NAN).is_missing());
        assert_eq!(FeatureValue::Number(150.0).category_key(), "150");
    }

    #[test]
    fn test_from_records_fills_missing() {
        let records = vec![
            record(&[("b", 1.0.into()), ("a", "x".into())]),
            record(&[("c", 2.0.into())]),
        ];
        let frame = Frame::from_records(&records);

        assert_eq!(frame.columns(), &["a", "b", "c"]);
        assert_eq!(frame.rows()[1][0], FeatureValue::Missing);
        assert_eq!(frame.rows()[1][2], FeatureValue::Number(2.0));
    }

    #[test]
    fn test_reindex_synthesizes_and_drops() {
        let records = vec![record(&[("b", 7.0.into()), ("extra", "z".into())])];
        let frame = Frame::from_records(&records);
        let schema = vec!["a".to_string(), "b".to_string()];

        let out = frame.reindex(&schema);
        assert_eq!(out.columns(), schema.as_slice());
        assert_eq!(out.rows()[0], vec![FeatureValue::Number(0.0), FeatureValue::Number(7.0)]);
    }

    #[test]
    fn test_shape_check() {
        let err = Frame::new(vec!["a".into()], vec![vec![]]).unwrap_err();
        assert!(matches!(err, TransformError::Shape { row: 0, expected: 1, actual: 0 }));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Frame::new(vec!["amt".into(), "amt".into()], vec![vec![1.0.into(), 2.0.into()]]).unwrap_err();
        assert!(matches!(err, TransformError::DuplicateFeature(name) if name == "amt"));
    }

    #[test]
    fn test_into_matrix_rejects_text() {
        let frame = Frame::new(vec!["a".into()], vec![vec!["visa".into()]]).unwrap();
        let err = frame.into_matrix().unwrap_err();
        assert!(matches!(err, TransformError::NonNumeric { column } if column == "a"));
    }
}
