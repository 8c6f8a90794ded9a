//! CSV-backed datasets of labeled feature records.
//!
//! The format is fixed for compatibility with existing datasets:
//!
//! ```text
//! Label,LeftEyebrow,RightEyebrow,LeftLip,RightLip,LipHeight,LipWidth
//! Joy,6.625,6.625,5,5,2,3
//! ```

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{Error, Result};
use crate::features::{FacialFeatures, FEATURE_TABLE, NUM_FEATURES};
use crate::record::{Expression, FacialFeatureRecord};

/// Header row of every dataset file.
pub const DATASET_HEADER: [&str; NUM_FEATURES + 1] = [
    "Label",
    FEATURE_TABLE[0].name,
    FEATURE_TABLE[1].name,
    FEATURE_TABLE[2].name,
    FEATURE_TABLE[3].name,
    FEATURE_TABLE[4].name,
    FEATURE_TABLE[5].name,
];

/// Create (or truncate) a dataset file containing only the header row.
pub fn create_dataset<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(DATASET_HEADER)?;
    writer.flush()?;
    Ok(())
}

/// Append one record to a dataset file.
///
/// The file is opened and closed for every row, so rows already written
/// survive a failure later in the same batch.
pub fn append_record<P: AsRef<Path>>(path: P, record: &FacialFeatureRecord) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(row_fields(record))?;
    writer.flush()?;
    Ok(())
}

fn row_fields(record: &FacialFeatureRecord) -> Vec<String> {
    std::iter::once(record.label.to_string())
        .chain(record.features.to_array().iter().map(|v| v.to_string()))
        .collect()
}

/// An ordered, append-only collection of feature records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<FacialFeatureRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: FacialFeatureRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FacialFeatureRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacialFeatureRecord> {
        self.records.iter()
    }

    /// Read a dataset file, validating the header and every row.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let header = reader.headers()?;
        if header.iter().ne(DATASET_HEADER.iter().copied()) {
            return Err(Error::MalformedDatasetRow {
                line: 1,
                reason: format!("unexpected header {:?}", header.iter().collect::<Vec<_>>()),
            });
        }

        let mut dataset = Self::new();
        for row in reader.records() {
            let row = row?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            dataset.push(parse_row(&row, line)?);
        }
        Ok(dataset)
    }

    /// Write the whole dataset, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(DATASET_HEADER)?;
        for record in &self.records {
            writer.write_record(row_fields(record))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl FromIterator<FacialFeatureRecord> for Dataset {
    fn from_iter<I: IntoIterator<Item = FacialFeatureRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

fn parse_row(row: &csv::StringRecord, line: u64) -> Result<FacialFeatureRecord> {
    let malformed = |reason: String| Error::MalformedDatasetRow { line, reason };

    if row.len() != DATASET_HEADER.len() {
        return Err(malformed(format!(
            "expected {} fields, found {}",
            DATASET_HEADER.len(),
            row.len()
        )));
    }

    let label: Expression = row[0].trim().parse().map_err(malformed)?;

    let mut values = [0.0; NUM_FEATURES];
    for (i, value) in values.iter_mut().enumerate() {
        let field = row[i + 1].trim();
        *value = field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("{} is not a number: {field:?}", DATASET_HEADER[i + 1])))?;
    }

    Ok(FacialFeatureRecord::new(label, FacialFeatures::from_array(values)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: Expression, base: f64) -> FacialFeatureRecord {
        FacialFeatureRecord::new(
            label,
            FacialFeatures::from_array([base, base + 0.5, 0.1, 1.0 / 3.0, 2.0, 1e-7]),
        )
    }

    #[test]
    fn header_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        create_dataset(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Label,LeftEyebrow,RightEyebrow,LeftLip,RightLip,LipHeight,LipWidth\n"
        );
    }

    #[test]
    fn create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        create_dataset(&path).unwrap();
        append_record(&path, &record(Expression::Joy, 1.0)).unwrap();
        create_dataset(&path).unwrap();

        assert!(Dataset::load(&path).unwrap().is_empty());
    }

    #[test]
    fn appended_rows_roundtrip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        create_dataset(&path).unwrap();

        let written = vec![
            record(Expression::Surprise, 6.625),
            record(Expression::Angry, 0.123456789),
            record(Expression::Error, 3.0),
        ];
        for r in &written {
            append_record(&path, r).unwrap();
        }

        let loaded = Dataset::load(&path).unwrap();
        assert_eq!(loaded.records(), written.as_slice());
    }

    #[test]
    fn row_text_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        create_dataset(&path).unwrap();
        append_record(
            &path,
            &FacialFeatureRecord::new(
                Expression::Joy,
                FacialFeatures::from_array([6.625, 6.625, 5.0, 5.0, 2.0, 3.0]),
            ),
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1), Some("Joy,6.625,6.625,5,5,2,3"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let dataset: Dataset = [record(Expression::Fear, 2.0), record(Expression::Joy, 4.0)]
            .into_iter()
            .collect();
        dataset.save(&path).unwrap();
        assert_eq!(Dataset::load(&path).unwrap(), dataset);
    }

    #[test]
    fn legacy_folder_label_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(
            &path,
            "Label,LeftEyebrow,RightEyebrow,LeftLip,RightLip,LipHeight,LipWidth\n\
             Anger,1,2,3,4,5,6\n",
        )
        .unwrap();

        let loaded = Dataset::load(&path).unwrap();
        assert_eq!(loaded.records()[0].label, Expression::Angry);
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(
            &path,
            "Label,LeftEyebrow,RightEyebrow,LeftLip,RightLip,LipHeight,LipWidth\n\
             Joy,1,2,3,4,5,6\n\
             Joy,1,2,3\n",
        )
        .unwrap();

        let err = Dataset::load(&path).unwrap_err();
        assert!(matches!(err, Error::MalformedDatasetRow { line: 3, .. }));
    }

    #[test]
    fn non_numeric_feature_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(
            &path,
            "Label,LeftEyebrow,RightEyebrow,LeftLip,RightLip,LipHeight,LipWidth\n\
             Joy,1,2,abc,4,5,6\n",
        )
        .unwrap();

        let err = Dataset::load(&path).unwrap_err();
        assert!(matches!(err, Error::MalformedDatasetRow { line: 2, .. }));

        std::fs::write(
            &path,
            "Label,LeftEyebrow,RightEyebrow,LeftLip,RightLip,LipHeight,LipWidth\n\
             Joy,1,2,NaN,4,5,6\n",
        )
        .unwrap();
        assert!(Dataset::load(&path).is_err());
    }

    #[test]
    fn unknown_label_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(
            &path,
            "Label,LeftEyebrow,RightEyebrow,LeftLip,RightLip,LipHeight,LipWidth\n\
             Happy,1,2,3,4,5,6\n",
        )
        .unwrap();

        assert!(matches!(
            Dataset::load(&path).unwrap_err(),
            Error::MalformedDatasetRow { line: 2, .. }
        ));
    }

    #[test]
    fn wrong_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b,c\n").unwrap();

        assert!(matches!(
            Dataset::load(&path).unwrap_err(),
            Error::MalformedDatasetRow { line: 1, .. }
        ));
    }
}
