//! Tabular reaction datasets on top of polars.
//!
//! Every stage reads its input from disk into a [`Dataset`] and writes a new
//! file; nothing is kept in memory between stages. All columns are read as
//! strings so that auxiliary data is written back exactly as it was read.

use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::error::{PreprocessingError, Result, ResultExt};

/// Default name of the reaction column.
pub const DEFAULT_REACTION_COLUMN: &str = "rxn";

/// Layout of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// One reaction per line, no header.
    Txt,
    /// Comma-separated with a header row.
    #[default]
    Csv,
    /// Tab-separated with a header row.
    Tsv,
}

impl InputFormat {
    /// Guess the format from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("txt") | Some("smi") => Self::Txt,
            Some("tsv") => Self::Tsv,
            _ => Self::Csv,
        }
    }
}

/// A table of reaction records with a designated reaction column.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    reaction_column: String,
}

impl Dataset {
    /// Wrap a frame; the reaction column must exist.
    pub fn new(frame: DataFrame, reaction_column: impl Into<String>) -> Result<Self> {
        let reaction_column = reaction_column.into();
        if frame.column(&reaction_column).is_err() {
            return Err(PreprocessingError::ColumnNotFound(reaction_column));
        }
        Ok(Self {
            frame,
            reaction_column,
        })
    }

    /// Build a single-column dataset from reaction strings.
    pub fn from_reactions(reaction_column: impl Into<String>, reactions: Vec<String>) -> Result<Self> {
        let reaction_column = reaction_column.into();
        let frame = DataFrame::new(vec![Column::new(reaction_column.as_str().into(), reactions)])?;
        Self::new(frame, reaction_column)
    }

    /// Read a file in the given format.
    pub fn read(path: &Path, format: InputFormat, reaction_column: &str) -> Result<Self> {
        match format {
            InputFormat::Txt => Self::read_txt(path, reaction_column),
            InputFormat::Csv => Self::read_delimited(path, b',', reaction_column),
            InputFormat::Tsv => Self::read_delimited(path, b'\t', reaction_column),
        }
    }

    /// Read a comma-separated file with a header row.
    pub fn read_csv(path: &Path, reaction_column: &str) -> Result<Self> {
        Self::read_delimited(path, b',', reaction_column)
    }

    fn read_delimited(path: &Path, separator: u8, reaction_column: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read '{}'", path.display()))?;
        let content = content.replace("\r\n", "\n");

        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_parse_options(
                CsvParseOptions::default()
                    .with_separator(separator)
                    .with_quote_char(Some(b'"')),
            )
            .into_reader_with_file_handle(Cursor::new(content))
            .finish()
            .context(format!("Failed to parse '{}'", path.display()))?;

        debug!(
            "Read {} rows x {} columns from {}",
            frame.height(),
            frame.width(),
            path.display()
        );
        Self::new(frame, reaction_column)
    }

    fn read_txt(path: &Path, reaction_column: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read '{}'", path.display()))?;
        let reactions: Vec<String> = content
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty())
            .collect();
        debug!("Read {} lines from {}", reactions.len(), path.display());
        Self::from_reactions(reaction_column, reactions)
    }

    /// Write the dataset as CSV, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory '{}'", parent.display()))?;
        }
        let mut file = File::create(path)
            .context(format!("Failed to create '{}'", path.display()))?;
        let mut frame = self.frame.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(&mut frame)
            .context(format!("Failed to write '{}'", path.display()))?;
        debug!("Wrote {} rows to {}", frame.height(), path.display());
        Ok(())
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn reaction_column(&self) -> &str {
        &self.reaction_column
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect()
    }

    /// Reaction strings; missing values become empty strings.
    pub fn reactions(&self) -> Result<Vec<String>> {
        Ok(self
            .string_column(&self.reaction_column)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect())
    }

    /// Values of a string column.
    pub fn string_column(&self, name: &str) -> Result<Vec<Option<String>>> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| PreprocessingError::ColumnNotFound(name.to_string()))?;
        let values = column.str()?;
        Ok(values
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    /// Keep the rows whose mask entry is `true`.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self> {
        let mask = BooleanChunked::from_slice("mask".into(), mask);
        Ok(Self {
            frame: self.frame.filter(&mask)?,
            reaction_column: self.reaction_column.clone(),
        })
    }

    /// Rows at the given indices, in the given order. Indices may repeat.
    pub fn take_rows(&self, indices: &[usize]) -> Result<Self> {
        let indices: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
        let indices = IdxCa::from_vec("idx".into(), indices);
        Ok(Self {
            frame: self.frame.take(&indices)?,
            reaction_column: self.reaction_column.clone(),
        })
    }

    /// Set a string column, replacing it if present.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        let column = Column::new(name.into(), values);
        self.frame.with_column(column)?;
        Ok(())
    }

    /// Replace the reaction strings.
    pub fn set_reactions(&mut self, reactions: Vec<String>) -> Result<()> {
        let name = self.reaction_column.clone();
        self.set_column(&name, reactions)
    }

    /// Rename a column; renaming the reaction column moves the designation.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        self.frame.rename(old, new.into())?;
        if self.reaction_column == old {
            self.reaction_column = new.to_string();
        }
        Ok(())
    }

    /// Remove an auxiliary column.
    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        if name == self.reaction_column {
            return Err(PreprocessingError::InvalidConfiguration(format!(
                "cannot drop the reaction column '{}'",
                name
            )));
        }
        self.frame = self.frame.drop(name)?;
        Ok(())
    }

    /// Use another existing column as the reaction column.
    pub fn with_reaction_column(self, name: &str) -> Result<Self> {
        Self::new(self.frame, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_csv_with_crlf() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.csv", "rxn,id\r\nCC>>O,1\r\nN>>C,2\r\n");
        let dataset = Dataset::read_csv(&path, "rxn").unwrap();
        assert_eq!(dataset.reactions().unwrap(), vec!["CC>>O", "N>>C"]);
        assert_eq!(
            dataset.string_column("id").unwrap(),
            vec![Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[test]
    fn test_read_keeps_values_as_strings() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.csv", "rxn,yield\nCC>>O,007\n");
        let dataset = Dataset::read_csv(&path, "rxn").unwrap();
        assert_eq!(dataset.string_column("yield").unwrap(), vec![Some("007".to_string())]);
    }

    #[test]
    fn test_read_tsv_and_txt() {
        let dir = TempDir::new().unwrap();
        let tsv = write(&dir, "in.tsv", "rxn\tid\nCC>>O\t1\n");
        let dataset = Dataset::read(&tsv, InputFormat::Tsv, "rxn").unwrap();
        assert_eq!(dataset.height(), 1);

        let txt = write(&dir, "in.txt", "CC>>O\r\n\nN>>C\n");
        let dataset = Dataset::read(&txt, InputFormat::Txt, "rxn").unwrap();
        assert_eq!(dataset.reactions().unwrap(), vec!["CC>>O", "N>>C"]);
    }

    #[test]
    fn test_missing_reaction_column() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.csv", "smiles\nCC>>O\n");
        let err = Dataset::read_csv(&path, "rxn").unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut dataset =
            Dataset::from_reactions("rxn", vec!["CC>>O".into(), "N>>C".into(), "O>>O".into()])
                .unwrap();
        dataset.set_column("id", vec!["a".into(), "b".into(), "c,d".into()]).unwrap();

        let filtered = dataset.filter_rows(&[true, false, true]).unwrap();
        let path = dir.path().join("nested/out.csv");
        filtered.write_csv(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains('\r'));

        let back = Dataset::read_csv(&path, "rxn").unwrap();
        assert_eq!(back.reactions().unwrap(), vec!["CC>>O", "O>>O"]);
        assert_eq!(back.string_column("id").unwrap()[1], Some("c,d".to_string()));
    }

    #[test]
    fn test_take_rows_repeats() {
        let dataset = Dataset::from_reactions("rxn", vec!["A>>B".into(), "C>>D".into()]).unwrap();
        let taken = dataset.take_rows(&[1, 1, 0]).unwrap();
        assert_eq!(taken.reactions().unwrap(), vec!["C>>D", "C>>D", "A>>B"]);
    }

    #[test]
    fn test_rename_reaction_column() {
        let mut dataset = Dataset::from_reactions("rxn", vec!["A>>B".into()]).unwrap();
        dataset.rename_column("rxn", "rxn_original").unwrap();
        assert_eq!(dataset.reaction_column(), "rxn_original");
        assert!(!dataset.has_column("rxn"));
    }

    #[test]
    fn test_input_format_from_path() {
        assert_eq!(InputFormat::from_path(Path::new("a.txt")), InputFormat::Txt);
        assert_eq!(InputFormat::from_path(Path::new("a.TSV")), InputFormat::Tsv);
        assert_eq!(InputFormat::from_path(Path::new("a.csv")), InputFormat::Csv);
    }
}
