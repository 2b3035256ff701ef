//! Delimited-text matrices for the command-line tool.
//!
//! Files carry no header. `.tsv` files are tab-separated, everything else is
//! comma-separated; lines starting with `#` are skipped. Outputs are written to a
//! temporary file in the target directory and renamed into place.

use ndarray::{Array1, Array2, ArrayView2};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatrixIoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed delimited file: {0}")]
    Csv(#[from] csv::Error),
    #[error("'{path}' row {row}, column {col}: '{value}' is not a number.")]
    NotANumber {
        path: String,
        row: usize,
        col: usize,
        value: String,
    },
    #[error("'{path}' row {row} has {found} columns, but the first row has {expected}.")]
    RaggedRow {
        path: String,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("'{0}' contains no values.")]
    Empty(String),
    #[error("'{path}' has shape {rows}x{cols}; a single row or column was expected.")]
    NotAVector {
        path: String,
        rows: usize,
        cols: usize,
    },
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

/// Reads a numeric matrix.
pub fn read_matrix(path: &Path) -> Result<Array2<f64>, MatrixIoError> {
    let display = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter_for(path))
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut values = Vec::new();
    let mut width = None;
    let mut rows = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let expected = *width.get_or_insert(record.len());
        if record.len() != expected {
            return Err(MatrixIoError::RaggedRow {
                path: display,
                row: row + 1,
                expected,
                found: record.len(),
            });
        }
        for (col, field) in record.iter().enumerate() {
            let value = field
                .parse::<f64>()
                .map_err(|_| MatrixIoError::NotANumber {
                    path: display.clone(),
                    row: row + 1,
                    col: col + 1,
                    value: field.to_string(),
                })?;
            values.push(value);
        }
        rows += 1;
    }

    let cols = width.unwrap_or(0);
    if rows == 0 || cols == 0 {
        return Err(MatrixIoError::Empty(display));
    }
    Array2::from_shape_vec((rows, cols), values)
        .map_err(|_| MatrixIoError::Empty(display))
}

/// Reads a vector stored either as one column or as one row.
pub fn read_vector(path: &Path) -> Result<Array1<f64>, MatrixIoError> {
    let matrix = read_matrix(path)?;
    let (rows, cols) = matrix.dim();
    if rows != 1 && cols != 1 {
        return Err(MatrixIoError::NotAVector {
            path: path.display().to_string(),
            rows,
            cols,
        });
    }
    Ok(matrix.iter().copied().collect())
}

/// Writes a numeric matrix; NaN cells are written as `NaN`.
pub fn write_matrix(path: &Path, matrix: ArrayView2<f64>) -> io::Result<()> {
    let delimiter = delimiter_for(path) as char;
    let mut ryu_buffer = ryu::Buffer::new();
    write_atomically(path, |writer| {
        let mut line = String::with_capacity(matrix.ncols() * 24);
        for row in matrix.rows() {
            line.clear();
            for (col, &value) in row.iter().enumerate() {
                if col > 0 {
                    line.push(delimiter);
                }
                line.push_str(ryu_buffer.format(value));
            }
            writeln!(writer, "{line}")?;
        }
        Ok(())
    })
}

/// Writes a boolean mask as 0/1.
pub fn write_mask(path: &Path, mask: ArrayView2<bool>) -> io::Result<()> {
    let delimiter = delimiter_for(path) as char;
    write_atomically(path, |writer| {
        let mut line = String::with_capacity(mask.ncols() * 2);
        for row in mask.rows() {
            line.clear();
            for (col, &missing) in row.iter().enumerate() {
                if col > 0 {
                    line.push(delimiter);
                }
                line.push(if missing { '1' } else { '0' });
            }
            writeln!(writer, "{line}")?;
        }
        Ok(())
    })
}

/// Writes any text (used for the run summary) through the same temp-and-rename path.
pub fn write_text(path: &Path, text: &str) -> io::Result<()> {
    write_atomically(path, |writer| writer.write_all(text.as_bytes()))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dir.join(format!(".{file_name}.{}.tmp", std::process::id()))
}

fn write_atomically<F>(path: &Path, body: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let temp_path = temp_path_for(path);
    let write_result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        body(&mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}
