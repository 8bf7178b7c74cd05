use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Serialises `rows` into a `;`-separated CSV file with a header line, creating parent directories.
pub fn write_csv_file<T: Serialize>(file_path: &str, rows: &[T]) -> Result<()> {
    if let Some(parent) = Path::new(file_path).parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    write_csv(File::create(file_path)?, rows)
}

pub fn write_csv<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);

    for row in rows {
        csv_writer.serialize(row)?;
    }

    csv_writer.flush()?;
    Ok(())
}
