use crate::adapters::xlsx::{Cell, CellFormat, Sheet};
use crate::utils::error::{ReportError, Result};

/// Renders the same sheet as comma separated text, prices with two decimals.
pub fn write_csv(sheet: &Sheet) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(sheet.columns.iter().map(|c| c.title.as_str()))?;

    for row in &sheet.rows {
        let record: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let format = sheet
                    .columns
                    .get(i)
                    .map(|c| c.format)
                    .unwrap_or(CellFormat::General);
                match (cell, format) {
                    (Cell::Number(value), CellFormat::Fixed2) => format!("{:.2}", value),
                    (Cell::Number(value), _) => value.to_string(),
                    (Cell::Text(text), _) => text.clone(),
                    (Cell::Empty, _) => String::new(),
                }
            })
            .collect();
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| ReportError::IoError(e.into_error()))
}
