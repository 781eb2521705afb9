//! Single-sheet workbook output.

use crate::utils::error::Result;
use rust_xlsxwriter::{Format, Workbook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat {
    General,
    /// Stored and shown as text (`@`), so long barcodes keep every digit.
    Text,
    /// Fixed two decimals (`0.00`).
    Fixed2,
}

impl CellFormat {
    fn format(&self) -> Format {
        match self {
            CellFormat::General => Format::new(),
            CellFormat::Text => Format::new().set_num_format("@"),
            CellFormat::Fixed2 => Format::new().set_num_format("0.00"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub title: String,
    pub width: f64,
    pub format: CellFormat,
}

impl Column {
    pub fn new(title: impl Into<String>, width: f64, format: CellFormat) -> Self {
        Self {
            title: title.into(),
            width,
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

/// Serializes the sheet into an in-memory `.xlsx` file with a bold, frozen header row.
pub fn write_workbook(sheet: &Sheet) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name(&sheet.name)?;

    let header = Format::new().set_bold();
    let formats: Vec<Format> = sheet.columns.iter().map(|c| c.format.format()).collect();

    for (c, column) in sheet.columns.iter().enumerate() {
        let col = c as u16;
        worksheet.set_column_width(col, column.width)?;
        worksheet.set_column_format(col, &formats[c])?;
        worksheet.write_string_with_format(0, col, &column.title, &header)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    let general = Format::new();
    for (r, row) in sheet.rows.iter().enumerate() {
        let row_number = r as u32 + 1;
        for (c, cell) in row.iter().enumerate() {
            let col = c as u16;
            let format = formats.get(c).unwrap_or(&general);
            match cell {
                Cell::Text(text) => {
                    worksheet.write_string_with_format(row_number, col, text, format)?;
                }
                Cell::Number(value) if value.is_finite() => {
                    worksheet.write_number_with_format(row_number, col, *value, format)?;
                }
                Cell::Number(value) => {
                    worksheet.write_string_with_format(
                        row_number,
                        col,
                        value.to_string(),
                        format,
                    )?;
                }
                Cell::Empty => {}
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
