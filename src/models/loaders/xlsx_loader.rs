//! Excel 工作簿读写
//!
//! 只读写第一个工作表。写回时所有单元格都写成文本，
//! 避免识别号前导零之类的内容被 Excel 改写。

use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType, Reader};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};

use crate::error::{AppError, AppResult, StoreError};
use crate::models::loaders::table::RawRow;
use crate::models::record::ISSUED_AT_FORMAT;

/// 写回时使用的工作表名
const SHEET_NAME: &str = "Sheet1";

/// 读取第一个工作表的表头与所有数据行
pub fn read_rows(path: &Path) -> AppResult<(Vec<String>, Vec<RawRow>)> {
    let mut workbook = open_workbook_auto(path).map_err(|e| AppError::file_read_failed(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| StoreError::EmptyWorkbook {
            path: path.to_path_buf(),
        })?
        .map_err(|e| AppError::file_read_failed(path, e))?;

    // 工作表可能不是从第 1 行开始
    let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|cells| cells.iter().map(cell_text).collect())
        .unwrap_or_default();
    let rows = rows
        .enumerate()
        .map(|(index, cells)| {
            // 区域按最宽的行对齐，行尾的空单元格不是数据
            let mut cells: Vec<String> = cells.iter().map(cell_text).collect();
            while cells.last().is_some_and(|cell| cell.is_empty()) {
                cells.pop();
            }
            RawRow {
                line: first_line + index + 1,
                cells,
            }
        })
        .collect();

    Ok((headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(|at| at.format(ISSUED_AT_FORMAT).to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}

/// 生成 xlsx 内容（整表快照）
pub fn render(headers: &[String], rows: &[Vec<String>]) -> AppResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME).map_err(xlsx_error)?;

    write_row(worksheet, 0, headers)?;
    for (index, row) in rows.iter().enumerate() {
        write_row(worksheet, index + 1, row)?;
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

fn write_row(worksheet: &mut Worksheet, row: usize, cells: &[String]) -> AppResult<()> {
    let row = u32::try_from(row).map_err(|_| AppError::Other(format!("行号超出范围: {}", row)))?;
    for (col, value) in cells.iter().enumerate() {
        if value.is_empty() {
            continue;
        }
        let col =
            u16::try_from(col).map_err(|_| AppError::Other(format!("列号超出范围: {}", col)))?;
        worksheet
            .write_string(row, col, value.as_str())
            .map_err(xlsx_error)?;
    }
    Ok(())
}

fn xlsx_error(e: XlsxError) -> AppError {
    AppError::Other(format!("xlsx 生成失败: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loaders::{load_table, save_table, TableFormat};
    use crate::models::record::RecordStatus;

    /// 按操作员常见的样子准备一个工作簿：识别号是数字，中间有空行，表头外有备注
    fn operator_workbook(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "CPF").unwrap();
        sheet.write_string(0, 1, "Valor").unwrap();
        sheet.write_number(1, 0, 11122233344.0).unwrap();
        sheet.write_number(1, 1, 110.5).unwrap();
        sheet.write_string(1, 2, "ligar antes").unwrap();
        sheet.write_string(3, 0, "555.666.777-88").unwrap();
        sheet.write_string(3, 1, "95,00").unwrap();
        workbook.save(path).unwrap();
    }

    #[test]
    fn workbook_loads_numbers_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notas_fiscais.xlsx");
        operator_workbook(&path);

        let table = load_table(&path, TableFormat::Xlsx, "CPF").unwrap();

        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].key(), "11122233344");
        assert_eq!(table.records[0].field("Valor"), Some("110.5"));
        assert_eq!(table.records[1].key(), "555.666.777-88");
        assert_eq!(table.records[1].status(), RecordStatus::Pending);
    }

    #[test]
    fn workbook_round_trip_keeps_layout_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notas_fiscais.xlsx");
        operator_workbook(&path);

        let mut table = load_table(&path, TableFormat::Xlsx, "CPF").unwrap();
        let at = chrono::NaiveDate::from_ymd_opt(2025, 5, 2)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        table.records[0].mark_emitted("2024", at);
        save_table(
            &path,
            TableFormat::Xlsx,
            &table.headers,
            &table.slots,
            &table.records,
        )
        .unwrap();

        let reloaded = load_table(&path, TableFormat::Xlsx, "CPF").unwrap();
        assert_eq!(reloaded.headers, table.headers);
        assert_eq!(reloaded.slots, table.slots);
        assert_eq!(reloaded.records[0].status(), RecordStatus::Emitted);
        assert_eq!(reloaded.records[0].issued_reference(), Some("2024"));
        assert_eq!(reloaded.records[0].issued_at(), Some(at));
        assert_eq!(reloaded.records[1].field("Valor"), Some("95,00"));
    }

    #[test]
    fn corrupt_workbook_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrompido.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();

        assert!(load_table(&path, TableFormat::Xlsx, "CPF").is_err());
    }
}
