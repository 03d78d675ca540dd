use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::models::loaders::table::RawRow;

/// 读取 CSV 文件的表头与所有数据行
///
/// 行宽不一致的文件照常读取，多余或缺少的单元格由上层处理。
pub fn read_rows(path: &Path, delimiter: u8) -> AppResult<(Vec<String>, Vec<RawRow>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AppError::file_read_failed(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| AppError::file_read_failed(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| AppError::file_read_failed(path, e))?;
        // 表头占第 1 行
        let line = row
            .position()
            .map(|position| position.line() as usize)
            .unwrap_or(index + 2);
        rows.push(RawRow {
            line,
            cells: row.iter().map(str::to_string).collect(),
        });
    }

    Ok((headers, rows))
}

/// 生成 CSV 内容（整表快照）
pub fn render(headers: &[String], rows: &[Vec<String>], delimiter: u8) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(Vec::new());

    let to_other = |e: csv::Error| AppError::Other(format!("CSV 生成失败: {}", e));

    writer.write_record(headers).map_err(to_other)?;
    for row in rows {
        writer.write_record(row).map_err(to_other)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Other(format!("CSV 生成失败: {}", e)))
}
