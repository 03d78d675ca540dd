pub mod csv_loader;
pub mod table;
pub mod xlsx_loader;

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::record::Record;

pub use table::{LoadedTable, RowSlot, CONTROL_COLUMNS};

/// 数据文件格式，按扩展名判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv { delimiter: u8 },
    Xlsx,
}

impl TableFormat {
    /// `.xlsx` 按工作簿处理，其他扩展名按 CSV 处理
    pub fn from_path(path: &Path, delimiter: u8) -> Self {
        let is_workbook = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
        if is_workbook {
            TableFormat::Xlsx
        } else {
            TableFormat::Csv { delimiter }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Csv { .. } => "csv",
            TableFormat::Xlsx => "xlsx",
        }
    }
}

/// 加载数据文件
pub fn load_table(path: &Path, format: TableFormat, key_column: &str) -> AppResult<LoadedTable> {
    if !path.exists() {
        return Err(StoreError::NotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    let (headers, rows) = match format {
        TableFormat::Csv { delimiter } => csv_loader::read_rows(path, delimiter)?,
        TableFormat::Xlsx => xlsx_loader::read_rows(path)?,
    };
    table::build_table(headers, rows, key_column)
}

/// 以指定格式整表覆盖写入
pub fn save_table(
    path: &Path,
    format: TableFormat,
    headers: &[String],
    slots: &[RowSlot],
    records: &[Record],
) -> AppResult<()> {
    let rows = table::render_rows(headers, slots, records);
    let bytes = match format {
        TableFormat::Csv { delimiter } => csv_loader::render(headers, &rows, delimiter)?,
        TableFormat::Xlsx => xlsx_loader::render(headers, &rows)?,
    };
    write_atomic(path, &bytes)
}

/// 原子地覆盖写入：先写同目录临时文件，再重命名
pub fn write_atomic(path: &Path, contents: &[u8]) -> AppResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| AppError::file_write_failed(path, e))?;
    temp.write_all(contents)
        .and_then(|_| temp.flush())
        .map_err(|e| AppError::file_write_failed(path, e))?;
    temp.persist(path)
        .map_err(|e| AppError::file_write_failed(path, e.error))?;
    Ok(())
}
