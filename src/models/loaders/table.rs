//! 表格与记录之间的转换
//!
//! 读入的每一行都会原样写回：控制列由记录决定，其余单元格按位置保留，
//! 超出表头的单元格和空白行也不会丢失。

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::error::{AppResult, StoreError};
use crate::models::record::{Record, RecordStatus, ISSUED_AT_FORMAT};

pub const STATUS_COLUMN: &str = "Status";
pub const REFERENCE_COLUMN: &str = "Numero_Nota";
pub const ISSUED_AT_COLUMN: &str = "Data_Emissao";
pub const ERROR_COLUMN: &str = "Mensagem_Erro";

/// 控制列，缺失时按此顺序追加在末尾
pub const CONTROL_COLUMNS: [&str; 4] = [
    STATUS_COLUMN,
    REFERENCE_COLUMN,
    ISSUED_AT_COLUMN,
    ERROR_COLUMN,
];

/// 文件中的一行原始数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 在文件中的行号（从 1 开始，表头是第 1 行）
    pub line: usize,
    pub cells: Vec<String>,
}

/// 数据行在文件中的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSlot {
    /// 一条记录，以及超出表头宽度的单元格
    Record { index: usize, surplus: Vec<String> },
    /// 全部为空的行，按原样写回
    Blank(Vec<String>),
}

/// 读取结果：完整表头（含控制列）、记录与行布局
#[derive(Debug)]
pub struct LoadedTable {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    pub slots: Vec<RowSlot>,
}

/// 表格导出时常见的空值占位
fn clean_cell(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn is_control_column(name: &str) -> bool {
    CONTROL_COLUMNS.contains(&name)
}

/// 把原始行转换成记录
pub fn build_table(
    raw_headers: Vec<String>,
    rows: Vec<RawRow>,
    key_column: &str,
) -> AppResult<LoadedTable> {
    let mut headers: Vec<String> = raw_headers
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    // 末尾的空表头不算列，对应的单元格按多余单元格保留
    while headers.last().is_some_and(|h| h.is_empty()) {
        headers.pop();
    }
    let width = headers.len();

    if !headers.iter().any(|h| h == key_column) {
        return Err(StoreError::MissingKeyColumn {
            column: key_column.to_string(),
        }
        .into());
    }

    for column in CONTROL_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            debug!("追加控制列: {}", column);
            headers.push(column.to_string());
        }
    }

    let loaded_at = chrono::Local::now().naive_local();
    let mut records = Vec::new();
    let mut slots = Vec::with_capacity(rows.len());

    for RawRow { line, mut cells } in rows {
        if cells.iter().all(|cell| cell.trim().is_empty()) {
            slots.push(RowSlot::Blank(cells));
            continue;
        }

        let mut surplus = if cells.len() > width {
            cells.split_off(width)
        } else {
            Vec::new()
        };
        while surplus.last().is_some_and(|cell| cell.trim().is_empty()) {
            surplus.pop();
        }
        if !surplus.is_empty() {
            debug!("第 {} 行有 {} 个超出表头的单元格，写回时保留", line, surplus.len());
        }

        let mut record = parse_record(&headers[..width], &cells, key_column, line)?;
        if !record.is_consistent() {
            let notes = record.repair_control_fields(loaded_at);
            warn!("⚠️ 第 {} 行控制字段不一致，已修复: {}", line, notes.join("；"));
        }

        slots.push(RowSlot::Record {
            index: records.len(),
            surplus,
        });
        records.push(record);
    }

    Ok(LoadedTable {
        headers,
        records,
        slots,
    })
}

fn parse_record(
    headers: &[String],
    cells: &[String],
    key_column: &str,
    line: usize,
) -> AppResult<Record> {
    let mut key = String::new();
    let mut fields = Vec::new();
    let mut status = RecordStatus::Pending;
    let mut reference = None;
    let mut issued_at = None;
    let mut error_message = None;

    let padded = cells
        .iter()
        .map(String::as_str)
        .chain(std::iter::repeat(""));
    for (column, cell) in headers.iter().zip(padded) {
        match column.as_str() {
            STATUS_COLUMN => status = RecordStatus::from_cell(cell),
            REFERENCE_COLUMN => reference = clean_cell(cell),
            ISSUED_AT_COLUMN => {
                issued_at = clean_cell(cell)
                    .map(|value| {
                        NaiveDateTime::parse_from_str(&value, ISSUED_AT_FORMAT).map_err(|_| {
                            StoreError::InvalidCell {
                                row: line,
                                column: column.clone(),
                                value,
                            }
                        })
                    })
                    .transpose()?;
            }
            ERROR_COLUMN => error_message = clean_cell(cell),
            _ => {
                if column == key_column {
                    key = cell.trim().to_string();
                }
                fields.push((column.clone(), cell.to_string()));
            }
        }
    }

    Ok(Record::restore(
        key,
        fields,
        status,
        reference,
        issued_at,
        error_message,
    ))
}

/// 生成整表快照的数据行（不含表头）
pub fn render_rows(headers: &[String], slots: &[RowSlot], records: &[Record]) -> Vec<Vec<String>> {
    slots
        .iter()
        .filter_map(|slot| match slot {
            RowSlot::Blank(cells) => Some(cells.clone()),
            RowSlot::Record { index, surplus } => records.get(*index).map(|record| {
                let mut row = render_record(headers, record);
                row.extend(surplus.iter().cloned());
                row
            }),
        })
        .collect()
}

fn render_record(headers: &[String], record: &Record) -> Vec<String> {
    // 输入字段按表头顺序保存，按位置取值，重名列也不会串
    let mut fields = record.fields().iter();
    headers
        .iter()
        .map(|column| match column.as_str() {
            STATUS_COLUMN => record.status().as_cell().to_string(),
            REFERENCE_COLUMN => record.issued_reference().unwrap_or_default().to_string(),
            ISSUED_AT_COLUMN => record.issued_at_cell(),
            ERROR_COLUMN => record.error_message().unwrap_or_default().to_string(),
            other if !is_control_column(other) => match fields.next() {
                Some((name, value)) if name == other => value.clone(),
                _ => record.field(other).unwrap_or_default().to_string(),
            },
            _ => String::new(),
        })
        .collect()
}

/// 每条记录占一行、没有多余单元格的布局
pub fn plain_slots(count: usize) -> Vec<RowSlot> {
    (0..count)
        .map(|index| RowSlot::Record {
            index,
            surplus: Vec::new(),
        })
        .collect()
}
