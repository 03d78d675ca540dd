//! 记录存储
//!
//! 启动时整表加载一次，运行中原地修改，按检查点整表覆盖写回。
//! 主文件不可写（例如被 Excel 锁定）时写到同目录带时间戳的备份文件，
//! 备份与主文件格式相同（CSV 或 xlsx）。

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::models::loaders::{self, LoadedTable, RowSlot, TableFormat};
use crate::models::record::Record;

/// 一次保存的结果
#[derive(Debug)]
pub enum SaveOutcome {
    /// 写入了主文件
    Primary,
    /// 主文件写入失败，已写入备份文件
    Fallback(PathBuf),
    /// 主文件和备份都失败
    Lost,
}

/// 有序的记录集合，顺序即处理顺序
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    format: TableFormat,
    headers: Vec<String>,
    records: Vec<Record>,
    /// 数据行布局（含空白行与多余单元格），写回时按此还原
    slots: Vec<RowSlot>,
}

impl RecordStore {
    /// 从数据文件加载，`.xlsx` 按工作簿读取，其余按 CSV 读取
    pub fn load(path: impl Into<PathBuf>, delimiter: u8, key_column: &str) -> AppResult<Self> {
        let path = path.into();
        let format = TableFormat::from_path(&path, delimiter);
        let LoadedTable {
            headers,
            records,
            slots,
        } = loaders::load_table(&path, format, key_column)?;
        info!("✓ 数据文件已加载: {} 条记录", records.len());

        Ok(Self {
            path,
            format,
            headers,
            records,
            slots,
        })
    }

    /// 用已有的表头和记录构造（不读文件）
    pub fn from_parts(
        path: impl Into<PathBuf>,
        delimiter: u8,
        headers: Vec<String>,
        records: Vec<Record>,
    ) -> Self {
        let path = path.into();
        let mut headers = headers;
        for column in loaders::CONTROL_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
        Self {
            format: TableFormat::from_path(&path, delimiter),
            path,
            headers,
            slots: loaders::table::plain_slots(records.len()),
            records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    /// 覆盖写入指定路径
    pub fn persist_to(&self, path: &Path) -> AppResult<()> {
        loaders::save_table(path, self.format, &self.headers, &self.slots, &self.records)
    }

    /// 覆盖写入主文件
    pub fn persist(&self) -> AppResult<()> {
        self.persist_to(&self.path)
    }

    /// 备份文件路径：主文件所在目录下的 `resultado_backup_<时间戳>.<csv|xlsx>`
    pub fn fallback_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let file_name = format!("resultado_backup_{}.{}", stamp, self.format.extension());
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// 保存；失败时写备份，不向上返回错误
    pub fn save_with_fallback(&self) -> SaveOutcome {
        let primary_error = match self.persist() {
            Ok(()) => return SaveOutcome::Primary,
            Err(e) => e,
        };

        warn!("⚠️ 保存失败: {}", primary_error);
        warn!("请确认数据文件没有被其他程序（例如 Excel）打开");

        let backup = self.fallback_path();
        match self.persist_to(&backup) {
            Ok(()) => {
                info!("✓ 已保存备份: {}", backup.display());
                SaveOutcome::Fallback(backup)
            }
            Err(e) => {
                error!("❌ 备份也保存失败: {}", e);
                SaveOutcome::Lost
            }
        }
    }
}
