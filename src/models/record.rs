//! 单条待开具记录
//!
//! 输入字段按原表格列顺序保存，控制字段（状态、票号、开具时间、错误信息）
//! 只能通过 `mark_emitted` / `mark_failed` 成对修改。

use std::fmt::Display;

use chrono::NaiveDateTime;

/// `Data_Emissao` 列的格式
pub const ISSUED_AT_FORMAT: &str = "%d/%m/%Y %H:%M";

/// 页面没有给出票号时写入的占位值
pub const REFERENCE_SENTINEL: &str = "Emitida";

/// 失败记录缺少错误信息时补上的说明
const MISSING_ERROR_MESSAGE: &str = "错误信息缺失";

/// 记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStatus {
    /// 尚未处理（或上次运行前就没有结果）
    #[default]
    Pending,
    /// 已开具
    Emitted,
    /// 开具失败，下次运行会重新处理
    Failed,
}

impl RecordStatus {
    /// 写回表格时使用的文本
    pub fn as_cell(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "",
            RecordStatus::Emitted => "EMITIDA",
            RecordStatus::Failed => "ERRO",
        }
    }

    /// 从表格文本解析，无法识别的内容视为待处理
    pub fn from_cell(cell: &str) -> Self {
        match cell.trim().to_ascii_uppercase().as_str() {
            "EMITIDA" | "EMITTED" => RecordStatus::Emitted,
            "ERRO" | "FAILED" => RecordStatus::Failed,
            _ => RecordStatus::Pending,
        }
    }
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "PENDING"),
            RecordStatus::Emitted => write!(f, "EMITTED"),
            RecordStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// 一行工作数据
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 纳税人识别号
    key: String,
    /// 输入字段（列名, 值），不含控制列
    fields: Vec<(String, String)>,
    status: RecordStatus,
    issued_reference: Option<String>,
    issued_at: Option<NaiveDateTime>,
    error_message: Option<String>,
}

impl Record {
    /// 创建一条待处理记录
    pub fn new(key: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            key: key.into(),
            fields,
            status: RecordStatus::Pending,
            issued_reference: None,
            issued_at: None,
            error_message: None,
        }
    }

    /// 从表格恢复记录，控制字段按原样保留
    pub(crate) fn restore(
        key: String,
        fields: Vec<(String, String)>,
        status: RecordStatus,
        issued_reference: Option<String>,
        issued_at: Option<NaiveDateTime>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            key,
            fields,
            status,
            issued_reference,
            issued_at,
            error_message,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 去掉 `.`、`-`、`/` 后的识别号
    pub fn normalized_key(&self) -> String {
        self.key
            .chars()
            .filter(|c| !matches!(c, '.' | '-' | '/'))
            .collect::<String>()
            .trim()
            .to_string()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn issued_reference(&self) -> Option<&str> {
        self.issued_reference.as_deref()
    }

    pub fn issued_at(&self) -> Option<NaiveDateTime> {
        self.issued_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_emitted(&self) -> bool {
        self.status == RecordStatus::Emitted
    }

    /// 标记为已开具，同时清除错误信息
    pub fn mark_emitted(&mut self, reference: impl Into<String>, issued_at: NaiveDateTime) {
        self.status = RecordStatus::Emitted;
        self.issued_reference = Some(reference.into());
        self.issued_at = Some(issued_at);
        self.error_message = None;
    }

    /// 标记为失败，同时清除票号和开具时间
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = RecordStatus::Failed;
        self.issued_reference = None;
        self.issued_at = None;
        self.error_message = Some(reason.into());
    }

    /// 状态与控制字段是否一致
    ///
    /// EMITTED ⇔ 票号与开具时间都存在；FAILED ⇔ 错误信息存在。
    pub fn is_consistent(&self) -> bool {
        let emitted = self.status == RecordStatus::Emitted;
        let failed = self.status == RecordStatus::Failed;
        emitted == (self.issued_reference.is_some() && self.issued_at.is_some())
            && emitted == (self.issued_reference.is_some() || self.issued_at.is_some())
            && failed == self.error_message.is_some()
    }

    /// 修复从表格读入的不一致控制字段，返回修改说明（已一致时为空）
    ///
    /// 已有票号或开具时间的记录一律按已开具处理，不会重新排队。
    pub(crate) fn repair_control_fields(&mut self, loaded_at: NaiveDateTime) -> Vec<&'static str> {
        let mut notes = Vec::new();

        if self.status == RecordStatus::Pending
            && (self.issued_reference.is_some() || self.issued_at.is_some())
        {
            self.status = RecordStatus::Emitted;
            notes.push("状态为空但已有开具信息，按已开具处理");
        }

        match self.status {
            RecordStatus::Emitted => {
                if self.issued_reference.is_none() {
                    self.issued_reference = Some(REFERENCE_SENTINEL.to_string());
                    notes.push("票号缺失，填入占位值");
                }
                if self.issued_at.is_none() {
                    self.issued_at = Some(loaded_at);
                    notes.push("开具时间缺失，记为加载时间");
                }
                if self.error_message.take().is_some() {
                    notes.push("清除残留的错误信息");
                }
            }
            RecordStatus::Failed => {
                let had_reference = self.issued_reference.take().is_some();
                let had_issued_at = self.issued_at.take().is_some();
                if had_reference || had_issued_at {
                    notes.push("清除残留的票号和开具时间");
                }
                if self.error_message.is_none() {
                    self.error_message = Some(MISSING_ERROR_MESSAGE.to_string());
                    notes.push("补上错误信息");
                }
            }
            RecordStatus::Pending => {
                if self.error_message.take().is_some() {
                    notes.push("清除残留的错误信息");
                }
            }
        }

        notes
    }

    pub fn issued_at_cell(&self) -> String {
        self.issued_at
            .map(|at| at.format(ISSUED_AT_FORMAT).to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn mark_failed_clears_issue_fields() {
        let mut record = Record::new("123.456.789-00", vec![]);
        record.mark_emitted("991", at());
        record.mark_failed("invalid amount");

        assert_eq!(record.status(), RecordStatus::Failed);
        assert_eq!(record.issued_reference(), None);
        assert_eq!(record.issued_at(), None);
        assert_eq!(record.error_message(), Some("invalid amount"));
        assert!(record.is_consistent());
    }

    #[test]
    fn mark_emitted_clears_error() {
        let mut record = Record::new("1", vec![]);
        record.mark_failed("boom");
        record.mark_emitted("12345", at());

        assert_eq!(record.error_message(), None);
        assert_eq!(record.issued_at_cell(), "14/03/2025 09:30");
        assert!(record.is_consistent());
    }

    #[test]
    fn pending_record_is_consistent() {
        assert!(Record::new("1", vec![]).is_consistent());
    }

    #[test]
    fn restored_emitted_without_reference_is_inconsistent() {
        let record = Record::restore(
            "1".into(),
            vec![],
            RecordStatus::Emitted,
            None,
            None,
            None,
        );
        assert!(!record.is_consistent());
    }

    #[test]
    fn emitted_without_reference_is_repaired_not_requeued() {
        let mut record = Record::restore(
            "1".into(),
            vec![],
            RecordStatus::Emitted,
            None,
            None,
            Some("old".into()),
        );

        let notes = record.repair_control_fields(at());

        assert_eq!(notes.len(), 3);
        assert!(record.is_emitted());
        assert_eq!(record.issued_reference(), Some(REFERENCE_SENTINEL));
        assert_eq!(record.issued_at(), Some(at()));
        assert_eq!(record.error_message(), None);
        assert!(record.is_consistent());
    }

    #[test]
    fn blank_status_with_reference_counts_as_emitted() {
        let mut record = Record::restore(
            "1".into(),
            vec![],
            RecordStatus::Pending,
            Some("4455".into()),
            None,
            None,
        );

        record.repair_control_fields(at());

        assert!(record.is_emitted());
        assert_eq!(record.issued_reference(), Some("4455"));
        assert!(record.is_consistent());
    }

    #[test]
    fn failed_without_message_gets_one() {
        let mut record = Record::restore(
            "1".into(),
            vec![],
            RecordStatus::Failed,
            Some("9".into()),
            None,
            None,
        );

        record.repair_control_fields(at());

        assert_eq!(record.status(), RecordStatus::Failed);
        assert_eq!(record.issued_reference(), None);
        assert_eq!(record.error_message(), Some(MISSING_ERROR_MESSAGE));
        assert!(record.is_consistent());
    }

    #[test]
    fn consistent_record_needs_no_repair() {
        let mut record = Record::new("1", vec![]);
        record.mark_emitted("77", at());
        assert!(record.repair_control_fields(at()).is_empty());
    }

    #[test]
    fn key_normalization_strips_punctuation() {
        let record = Record::new("12.345.678/0001-90", vec![]);
        assert_eq!(record.normalized_key(), "12345678000190");
    }

    #[test]
    fn status_cells_are_case_insensitive() {
        assert_eq!(RecordStatus::from_cell("emitida"), RecordStatus::Emitted);
        assert_eq!(RecordStatus::from_cell(" ERRO "), RecordStatus::Failed);
        assert_eq!(RecordStatus::from_cell("nan"), RecordStatus::Pending);
        assert_eq!(RecordStatus::from_cell(""), RecordStatus::Pending);
    }
}
