//! 记录处理上下文
//!
//! 封装"我正在处理第几条记录、它的识别号是什么"这一信息

use std::fmt::Display;

/// 记录处理上下文
#[derive(Debug, Clone)]
pub struct RecordCtx {
    /// 记录序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 记录总数
    pub total: usize,

    /// 原始识别号（用于日志和诊断文件名）
    pub key: String,
}

impl RecordCtx {
    pub fn new(index: usize, total: usize, key: impl Into<String>) -> Self {
        Self {
            index,
            total,
            key: key.into(),
        }
    }
}

impl Display for RecordCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[记录 {}/{} CPF#{}]", self.index, self.total, self.key)
    }
}
