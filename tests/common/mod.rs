//! 测试用的脚本化页面
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nfse_batch::services::DiagnosticsWriter;
use nfse_batch::{
    ActionOutcome, AppResult, Config, DataPolicy, DriverOptions, FailureKind, InvoiceFlow,
    PageActions, PageIntent, RecordStore, StepExecutor, WaitPolicy,
};

type SearchHook = Box<dyn Fn(&str) + Send + Sync>;

/// 按识别号预先设定每一步结果的假页面
#[derive(Default)]
pub struct ScriptedPage {
    /// 识别号 → (失败的步骤名, 失败信息)
    failures: HashMap<String, (&'static str, String)>,
    /// 识别号 → 开具后页面显示的文本
    banners: HashMap<String, String>,
    /// 在这些识别号的查询步骤 panic
    panics: Vec<String>,
    reset_fails: bool,
    on_search: Option<SearchHook>,
    current: Mutex<String>,
    calls: Mutex<Vec<String>>,
    pub hard_resets: AtomicUsize,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, key: &str, step: &'static str, message: &str) -> Self {
        self.failures
            .insert(key.to_string(), (step, message.to_string()));
        self
    }

    pub fn banner(mut self, key: &str, text: &str) -> Self {
        self.banners.insert(key.to_string(), text.to_string());
        self
    }

    pub fn panic_on(mut self, key: &str) -> Self {
        self.panics.push(key.to_string());
        self
    }

    pub fn reset_fails(mut self) -> Self {
        self.reset_fails = true;
        self
    }

    pub fn on_search(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_search = Some(Box::new(hook));
        self
    }

    /// 所有调用，格式为 `<步骤>:<识别号>`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, key: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.ends_with(&format!(":{}", key)))
            .map(|c| c.split(':').next().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl PageActions for ScriptedPage {
    async fn perform(&self, intent: &PageIntent) -> AppResult<ActionOutcome> {
        if let PageIntent::SearchTaxpayer { taxpayer_id } = intent {
            *self.current.lock().unwrap() = taxpayer_id.clone();
            if let Some(hook) = &self.on_search {
                hook(taxpayer_id);
            }
            if self.panics.contains(taxpayer_id) {
                panic!("sessão perdida");
            }
        }
        let key = self.current.lock().unwrap().clone();
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", intent.name(), key));

        if let Some((step, message)) = self.failures.get(&key) {
            if *step == intent.name() {
                return Ok(ActionOutcome::failed(FailureKind::AssertionFailed, message.clone()));
            }
        }

        let outcome = match intent {
            PageIntent::SearchTaxpayer { .. } => ActionOutcome::done_with("Fulano de Tal"),
            PageIntent::Submit => match self.banners.get(&key) {
                Some(text) => ActionOutcome::done_with(text.clone()),
                None => ActionOutcome::done(),
            },
            PageIntent::ResetForm if self.reset_fails => {
                ActionOutcome::failed(FailureKind::ElementNotFound, "sem botão Nova")
            }
            _ => ActionOutcome::done(),
        };
        Ok(outcome)
    }

    async fn is_busy(&self) -> AppResult<bool> {
        Ok(false)
    }

    async fn screenshot(&self) -> AppResult<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn markup(&self) -> AppResult<String> {
        Ok(String::new())
    }

    async fn hard_reset(&self) -> AppResult<()> {
        self.hard_resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn fast_policy() -> WaitPolicy {
    WaitPolicy {
        busy_timeout: Duration::from_millis(20),
        amount_timeout: Duration::from_millis(20),
        submit_timeout: Duration::from_millis(20),
        poll_interval: Duration::from_millis(1),
    }
}

pub fn flow() -> InvoiceFlow {
    let executor = StepExecutor::new(
        fast_policy(),
        DataPolicy::WarnAndContinue,
        DiagnosticsWriter::disabled(),
    );
    InvoiceFlow::with_executor(executor, &Config::default())
}

pub fn options(checkpoint_interval: usize) -> DriverOptions {
    DriverOptions {
        checkpoint_interval,
        pause_between_records: Duration::ZERO,
    }
}

/// 写一个 CSV 文件并加载
pub fn store_from(path: &Path, content: &str) -> RecordStore {
    std::fs::write(path, content).unwrap();
    RecordStore::load(path, b',', "CPF").unwrap()
}

/// 统计文件中状态为 EMITIDA 或 ERRO 的行数
pub fn processed_rows_on_disk(path: &Path) -> usize {
    let store = RecordStore::load(path, b',', "CPF").unwrap();
    store
        .records()
        .iter()
        .filter(|r| r.status() != nfse_batch::RecordStatus::Pending)
        .count()
}
