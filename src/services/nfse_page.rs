//! NFS-e 开具页面 - 业务能力层
//!
//! 用 `JsExecutor` 在页面里执行脚本来完成每个 `PageIntent`。
//! 选择器、等待时间等都是针对当前版本页面（PrimeFaces）调出来的常量，
//! 页面改版时只需要改这里。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, PageError};
use crate::infrastructure::{ActionOutcome, FailureKind, JsExecutor, PageActions, PageIntent};

const CPF_INPUT_ID: &str = "formNotaFiscal:idCpfCnpjPessoa:idInputMaskCpfCnpj:inputText";
const ACTIVITY_DROPDOWN_ID: &str = "formNotaFiscal:idAtividadeEmissor";
const BUSY_SELECTOR: &str = ".ui-blockui, .ui-blockui-content";

/// 所有脚本共用的辅助函数
const JS_PRELUDE: &str = r#"
const sleep = (ms) => new Promise(r => setTimeout(r, ms));
const byXPath = (xpath, root) => document.evaluate(
    xpath, root || document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null
).singleNodeValue;
const visible = (el) => !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
const waitFor = async (find, timeoutMs) => {
    const deadline = Date.now() + timeoutMs;
    while (Date.now() < deadline) {
        const el = find();
        if (el) return el;
        await sleep(250);
    }
    return null;
};
const fail = (kind, message) => ({ ok: false, kind, message });
const done = (text) => ({ ok: true, text: text == null ? null : String(text) });
const clickEl = (el) => { el.scrollIntoView({ block: 'center' }); el.click(); };
"#;

/// 页面脚本的统一返回格式
#[derive(Debug, Deserialize)]
struct ScriptResult {
    ok: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<ScriptResult> for ActionOutcome {
    fn from(result: ScriptResult) -> Self {
        if result.ok {
            ActionOutcome::Done { text: result.text }
        } else {
            ActionOutcome::Failed {
                kind: FailureKind::from_code(result.kind.as_deref().unwrap_or_default()),
                message: result
                    .message
                    .unwrap_or_else(|| "页面脚本未返回错误信息".to_string()),
            }
        }
    }
}

/// NFS-e 开具页面
pub struct NfsePage {
    executor: JsExecutor,
    target_url: String,
}

impl NfsePage {
    pub fn new(executor: JsExecutor, target_url: impl Into<String>) -> Self {
        Self {
            executor,
            target_url: target_url.into(),
        }
    }

    async fn run_script(&self, body: String) -> AppResult<ActionOutcome> {
        let js_code = format!(
            "(async () => {{ {prelude}\ntry {{ {body} }} catch (e) {{ return fail('unexpected_state', String(e && e.message || e)); }} }})()",
            prelude = JS_PRELUDE,
            body = body
        );
        let value = self.executor.eval(js_code).await?;
        debug!("页面脚本返回: {}", value);
        let result: ScriptResult = serde_json::from_value(value.clone())
            .map_err(|_| AppError::Page(PageError::UnexpectedResponse(value.to_string())))?;
        Ok(result.into())
    }
}

#[async_trait]
impl PageActions for NfsePage {
    async fn perform(&self, intent: &PageIntent) -> AppResult<ActionOutcome> {
        let body = match intent {
            PageIntent::SearchTaxpayer { taxpayer_id } => search_taxpayer_js(taxpayer_id)?,
            PageIntent::SelectActivity { code } => select_activity_js(code)?,
            PageIntent::AttachDescription => attach_description_js(),
            PageIntent::EnterAmount { amount } => enter_amount_js(*amount)?,
            PageIntent::Submit => submit_js(),
            PageIntent::ResetForm => reset_form_js(),
        };
        self.run_script(body).await
    }

    async fn is_busy(&self) -> AppResult<bool> {
        let js_code = format!(
            "(() => Array.from(document.querySelectorAll({selector})).some(el => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length)))()",
            selector = serde_json::to_string(BUSY_SELECTOR)?
        );
        self.executor.eval_as::<bool>(js_code).await
    }

    async fn screenshot(&self) -> AppResult<Vec<u8>> {
        self.executor.screenshot().await
    }

    async fn markup(&self) -> AppResult<String> {
        self.executor.content().await
    }

    async fn hard_reset(&self) -> AppResult<()> {
        warn!("    ↻ 重新加载开具页面");
        if let Err(e) = self.executor.reload().await {
            warn!("    ⚠️ 刷新失败 ({})，重新导航", e);
            self.executor.goto(&self.target_url).await?;
        }
        Ok(())
    }
}

// ========== 各步骤的页面脚本 ==========

fn search_taxpayer_js(taxpayer_id: &str) -> AppResult<String> {
    Ok(format!(
        r#"
        window.scrollTo(0, 400);
        const input = document.getElementById({input_id});
        if (!input) return fail('element_not_found', '找不到识别号输入框');
        input.focus();
        input.value = '';
        input.value = {taxpayer_id};
        input.dispatchEvent(new Event('input', {{ bubbles: true }}));
        input.dispatchEvent(new Event('change', {{ bubbles: true }}));
        input.blur();
        await sleep(1000);
        const btn = byXPath("//a[contains(@class, 'btn-success') and contains(@onclick, 'dados-pessoa') and .//i[contains(@class, 'pe-7s-search')]]");
        if (!btn) return fail('element_not_found', '找不到查询按钮');
        btn.click();
        await sleep(3000);
        const name = byXPath("//input[contains(@id, 'nomeEmpresarial') or contains(@id, 'nome')]");
        return done(name ? name.value : null);
        "#,
        input_id = serde_json::to_string(CPF_INPUT_ID)?,
        taxpayer_id = serde_json::to_string(taxpayer_id)?,
    ))
}

fn select_activity_js(code: &str) -> AppResult<String> {
    Ok(format!(
        r#"
        window.scrollTo(0, 1000);
        const dropdown = await waitFor(() => document.getElementById({dropdown_id}), 10000);
        if (!dropdown) return fail('element_not_found', '找不到活动下拉框');
        for (let i = 0; i < 10 && dropdown.getAttribute('aria-disabled') === 'true'; i++) {{
            await sleep(1000);
        }}
        const trigger = dropdown.querySelector('.ui-selectonemenu-trigger') || dropdown;
        clickEl(trigger);
        const list = await waitFor(() => {{
            const ul = document.getElementById({items_id});
            return visible(ul) ? ul : null;
        }}, 10000);
        if (!list) return fail('unexpected_state', '活动选项列表没有出现');
        const code = {code};
        const option = Array.from(list.querySelectorAll('li')).find(li =>
            (li.getAttribute('data-label') || '').includes(code) || li.textContent.includes(code));
        if (!option) return fail('element_not_found', '找不到活动 ' + code);
        clickEl(option);
        await sleep(2000);
        const selected = document.getElementById({input_id});
        return done(selected ? selected.value : option.textContent.trim());
        "#,
        dropdown_id = serde_json::to_string(ACTIVITY_DROPDOWN_ID)?,
        items_id = serde_json::to_string(&format!("{}_items", ACTIVITY_DROPDOWN_ID))?,
        input_id = serde_json::to_string(&format!("{}_input", ACTIVITY_DROPDOWN_ID))?,
        code = serde_json::to_string(code)?,
    ))
}

fn attach_description_js() -> String {
    r#"
    window.scrollTo(0, 1600);
    const btn = byXPath("//a[contains(@class, 'btn-warning') and (contains(., 'Carregar') or contains(., 'Descrição'))]")
        || byXPath("//a[.//i[contains(@class, 'fa-plus-circle')]]");
    if (!btn) return fail('element_not_found', '找不到"载入描述"按钮');
    clickEl(btn);
    await waitFor(() => byXPath("//div[contains(@class, 'ui-dialog')]//h3[contains(., 'Descrição Favorita')]"), 10000);
    const checkbox = await waitFor(() =>
        byXPath("//div[contains(@class, 'ui-datatable')]//div[@role='checkbox' and contains(@class, 'ui-chkbox-box')]")
        || Array.from(document.querySelectorAll('div.ui-chkbox-box.ui-state-default')).find(visible), 10000);
    if (!checkbox) return fail('element_not_found', '找不到描述复选框');
    clickEl(checkbox);
    await sleep(1000);
    const confirm = byXPath("//a[contains(@class, 'btn-success') and contains(@class, 'dialogselect_save')]")
        || byXPath("//a[contains(@class, 'btn-success') and (contains(., 'Confirmar') or .//i[contains(@class, 'fa-save')])]");
    if (!confirm) return fail('element_not_found', '找不到"确认"按钮');
    clickEl(confirm);
    await sleep(2000);
    return done(null);
    "#
    .to_string()
}

fn enter_amount_js(amount: f64) -> AppResult<String> {
    Ok(format!(
        r#"
        window.scrollTo(0, 2000);
        const field = byXPath("//input[contains(@id, 'idValorServicos') or contains(@id, 'valorServicos')]")
            || byXPath("//label[contains(text(), 'Valor')]/following::input[1]");
        if (!field) return fail('element_not_found', '找不到金额输入框');
        field.scrollIntoView({{ block: 'center' }});
        field.focus();
        field.value = '';
        field.value = {formatted};
        field.dispatchEvent(new Event('input', {{ bubbles: true }}));
        field.dispatchEvent(new Event('change', {{ bubbles: true }}));
        field.blur();
        await sleep(1000);
        if (!field.value) return fail('assertion_failed', '金额没有写入输入框');
        return done(field.value);
        "#,
        formatted = serde_json::to_string(&format_amount(amount))?,
    ))
}

fn submit_js() -> String {
    r#"
    window.scrollTo(0, document.body.scrollHeight);
    const btn = byXPath("//button[contains(@id, 'btnEmitir') or (contains(., 'Emitir') and contains(@class, 'btn'))]")
        || byXPath("//a[contains(., 'Emitir') and contains(@class, 'btn')]");
    if (!btn) return fail('element_not_found', '找不到"开具"按钮');
    clickEl(btn);
    const banner = await waitFor(() => byXPath("//*[contains(text(), 'emitida') or contains(text(), 'Emitida')]"), 15000);
    if (!banner) {
        const error = byXPath("//*[contains(@class, 'ui-messages-error') or contains(@class, 'ui-message-error')]");
        if (error && error.textContent.trim()) return fail('assertion_failed', error.textContent.trim());
        return done(null);
    }
    return done(banner.textContent.trim());
    "#
    .to_string()
}

fn reset_form_js() -> String {
    r#"
    const btn = byXPath("//button[contains(., 'Nova') or contains(., 'Limpar')] | //a[contains(., 'Nova') or contains(., 'Limpar')]");
    if (!btn) return fail('element_not_found', '找不到"新建/清空"按钮');
    clickEl(btn);
    await sleep(3000);
    return done(null);
    "#
    .to_string()
}

/// 页面使用巴西格式：两位小数、逗号分隔
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount).replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amounts_use_decimal_comma() {
        assert_eq!(format_amount(110.0), "110,00");
        assert_eq!(format_amount(1234.5), "1234,50");
    }

    #[test]
    fn script_failure_maps_kind() {
        let result: ScriptResult = serde_json::from_value(json!({
            "ok": false,
            "kind": "element_not_found",
            "message": "找不到金额输入框"
        }))
        .unwrap();

        assert_eq!(
            ActionOutcome::from(result),
            ActionOutcome::failed(FailureKind::ElementNotFound, "找不到金额输入框")
        );
    }

    #[test]
    fn script_success_keeps_text() {
        let result: ScriptResult =
            serde_json::from_value(json!({ "ok": true, "text": "NFS-e 123 emitida" })).unwrap();
        assert_eq!(
            ActionOutcome::from(result),
            ActionOutcome::done_with("NFS-e 123 emitida")
        );
    }

    #[test]
    fn taxpayer_id_is_escaped_in_script() {
        let js = search_taxpayer_js("12'3\"4").unwrap();
        assert!(js.contains(r#""12'3\"4""#));
    }
}
