//! JS 执行器 - 基础设施层
//!
//! 持有一个 page，只暴露"执行 JS"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};

/// JS 执行器
///
/// 职责：
/// - 持有 Page
/// - 暴露 eval() 能力
/// - 不认识报表 / 会话
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result
            .into_value()
            .map_err(|e| AppError::script_failed(e.to_string()))?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 执行返回 `{ ok, error, value }` 结构的脚本，把 ok=false 转为错误
    pub async fn eval_checked(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.eval(js_code).await?;
        if result.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(result.get("value").cloned().unwrap_or(JsonValue::Null));
        }
        let error = result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        if let Some(selector) = error.strip_prefix("not found: ") {
            return Err(AppError::element_not_found(selector));
        }
        Err(AppError::script_failed(error))
    }
}
