//! # 方法通道桥接层
//!
//! ## 设计思路
//!
//! 移动端宿主通过方法通道 `com.addme/processor` 调用合成能力。桥接层只做
//! “JSON 参数 → `OwnedMergeRequest`”与“结果 / 错误 → JSON 响应”的适配，
//! 不承载业务逻辑，所有实际处理交由 `MergeServiceState`。
//!
//! ## 实现思路
//!
//! - 参数缺失或类型不符统一返回 `INVALID_ARGS`，不进入合成流程。
//! - 合成失败返回 `PROCESS_ERROR`，`details` 携带 `code` / `stage`。
//! - 未知方法返回 `notImplemented`，与宿主侧约定一致。

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::merge::{MergeError, MergeResult, MergeServiceState, OwnedMergeRequest};

/// 通道名称。
pub const CHANNEL: &str = "com.addme/processor";

/// 合成方法名。
pub const METHOD_MERGE_ADD_ME: &str = "mergeAddMe";

/// 宿主发起的一次方法调用。
#[derive(Debug, Clone, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

/// 返回给宿主的响应。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResponse {
    Success {
        result: Map<String, Value>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResponse {
    fn invalid_args(message: impl Into<String>) -> Self {
        Self::Error {
            code: "INVALID_ARGS".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn success(result: &MergeResult) -> Self {
        Self::Success {
            result: result.to_map(),
        }
    }
}

impl From<MergeError> for MethodResponse {
    fn from(error: MergeError) -> Self {
        Self::Error {
            code: "PROCESS_ERROR".to_string(),
            message: error.to_string(),
            details: Some(json!({
                "code": error.code(),
                "stage": error.stage(),
            })),
        }
    }
}

/// 方法通道处理器。
#[derive(Clone, Default)]
pub struct MethodChannel {
    service: MergeServiceState,
}

impl MethodChannel {
    pub fn new(service: MergeServiceState) -> Self {
        Self { service }
    }

    /// 分发一次调用。
    pub async fn handle(&self, call: MethodCall) -> MethodResponse {
        match call.method.as_str() {
            METHOD_MERGE_ADD_ME => self.handle_merge(&call.arguments).await,
            other => {
                log::warn!("⚠️ 未实现的方法：{}", other);
                MethodResponse::NotImplemented
            }
        }
    }

    async fn handle_merge(&self, arguments: &Value) -> MethodResponse {
        let request = match parse_merge_arguments(arguments) {
            Ok(request) => request,
            Err(message) => {
                log::warn!("⚠️ mergeAddMe 参数错误：{}", message);
                return MethodResponse::invalid_args(message);
            }
        };

        if let Some(project_id) = arguments.get("projectId").and_then(Value::as_str) {
            log::info!("🧩 mergeAddMe - project={}", project_id);
        }

        match self.service.merge(request).await {
            Ok(result) => MethodResponse::success(&result),
            Err(e) => {
                log::error!("❌ mergeAddMe 失败 [{}@{}]：{}", e.code(), e.stage(), e);
                MethodResponse::from(e)
            }
        }
    }
}

fn parse_merge_arguments(arguments: &Value) -> Result<OwnedMergeRequest, String> {
    let args = arguments
        .as_object()
        .ok_or_else(|| "arguments 必须是对象".to_string())?;

    Ok(OwnedMergeRequest {
        base_path: required_str(args, "basePath")?,
        add_path: required_str(args, "addPath")?,
        project_dir: required_str(args, "projectDir")?,
        mask_data: mask_bytes(args)?,
        mask_width: required_u32(args, "maskWidth")?,
        mask_height: required_u32(args, "maskHeight")?,
    })
}

fn required_str(args: &Map<String, Value>, key: &str) -> Result<String, String> {
    match args.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(format!("{} 必须是字符串", key)),
        None => Err(format!("缺少参数 {}", key)),
    }
}

fn required_u32(args: &Map<String, Value>, key: &str) -> Result<u32, String> {
    let value = args.get(key).ok_or_else(|| format!("缺少参数 {}", key))?;
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("{} 必须是非负整数", key))
}

/// `maskData` 支持 Base64 字符串或 0~255 整数数组。
fn mask_bytes(args: &Map<String, Value>) -> Result<Vec<u8>, String> {
    match args.get("maskData") {
        Some(Value::String(encoded)) => general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("maskData Base64 解码失败：{}", e)),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or_else(|| "maskData 元素必须是 0~255 的整数".to_string())
            })
            .collect(),
        Some(_) => Err("maskData 必须是 Base64 字符串或整数数组".to_string()),
        None => Err("缺少参数 maskData".to_string()),
    }
}
