//! The method surface spoken over the gateway, with typed
//! params/payload shapes for each method.
//!
//! Payloads keep a `#[serde(flatten)]` escape hatch where peers are
//! known to attach extension fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CONNECT: &str = "connect";
pub const HEALTH: &str = "health";
pub const STATUS: &str = "status";
pub const CONFIG_GET: &str = "config.get";
pub const CONFIG_SCHEMA: &str = "config.schema";
pub const CONFIG_SET: &str = "config.set";
pub const CONFIG_APPLY: &str = "config.apply";
pub const CHAT_HISTORY: &str = "chat.history";
pub const CHAT_SEND: &str = "chat.send";
pub const CHAT_ABORT: &str = "chat.abort";
pub const SESSIONS_LIST: &str = "sessions.list";
pub const CHANNELS_STATUS: &str = "channels.status";
pub const CRON_LIST: &str = "cron.list";
pub const CRON_ADD: &str = "cron.add";
pub const CRON_RUN: &str = "cron.run";
pub const CRON_PATCH: &str = "cron.patch";
pub const CRON_DELETE: &str = "cron.delete";
pub const CRON_HISTORY: &str = "cron.history";
pub const SKILLS_STATUS: &str = "skills.status";
pub const SKILLS_LIST: &str = "skills.list";
pub const SKILLS_PATCH: &str = "skills.patch";
pub const SKILLS_INSTALL: &str = "skills.install";
pub const NODE_LIST: &str = "node.list";
pub const SYSTEM_PRESENCE: &str = "system-presence";
pub const MODELS_LIST: &str = "models.list";
pub const LOGS_TAIL: &str = "logs.tail";
pub const UPDATE_RUN: &str = "update.run";
pub const EXEC_APPROVAL_RESOLVE: &str = "exec.approval.resolve";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthPayload {
    pub ok: bool,
    pub ts: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StatusPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatAbortParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_level: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SessionsListPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionEntry>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChannelStatus {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChannelsStatusPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<HashMap<String, ChannelStatus>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CronListPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CronAddParams {
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CronRunParams {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CronPatchParams {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CronDeleteParams {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CronHistoryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SkillsListPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SkillsPatchParams {
    pub id: String,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SkillsInstallParams {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NodeListPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ModelsListPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LogsTailParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LogsTailPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSetParams {
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExecApprovalResolveParams {
    pub request_id: String,
    pub allow: bool,
}
