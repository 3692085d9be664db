//! Typed wrappers over [`GatewayClient::request`] for the known
//! method surface. Methods whose payloads are free-form hand back raw
//! JSON values.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use opgate_protocol::methods::{
    self, ChatAbortParams, ChatHistoryParams, ChatHistoryPayload, ChatSendParams, ChatSendResult,
    ChannelsStatusPayload, ConfigSetParams, CronAddParams, CronDeleteParams, CronHistoryParams,
    CronListPayload, CronPatchParams, CronRunParams, ExecApprovalResolveParams, HealthPayload,
    LogsTailParams, LogsTailPayload, ModelsListPayload, NodeListPayload, SessionsListPayload,
    SkillsInstallParams, SkillsListPayload, SkillsPatchParams, StatusPayload,
};

use crate::client::GatewayClient;
use crate::error::ClientError;

impl GatewayClient {
    async fn call<P: Serialize>(&self, method: &str, params: &P) -> Result<Value, ClientError> {
        let params = serde_json::to_value(params)
            .map_err(|err| ClientError::Request(format!("invalid params: {err}")))?;
        self.request(method, Some(params)).await
    }

    fn parse<R: DeserializeOwned>(payload: Value) -> Result<R, ClientError> {
        serde_json::from_value(payload)
            .map_err(|err| ClientError::Request(format!("unexpected payload: {err}")))
    }

    pub async fn health(&self) -> Result<HealthPayload, ClientError> {
        Self::parse(self.request(methods::HEALTH, None).await?)
    }

    pub async fn status(&self) -> Result<StatusPayload, ClientError> {
        Self::parse(self.request(methods::STATUS, None).await?)
    }

    pub async fn config_get(&self) -> Result<Value, ClientError> {
        self.request(methods::CONFIG_GET, None).await
    }

    pub async fn config_schema(&self) -> Result<Value, ClientError> {
        self.request(methods::CONFIG_SCHEMA, None).await
    }

    pub async fn config_set(&self, params: &ConfigSetParams) -> Result<(), ClientError> {
        self.call(methods::CONFIG_SET, params).await.map(|_| ())
    }

    pub async fn config_apply(&self) -> Result<(), ClientError> {
        self.request(methods::CONFIG_APPLY, None).await.map(|_| ())
    }

    pub async fn chat_history(
        &self,
        params: &ChatHistoryParams,
    ) -> Result<ChatHistoryPayload, ClientError> {
        Self::parse(self.call(methods::CHAT_HISTORY, params).await?)
    }

    pub async fn chat_send(&self, params: &ChatSendParams) -> Result<ChatSendResult, ClientError> {
        Self::parse(self.call(methods::CHAT_SEND, params).await?)
    }

    pub async fn chat_abort(&self, params: &ChatAbortParams) -> Result<(), ClientError> {
        self.call(methods::CHAT_ABORT, params).await.map(|_| ())
    }

    pub async fn sessions_list(&self) -> Result<SessionsListPayload, ClientError> {
        Self::parse(self.request(methods::SESSIONS_LIST, None).await?)
    }

    pub async fn channels_status(&self) -> Result<ChannelsStatusPayload, ClientError> {
        Self::parse(self.request(methods::CHANNELS_STATUS, None).await?)
    }

    pub async fn cron_list(&self) -> Result<CronListPayload, ClientError> {
        Self::parse(self.request(methods::CRON_LIST, None).await?)
    }

    pub async fn cron_add(&self, params: &CronAddParams) -> Result<Value, ClientError> {
        self.call(methods::CRON_ADD, params).await
    }

    pub async fn cron_run(&self, params: &CronRunParams) -> Result<Value, ClientError> {
        self.call(methods::CRON_RUN, params).await
    }

    pub async fn cron_patch(&self, params: &CronPatchParams) -> Result<Value, ClientError> {
        self.call(methods::CRON_PATCH, params).await
    }

    pub async fn cron_delete(&self, params: &CronDeleteParams) -> Result<(), ClientError> {
        self.call(methods::CRON_DELETE, params).await.map(|_| ())
    }

    pub async fn cron_history(&self, params: &CronHistoryParams) -> Result<Value, ClientError> {
        self.call(methods::CRON_HISTORY, params).await
    }

    pub async fn skills_status(&self) -> Result<Value, ClientError> {
        self.request(methods::SKILLS_STATUS, None).await
    }

    pub async fn skills_list(&self) -> Result<SkillsListPayload, ClientError> {
        Self::parse(self.request(methods::SKILLS_LIST, None).await?)
    }

    pub async fn skills_patch(&self, params: &SkillsPatchParams) -> Result<(), ClientError> {
        self.call(methods::SKILLS_PATCH, params).await.map(|_| ())
    }

    pub async fn skills_install(&self, params: &SkillsInstallParams) -> Result<Value, ClientError> {
        self.call(methods::SKILLS_INSTALL, params).await
    }

    pub async fn node_list(&self) -> Result<NodeListPayload, ClientError> {
        Self::parse(self.request(methods::NODE_LIST, None).await?)
    }

    pub async fn system_presence(&self) -> Result<Value, ClientError> {
        self.request(methods::SYSTEM_PRESENCE, None).await
    }

    pub async fn models_list(&self) -> Result<ModelsListPayload, ClientError> {
        Self::parse(self.request(methods::MODELS_LIST, None).await?)
    }

    pub async fn logs_tail(&self, params: &LogsTailParams) -> Result<LogsTailPayload, ClientError> {
        Self::parse(self.call(methods::LOGS_TAIL, params).await?)
    }

    pub async fn update_run(&self) -> Result<Value, ClientError> {
        self.request(methods::UPDATE_RUN, None).await
    }

    pub async fn exec_approval_resolve(
        &self,
        params: &ExecApprovalResolveParams,
    ) -> Result<(), ClientError> {
        self.call(methods::EXEC_APPROVAL_RESOLVE, params)
            .await
            .map(|_| ())
    }
}
