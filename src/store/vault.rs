//! Vault KV v2 密钥存储
//!
//! 通过 HTTP API 列举与读取 Vault KV v2 引擎中的密钥，
//! 支持 Token 与 AppRole 两种认证方式以及命名空间。

use crate::config::types::GlobalConfig;
use crate::error::StoreError;
use crate::source::value::StructuredValue;
use crate::store::{SecretDocument, SecretStore, StoreResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Vault 地址环境变量
pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
/// Vault Token 环境变量
pub const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";
/// AppRole RoleId 环境变量
pub const ENV_VAULT_ROLE_ID: &str = "VAULT_ROLEID";
/// AppRole SecretId 环境变量
pub const ENV_VAULT_SECRET_ID: &str = "VAULT_SECRET";
/// 命名空间环境变量
pub const ENV_VAULT_NAMESPACE: &str = "VAULT_NAMESPACE";

/// 默认 Vault 地址
pub const DEFAULT_VAULT_ADDR: &str = "http://localhost:8200";
/// 默认 Token（开发模式）
pub const DEFAULT_VAULT_TOKEN: &str = "root";
/// 默认 KV v2 挂载点
pub const DEFAULT_MOUNT_POINT: &str = "secret";

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Vault 认证方式
#[derive(Clone, PartialEq, Eq)]
pub enum VaultAuth {
    /// 静态 Token
    Token(String),
    /// AppRole 登录
    AppRole { role_id: String, secret_id: String },
}

impl fmt::Debug for VaultAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultAuth::Token(_) => f.write_str("Token(***)"),
            VaultAuth::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &"***")
                .finish(),
        }
    }
}

/// Vault 存储连接参数
#[derive(Debug, Clone)]
pub struct VaultStoreSettings {
    /// Vault 地址
    pub address: String,
    /// 认证方式
    pub auth: VaultAuth,
    /// KV v2 挂载点
    pub mount_point: String,
    /// 命名空间
    pub namespace: Option<String>,
    /// 请求超时
    pub request_timeout: Duration,
    /// 是否跳过 TLS 证书校验
    pub accept_insecure_connection: bool,
}

impl VaultStoreSettings {
    /// 创建使用 Token 认证的连接参数
    pub fn new(address: &str, token: &str, mount_point: &str) -> Self {
        Self {
            address: address.to_string(),
            auth: VaultAuth::Token(token.to_string()),
            mount_point: mount_point.to_string(),
            namespace: None,
            request_timeout: Duration::from_secs(10),
            accept_insecure_connection: false,
        }
    }

    /// 从环境变量读取连接参数
    ///
    /// AppRole 的 RoleId 与 SecretId 同时存在时优先使用 AppRole，
    /// 否则使用 Token（缺省为开发模式的 `root`）。
    pub fn from_env(mount_point: &str) -> Self {
        let address =
            std::env::var(ENV_VAULT_ADDR).unwrap_or_else(|_| DEFAULT_VAULT_ADDR.to_string());
        let role_id = std::env::var(ENV_VAULT_ROLE_ID).ok();
        let secret_id = std::env::var(ENV_VAULT_SECRET_ID).ok();
        let token =
            std::env::var(ENV_VAULT_TOKEN).unwrap_or_else(|_| DEFAULT_VAULT_TOKEN.to_string());

        let mut settings = Self::new(&address, &token, mount_point);
        if let (Some(role_id), Some(secret_id)) = (role_id, secret_id) {
            if !role_id.is_empty() && !secret_id.is_empty() {
                settings.auth = VaultAuth::AppRole { role_id, secret_id };
            }
        }
        settings.namespace = std::env::var(ENV_VAULT_NAMESPACE)
            .ok()
            .filter(|ns| !ns.is_empty());
        settings
    }

    /// 由全局配置生成连接参数
    ///
    /// # 参数
    /// * `global` - 已验证的全局配置
    /// * `mount_point` - 配置源使用的挂载点
    pub fn from_config(global: &GlobalConfig, mount_point: &str) -> Self {
        let auth = match (&global.role_id, &global.secret_id) {
            (Some(role_id), Some(secret_id)) if !role_id.is_empty() && !secret_id.is_empty() => {
                VaultAuth::AppRole {
                    role_id: role_id.clone(),
                    secret_id: secret_id.clone(),
                }
            }
            _ => VaultAuth::Token(global.token.clone().unwrap_or_default()),
        };

        Self {
            address: global.address.clone(),
            auth,
            mount_point: mount_point.to_string(),
            namespace: global.namespace.clone().filter(|ns| !ns.is_empty()),
            request_timeout: Duration::from_secs(global.request_timeout_seconds),
            accept_insecure_connection: global.accept_insecure_connection,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: Option<ReadData>,
}

#[derive(Debug, Deserialize)]
struct ReadData {
    data: Option<serde_json::Value>,
    metadata: Option<ReadMetadata>,
}

#[derive(Debug, Deserialize)]
struct ReadMetadata {
    version: u64,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Vault KV v2 存储
pub struct VaultStore {
    /// HTTP客户端
    client: Client,
    /// 连接参数
    settings: VaultStoreSettings,
    /// AppRole 登录后缓存的 Token
    cached_token: RwLock<Option<String>>,
}

impl fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultStore")
            .field("address", &self.settings.address)
            .field("mount_point", &self.settings.mount_point)
            .field("namespace", &self.settings.namespace)
            .finish()
    }
}

impl VaultStore {
    /// 创建新的 Vault 存储
    ///
    /// # 参数
    /// * `settings` - 连接参数
    ///
    /// # 返回
    /// * `StoreResult<Self>` - 存储实例
    pub fn new(settings: VaultStoreSettings) -> StoreResult<Self> {
        let mut builder = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION));

        if settings.accept_insecure_connection {
            warn!("已禁用 TLS 证书校验: {}", settings.address);
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(StoreError::Http)?;

        Ok(Self {
            client,
            settings,
            cached_token: RwLock::new(None),
        })
    }

    /// 连接参数
    pub fn settings(&self) -> &VaultStoreSettings {
        &self.settings
    }

    /// 清除缓存的 Token，下次请求前重新登录
    pub async fn reset_token(&self) {
        let mut token = self.cached_token.write().await;
        if token.take().is_some() {
            info!("已清除缓存的 Vault Token");
        }
    }

    fn url(&self, section: &str, path: &str) -> String {
        format!(
            "{}/v1/{}/{}/{}",
            self.settings.address.trim_end_matches('/'),
            self.settings.mount_point.trim_matches('/'),
            section,
            path.trim_start_matches('/')
        )
    }

    fn with_namespace(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.settings.namespace {
            Some(namespace) => request.header(NAMESPACE_HEADER, namespace),
            None => request,
        }
    }

    /// 获取请求使用的 Token，AppRole 模式下按需登录
    async fn token(&self) -> StoreResult<String> {
        let (role_id, secret_id) = match &self.settings.auth {
            VaultAuth::Token(token) => return Ok(token.clone()),
            VaultAuth::AppRole { role_id, secret_id } => (role_id, secret_id),
        };

        if let Some(token) = self.cached_token.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut cached = self.cached_token.write().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        debug!("使用 AppRole 登录 Vault");
        let url = format!(
            "{}/v1/auth/approle/login",
            self.settings.address.trim_end_matches('/')
        );
        let request = self.client.post(&url).json(&serde_json::json!({
            "role_id": role_id,
            "secret_id": secret_id,
        }));
        let response = self.with_namespace(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(StoreError::Auth(format!(
                "AppRole 登录失败 (状态码 {}): {}",
                status.as_u16(),
                message
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("无法解析登录响应: {e}")))?;
        info!("AppRole 登录成功");
        *cached = Some(login.auth.client_token.clone());
        Ok(login.auth.client_token)
    }

    /// 发送 GET 请求并按状态码分类
    async fn get(&self, url: &str, path: &str) -> StoreResult<Response> {
        let token = self.token().await?;
        let request = self.client.get(url).header(TOKEN_HEADER, token);
        let response = self.with_namespace(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }

        if status == StatusCode::FORBIDDEN {
            if let VaultAuth::AppRole { .. } = self.settings.auth {
                self.reset_token().await;
            }
        }

        Err(StoreError::Backend {
            path: path.to_string(),
            status: status.as_u16(),
            message: error_message(response).await,
        })
    }
}

/// 提取 Vault 错误响应中的错误信息
async fn error_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ => body,
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    async fn list(&self, folder: &str) -> StoreResult<Vec<String>> {
        let url = format!("{}?list=true", self.url("metadata", folder));
        debug!("列举 Vault 目录: {}", url);

        let response = self.get(&url, folder).await?;
        let status = response.status().as_u16();
        let listing: ListResponse = response.json().await.map_err(|e| StoreError::Backend {
            path: folder.to_string(),
            status,
            message: format!("无法解析目录列表: {e}"),
        })?;
        Ok(listing.data.keys)
    }

    async fn read(&self, path: &str) -> StoreResult<SecretDocument> {
        let url = self.url("data", path);
        debug!("读取 Vault 密钥: {}", url);

        let response = self.get(&url, path).await?;
        let body = response.text().await?;

        let malformed = |reason: String| StoreError::Malformed {
            path: path.to_string(),
            reason,
        };

        let parsed: ReadResponse =
            serde_json::from_str(&body).map_err(|e| malformed(format!("响应不是合法的JSON: {e}")))?;
        let data = parsed
            .data
            .ok_or_else(|| malformed("响应缺少 data 字段".to_string()))?;
        let metadata = data
            .metadata
            .ok_or_else(|| malformed("响应缺少 metadata 字段".to_string()))?;
        let value = data
            .data
            .ok_or_else(|| malformed("密钥数据为空（可能已被删除）".to_string()))?;

        Ok(SecretDocument {
            value: StructuredValue::from(value),
            version: metadata.version,
        })
    }
}
