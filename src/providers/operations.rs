//! # 请求级操作
//!
//! HTTP 层直接调用的组合操作：secret 幂等创建和 webhook 名称拼装。

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::providers::traits::GitProvider;
use crate::types::{Secret, WebhookRecord};
use crate::{invalid_request, ldebug};

const SECRET_SUFFIX_LEN: usize = 8;

/// `<source>-<user>-<8 位小写字母数字>`
#[must_use]
pub fn generate_secret_name(source: &str, user: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{source}-{user}-{suffix}")
}

/// 已有 secret 时直接返回，否则生成名称并创建
pub async fn ensure_secret(provider: &dyn GitProvider, ns: &str) -> Result<Secret> {
    if let Some(secret) = provider.check_secret(ns).await? {
        ldebug!(
            "system",
            LogStage::Provisioning,
            LogComponent::Credential,
            "secret_cached",
            &format!("secret {} 已存在: ns={ns}", secret.secret_name)
        );
        return Ok(secret);
    }

    let name = generate_secret_name(provider.source().as_str(), provider.user());
    provider.create_secret(ns, &name).await
}

pub async fn create_webhook(
    provider: &dyn GitProvider,
    ns: &str,
    bc: &str,
    mut hook: WebhookRecord,
) -> Result<WebhookRecord> {
    if ns.is_empty() || bc.is_empty() {
        return Err(invalid_request!("ns and bc are required"));
    }
    hook.name = WebhookRecord::compose_name(ns, bc);
    provider.create_webhook(hook).await
}

pub async fn remove_webhook(
    provider: &dyn GitProvider,
    ns: &str,
    bc: &str,
    hook_id: &str,
) -> Result<()> {
    let id: i64 = hook_id
        .trim()
        .parse()
        .map_err(|_| invalid_request!("invalid hook id: {}", hook_id))?;
    provider.remove_webhook(ns, bc, id).await
}
