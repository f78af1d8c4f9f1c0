//! # SSH 部署密钥生成
//!
//! RSA 私钥输出为 PKCS#1 PEM，公钥输出为 OpenSSH authorized_keys 格式，
//! 注释固定为 `rsa-key-<YYYYMMDD>`。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{GitterError, Result};
use crate::types::SshKeypair;

/// 默认密钥长度
pub const DEFAULT_KEY_BITS: usize = 2048;

/// 密钥对生成器
///
/// 这是一个同步的 CPU 密集操作，调用方负责放到阻塞线程池执行。
pub trait KeypairGenerator: Send + Sync {
    fn generate(&self, owner: &str) -> Result<SshKeypair>;
}

#[derive(Debug, Clone, Copy)]
pub struct RsaKeypairGenerator {
    bits: usize,
}

impl Default for RsaKeypairGenerator {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
        }
    }
}

impl RsaKeypairGenerator {
    #[must_use]
    pub const fn with_bits(bits: usize) -> Self {
        Self { bits }
    }

    #[must_use]
    pub const fn bits(&self) -> usize {
        self.bits
    }
}

impl KeypairGenerator for RsaKeypairGenerator {
    fn generate(&self, owner: &str) -> Result<SshKeypair> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| GitterError::crypto_with_source("生成 RSA 私钥失败", e))?;
        private_key
            .validate()
            .map_err(|e| GitterError::crypto_with_source("RSA 私钥校验失败", e))?;

        let private_key_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| GitterError::crypto_with_source("编码 PEM 失败", e))?
            .to_string();

        let comment = format!("rsa-key-{}", Utc::now().format("%Y%m%d"));
        let public_key = openssh_public_key(&private_key.to_public_key(), &comment);

        Ok(SshKeypair {
            owner: owner.to_string(),
            public_key,
            private_key_pem,
            remote_key_id: None,
            created_at: None,
        })
    }
}

/// `ssh-rsa <base64(blob)> <comment>`
#[must_use]
pub fn openssh_public_key(key: &RsaPublicKey, comment: &str) -> String {
    let mut blob = Vec::new();
    write_ssh_string(&mut blob, b"ssh-rsa");
    write_mpint(&mut blob, &key.e().to_bytes_be());
    write_mpint(&mut blob, &key.n().to_bytes_be());

    format!("ssh-rsa {} {comment}", STANDARD.encode(blob))
}

fn write_ssh_string(buf: &mut Vec<u8>, data: &[u8]) {
    // 长度前缀是 u32，密钥组件不会超过这个范围
    let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(data);
}

/// 正整数的 mpint 编码：去掉前导零，最高位为 1 时补一个 0x00
fn write_mpint(buf: &mut Vec<u8>, bytes: &[u8]) {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let trimmed = &bytes[start..];

    if trimmed.first().is_some_and(|&b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(trimmed.len() + 1);
        padded.push(0);
        padded.extend_from_slice(trimmed);
        write_ssh_string(buf, &padded);
    } else {
        write_ssh_string(buf, trimmed);
    }
}
