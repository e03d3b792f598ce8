//! At-rest sealing of subscriber addresses and the derived identifiers
//! used by the tracking surface.
//!
//! Addresses are stored as `<iv hex>:<ciphertext hex>` (aes-256-cbc with a
//! random iv per sealing). The key comes exclusively from configuration;
//! with no key present sealing is refused and opening yields nothing, so
//! an unconfigured deployment cannot accumulate plaintext addresses.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config;
use crate::error::ErrorKind;
use crate::Result;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Clone)]
pub struct Sealer {
    key: Option<[u8; 32]>,
}

impl Sealer {
    pub fn from_config(config: &config::Crypto) -> Self {
        let key = parse_key(&config.key);
        if key.is_none() && !config.key.is_empty() {
            tracing::warn!("crypto key has invalid shape, at-rest encryption disabled");
        }
        Self { key }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Seals a plaintext address for storage.
    pub fn seal(&self, plain: &str) -> Result<String> {
        let key = self.key.as_ref().ok_or(ErrorKind::CryptoKeyMissing)?;
        let iv: [u8; 16] = rand::random();
        let cipher = Aes256CbcEnc::new_from_slices(key, &iv)
            .map_err(|e| ErrorKind::CryptoError(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
        Ok(format!("{}:{}", hex::encode(iv), hex::encode(cipher)))
    }

    /// Opens a sealed address. Anything that fails to decrypt, for any
    /// reason, comes back as `None`; callers skip such records.
    pub fn open(&self, sealed: &str) -> Option<String> {
        let key = self.key.as_ref()?;
        let (iv_hex, cipher_hex) = sealed.split_once(':')?;
        let iv = hex::decode(iv_hex).ok()?;
        let cipher = hex::decode(cipher_hex).ok()?;
        let plain = Aes256CbcDec::new_from_slices(key, &iv)
            .ok()?
            .decrypt_padded_vec_mut::<Pkcs7>(&cipher)
            .ok()?;
        String::from_utf8(plain).ok()
    }

    /// Stable per-recipient token embedded in tracking links. Keyed when a
    /// key is configured, a plain digest otherwise; deterministic either
    /// way so repeated opens map to one identity.
    pub fn recipient_token(&self, address: &str) -> String {
        let mut digest = match self.key.as_ref().and_then(|key| {
            Hmac::<Sha256>::new_from_slice(key)
                .ok()
                .map(|mut mac| {
                    mac.update(address.as_bytes());
                    hex::encode(mac.finalize().into_bytes())
                })
        }) {
            Some(keyed) => keyed,
            None => hex::encode(Sha256::digest(address.as_bytes())),
        };
        digest.truncate(32);
        digest
    }
}

fn parse_key(raw: &str) -> Option<[u8; 32]> {
    if raw.len() == 64 {
        if let Ok(bytes) = hex::decode(raw) {
            return bytes.try_into().ok();
        }
    }
    if raw.len() == 32 {
        return raw.as_bytes().try_into().ok();
    }
    None
}

/// Identity used for unique-open dedup: the link token when the pixel
/// carried one, otherwise a digest over the requesting client.
pub fn open_identity(sid: Option<&str>, ip: &str, user_agent: &str) -> String {
    match sid {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => hex::encode(Sha256::digest(format!("{ip}{user_agent}").as_bytes())),
    }
}

/// Masked form of an address, the only shape read APIs expose.
pub fn mask_email(address: &str) -> String {
    let (name, domain) = match address.split_once('@') {
        Some((n, d)) => (n, Some(d)),
        None => (address, None),
    };
    let count = name.chars().count();
    let masked = if count > 2 {
        let head: String = name.chars().take(2).collect();
        format!("{}{}", head, "*".repeat(count - 2))
    } else {
        format!("{}**", name)
    };
    match domain {
        Some(d) => format!("{}@{}", masked, d),
        None => masked,
    }
}
