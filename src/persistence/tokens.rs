use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

const TOKEN_DIR: &str = "token";
const TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub issued_at: u64,
}

/// File-backed credential source for outbound sessions. Tokens are
/// minted locally, refreshed when stale, and persisted at shutdown so
/// the next run resumes the same credential.
pub struct TokenStore {
    path: PathBuf,
    token: Mutex<AuthToken>,
}

impl TokenStore {
    pub fn load_or_create(root: &Path, identifier: &str) -> Result<Self, String> {
        let path = root
            .join(TOKEN_DIR)
            .join(format!("{}token.tok", identifier));
        let token = match fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<AuthToken>(&data) {
                Ok(token) => token,
                Err(err) => {
                    eprintln!(
                        "skinrelay: stored token unreadable ({}), minting a new one",
                        err
                    );
                    mint_token(identifier, now_unix())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                println!("skinrelay: minted new session token for '{}'", identifier);
                mint_token(identifier, now_unix())
            }
            Err(err) => {
                return Err(format!(
                    "token read failed for {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        let store = Self {
            path,
            token: Mutex::new(token),
        };
        store.refresh_if_stale(identifier);
        Ok(store)
    }

    /// Current access token, re-minted first when past its lifetime.
    pub fn access_token(&self) -> String {
        match self.token.lock() {
            Ok(token) => token.access_token.clone(),
            Err(_) => String::new(),
        }
    }

    pub fn persist(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                format!("token dir create failed for {}: {}", parent.display(), err)
            })?;
        }
        let token = self
            .token
            .lock()
            .map_err(|_| "token lock poisoned".to_string())?;
        let data = serde_json::to_vec(&*token)
            .map_err(|err| format!("token encode failed: {}", err))?;
        fs::write(&self.path, data)
            .map_err(|err| format!("token write failed for {}: {}", self.path.display(), err))
    }

    fn refresh_if_stale(&self, identifier: &str) {
        let now = now_unix();
        if let Ok(mut token) = self.token.lock() {
            if now.saturating_sub(token.issued_at) > TOKEN_TTL_SECS {
                println!(
                    "skinrelay: session token for '{}' expired, minting a new one",
                    identifier
                );
                *token = mint_token(identifier, now);
            }
        }
    }
}

fn mint_token(identifier: &str, now: u64) -> AuthToken {
    let mut sha1 = Sha1::new();
    sha1.update(identifier.as_bytes());
    sha1.update(now.to_le_bytes());
    AuthToken {
        access_token: BASE64_ENGINE.encode(sha1.finalize()),
        issued_at: now,
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "skinrelay-token-test-{}-{}",
            std::process::id(),
            TOKEN_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn mint_is_deterministic_per_identifier_and_time() {
        let a = mint_token("alpha", 1000);
        assert_eq!(a, mint_token("alpha", 1000));
        assert_ne!(a.access_token, mint_token("beta", 1000).access_token);
        assert_ne!(a.access_token, mint_token("alpha", 1001).access_token);
    }

    #[test]
    fn persist_and_reload_round_trip() {
        let root = temp_root();
        let store = TokenStore::load_or_create(&root, "main").unwrap();
        let token = store.access_token();
        assert!(!token.is_empty());
        store.persist().unwrap();

        let reloaded = TokenStore::load_or_create(&root, "main").unwrap();
        assert_eq!(reloaded.access_token(), token);
    }

    #[test]
    fn corrupt_token_file_is_replaced() {
        let root = temp_root();
        let dir = root.join(TOKEN_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("maintoken.tok"), b"not json").unwrap();

        let store = TokenStore::load_or_create(&root, "main").unwrap();
        assert!(!store.access_token().is_empty());
    }

    #[test]
    fn stale_token_is_reminted() {
        let root = temp_root();
        let dir = root.join(TOKEN_DIR);
        fs::create_dir_all(&dir).unwrap();
        let stale = AuthToken {
            access_token: "old".to_string(),
            issued_at: 1,
        };
        fs::write(
            dir.join("maintoken.tok"),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let store = TokenStore::load_or_create(&root, "main").unwrap();
        assert_ne!(store.access_token(), "old");
    }
}
