//! Login against an Apache style htpasswd file loaded at startup.

use axum::{body::Body, http::Request, response::Response};
use base64ct::{Base64, Encoding};
use sha1::{Digest, Sha1};
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, instrument};

use super::Credentials;
use crate::gate::{
    provider::login_succeeded,
    templates::{form_fragment, LoginPartial},
    AuthError, CodecSlot, FormValues, Provider, ProviderKind, RequestContext, RouteTable,
    SessionCodec, SettingsError,
};

pub const NAME: &str = "HTPasswd";
pub const START_PATH: &str = "/auth/htpasswd/start";

const SHA_PREFIX: &str = "{SHA}";
const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// A stored password hash.
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordHash {
    Bcrypt(String),
    /// Raw SHA-1 digest of the password.
    Sha(Vec<u8>),
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bcrypt(_) => f.write_str("Bcrypt(..)"),
            Self::Sha(_) => f.write_str("Sha(..)"),
        }
    }
}

impl PasswordHash {
    fn parse(encoded: &str) -> Result<Self, String> {
        if let Some(digest) = encoded.strip_prefix(SHA_PREFIX) {
            let digest =
                Base64::decode_vec(digest).map_err(|_| "invalid {SHA} digest".to_string())?;
            if digest.len() != 20 {
                return Err("invalid {SHA} digest length".to_string());
            }
            return Ok(Self::Sha(digest));
        }

        if BCRYPT_PREFIXES.iter().any(|prefix| encoded.starts_with(prefix)) {
            return Ok(Self::Bcrypt(encoded.to_string()));
        }

        Err("unsupported hash scheme".to_string())
    }
}

/// Check `password` against `hash`. Bcrypt is CPU bound; call it off the
/// async workers.
#[must_use]
pub fn verify_password(hash: &PasswordHash, password: &str) -> bool {
    match hash {
        PasswordHash::Sha(digest) => Sha1::digest(password.as_bytes())
            .as_slice()
            .ct_eq(digest)
            .into(),
        PasswordHash::Bcrypt(encoded) => bcrypt::verify(password, encoded).unwrap_or_else(|err| {
            debug!("bcrypt verification failed: {err}");
            false
        }),
    }
}

/// Parse htpasswd `contents`; `path` only labels errors.
///
/// # Errors
/// Returns [`SettingsError::Malformed`] for a line without `:` or with an
/// unsupported hash.
pub fn parse_htpasswd(
    path: &Path,
    contents: &str,
) -> Result<HashMap<String, PasswordHash>, SettingsError> {
    let mut users = HashMap::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = |reason: String| SettingsError::Malformed {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        };

        let (username, encoded) = line
            .split_once(':')
            .ok_or_else(|| malformed("missing ':' separator".to_string()))?;
        let hash = PasswordHash::parse(encoded).map_err(malformed)?;

        // First entry wins, like Apache.
        users.entry(username.to_string()).or_insert(hash);
    }

    Ok(users)
}

/// htpasswd settings as configured.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct HtpasswdProvider {
    settings: Settings,
    users: HashMap<String, PasswordHash>,
    codec: CodecSlot,
}

impl HtpasswdProvider {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            users: HashMap::new(),
            codec: CodecSlot::default(),
        }
    }

    async fn check(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let Some(hash) = self.users.get(username) else {
            debug!("unknown user {username}");
            return Ok(false);
        };

        match hash {
            PasswordHash::Sha(_) => Ok(verify_password(hash, password)),
            PasswordHash::Bcrypt(_) => {
                let hash = hash.clone();
                let password = password.to_string();
                tokio::task::spawn_blocking(move || verify_password(&hash, &password))
                    .await
                    .map_err(|err| {
                        error!("password verification task failed: {err}");
                        AuthError::Internal("password verification failed")
                    })
            }
        }
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn start(self: Arc<Self>, request: Request<Body>) -> Result<Response, AuthError> {
        let context = RequestContext::from_request(&request);
        let credentials = Credentials::from_form(&FormValues::from_request(request).await?);
        credentials.require_both()?;

        if self
            .check(&credentials.username, &credentials.password)
            .await?
        {
            login_succeeded(
                self.codec.get()?,
                &context,
                NAME,
                &credentials.username,
                &credentials.redirect,
            )
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

impl Provider for HtpasswdProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Form
    }

    fn bind_codec(&mut self, codec: Arc<SessionCodec>) {
        self.codec.bind(codec);
    }

    fn resolve_settings(&mut self) -> Result<(), SettingsError> {
        let path = self
            .settings
            .path
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(SettingsError::Missing("htpasswd"))?;

        let contents = std::fs::read_to_string(&path).map_err(|source| SettingsError::Unreadable {
            path: path.clone(),
            source,
        })?;

        self.users = parse_htpasswd(&path, &contents)?;
        info!("Loaded {} users from {}", self.users.len(), path.display());
        Ok(())
    }

    fn register_routes(self: Arc<Self>, routes: &mut RouteTable) -> Result<(), SettingsError> {
        routes.handle_fn(START_PATH, move |request| Arc::clone(&self).start(request))
    }

    fn login_fragment(&self, context: &RequestContext) -> String {
        form_fragment(&LoginPartial {
            action: &context.host_path(START_PATH),
            redirect: context.request_uri(),
            name: NAME,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{
        header::{CONTENT_TYPE, HOST, LOCATION, SET_COOKIE},
        StatusCode,
    };
    use secrecy::SecretString;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // SHA-1 of "password".
    const SHA_PASSWORD: &str = "{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=";

    fn htpasswd_file(contents: &str) -> anyhow::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    fn provider(file: &NamedTempFile) -> anyhow::Result<Arc<HtpasswdProvider>> {
        let mut provider = HtpasswdProvider::new(Settings {
            path: Some(file.path().to_path_buf()),
        });
        provider.bind_codec(Arc::new(SessionCodec::new(
            "_wicket",
            SecretString::from("s3cret".to_string()),
            1,
        )));
        provider.resolve_settings()?;
        Ok(Arc::new(provider))
    }

    fn login(body: String) -> anyhow::Result<Request<Body>> {
        Ok(Request::builder()
            .method("POST")
            .uri(START_PATH)
            .header(HOST, "gate.example.com")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))?)
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() -> anyhow::Result<()> {
        let contents = format!("# users\n\nalice:{SHA_PASSWORD}\nbob:$2y$04$abcdefghijklmnopqrstuu\n");
        let users = parse_htpasswd(Path::new("users"), &contents)?;
        assert_eq!(users.len(), 2);
        assert!(matches!(users.get("alice"), Some(PasswordHash::Sha(digest)) if digest.len() == 20));
        assert!(matches!(users.get("bob"), Some(PasswordHash::Bcrypt(_))));
        Ok(())
    }

    #[test]
    fn parse_rejects_missing_separator() {
        let result = parse_htpasswd(Path::new("users"), "# ok\nalice\n");
        assert!(matches!(result, Err(SettingsError::Malformed { line: 2, .. })));
    }

    #[test]
    fn parse_rejects_unknown_scheme() {
        let result = parse_htpasswd(Path::new("users"), "alice:$apr1$salt$hash\n");
        assert!(matches!(result, Err(SettingsError::Malformed { line: 1, .. })));

        let result = parse_htpasswd(Path::new("users"), "alice:plaintext\n");
        assert!(matches!(result, Err(SettingsError::Malformed { .. })));
    }

    #[test]
    fn verify_sha_and_bcrypt() -> anyhow::Result<()> {
        let sha = PasswordHash::parse(SHA_PASSWORD).map_err(anyhow::Error::msg)?;
        assert!(verify_password(&sha, "password"));
        assert!(!verify_password(&sha, "Password"));

        let bcrypt = PasswordHash::parse(&bcrypt::hash("secret", 4)?).map_err(anyhow::Error::msg)?;
        assert!(verify_password(&bcrypt, "secret"));
        assert!(!verify_password(&bcrypt, "wrong"));
        Ok(())
    }

    #[test]
    fn missing_and_unreadable_files_fail_startup() {
        let mut provider = HtpasswdProvider::new(Settings::default());
        assert!(matches!(
            provider.resolve_settings(),
            Err(SettingsError::Missing("htpasswd"))
        ));

        let mut provider = HtpasswdProvider::new(Settings {
            path: Some(PathBuf::from("/nonexistent/wicket/htpasswd")),
        });
        assert!(matches!(
            provider.resolve_settings(),
            Err(SettingsError::Unreadable { .. })
        ));
    }

    #[tokio::test]
    async fn sha_login_sets_session() -> anyhow::Result<()> {
        let file = htpasswd_file(&format!("alice:{SHA_PASSWORD}\n"))?;
        let response = provider(&file)?
            .start(login("username=alice&password=password&rd=%2Freports".to_string())?)
            .await?;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("/reports")
        );
        assert!(response.headers().get(SET_COOKIE).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn bcrypt_login_sets_session() -> anyhow::Result<()> {
        let file = htpasswd_file(&format!("carol:{}\n", bcrypt::hash("hunter2", 4)?))?;
        let response = provider(&file)?
            .start(login("username=carol&password=hunter2".to_string())?)
            .await?;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(response.headers().get(SET_COOKIE).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_rejected() -> anyhow::Result<()> {
        let file = htpasswd_file(&format!("alice:{SHA_PASSWORD}\n"))?;
        let provider = provider(&file)?;

        let result = Arc::clone(&provider)
            .start(login("username=mallory&password=password".to_string())?)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        let result = provider
            .start(login("username=alice&password=nope".to_string())?)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        Ok(())
    }
}
