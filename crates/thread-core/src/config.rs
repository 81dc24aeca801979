use std::time::Duration;

/// Which verification strategy gates the send pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// The application issues 6-digit codes and checks them itself.
    SelfIssuedCode,
    /// The identity provider runs its own email-link flow; the gate mirrors
    /// its verified flag.
    ProviderManaged,
}

#[derive(Debug, Clone)]
pub struct ThreadConfig {
    pub translate_url: String,
    pub translate_deadline: Duration,
    /// Target language for which translation is skipped entirely.
    pub noop_lang: String,
    pub verification: VerificationMode,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            translate_url: "http://127.0.0.1:5000/translate".to_string(),
            translate_deadline: Duration::from_secs(5),
            noop_lang: "en".to_string(),
            verification: VerificationMode::SelfIssuedCode,
        }
    }
}

impl ThreadConfig {
    /// Load from `THREAD_*` environment variables, with `.env` support.
    /// Unset variables fall back to the defaults above.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let translate_url = get("THREAD_TRANSLATE_URL").unwrap_or(defaults.translate_url);
        let translate_deadline = match get("THREAD_TRANSLATE_DEADLINE_SECS") {
            Some(raw) => Duration::from_secs(raw.parse()?),
            None => defaults.translate_deadline,
        };
        let noop_lang = get("THREAD_NOOP_LANG").unwrap_or(defaults.noop_lang);
        let verification = match get("THREAD_VERIFICATION").as_deref() {
            Some("code") | None => VerificationMode::SelfIssuedCode,
            Some("provider") => VerificationMode::ProviderManaged,
            Some(other) => anyhow::bail!(
                "unknown THREAD_VERIFICATION '{other}' (expected 'code' or 'provider')"
            ),
        };

        Ok(Self {
            translate_url,
            translate_deadline,
            noop_lang,
            verification,
        })
    }
}
