use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Default token generation endpoint.
pub const DEFAULT_F_GEN: &str = "https://api.imink.app/f";

/// Default directory for cached battle data.
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Default directory for file exports.
pub const DEFAULT_FILE_EXPORT_PATH: &str = "./export";

/// Default monitor polling interval in milliseconds.
pub const DEFAULT_MONITOR_INTERVAL: u64 = 500;

const REDACTED: &str = "<redacted>";

/// Persisted names of the fields [`State`] models directly.
pub const FIELD_NAMES: &[&str] = &[
    "loginState",
    "fGen",
    "appUserAgent",
    "userLang",
    "userCountry",
    "rankState",
    "cacheDir",
    "statInkApiKey",
    "fileExportPath",
    "monitorInterval",
    "splashcatApiKey",
];

/// Opaque authentication tokens. Every token is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet_token: Option<String>,
}

/// Summary of the last observed ranked match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankState {
    /// Derived externally from the battle identifier.
    pub game_id: String,

    /// Unix seconds, when the battle identifier carries one.
    #[serde(
        default,
        deserialize_with = "lenient::option_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,

    /// Opaque rank label such as `"S+12"`. Never validated here.
    pub rank: String,

    #[serde(deserialize_with = "lenient::to_i64")]
    pub rank_point: i64,
}

/// The complete profile document.
///
/// Every defaulted field is always populated. Instances handed out by
/// [`ProfileManager`](crate::profile::ProfileManager) are shared snapshots;
/// changes are made by building a new `State` and persisting it whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredState")]
pub struct State {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_state: Option<LoginState>,

    /// URL of the external token generation service.
    pub f_gen: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_lang: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_state: Option<RankState>,

    pub cache_dir: String,

    // Exporter settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat_ink_api_key: Option<String>,

    pub file_export_path: String,

    /// Polling interval in milliseconds.
    pub monitor_interval: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub splashcat_api_key: Option<String>,

    /// Keys this version does not know about, kept so they survive a rewrite.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            login_state: None,
            f_gen: DEFAULT_F_GEN.to_string(),
            app_user_agent: None,
            user_lang: None,
            user_country: None,
            rank_state: None,
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
            stat_ink_api_key: None,
            file_export_path: DEFAULT_FILE_EXPORT_PATH.to_string(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            splashcat_api_key: None,
            extra: IndexMap::new(),
        }
    }
}

impl State {
    /// Overlay a decoded document on top of `self`.
    ///
    /// Every field present in `stored` wins; absent fields keep the value
    /// from `self`. Called on [`State::default()`] this is the default-merge
    /// applied on every load.
    pub fn merged_with(mut self, stored: StoredState) -> Self {
        let StoredState {
            login_state,
            f_gen,
            app_user_agent,
            user_lang,
            user_country,
            rank_state,
            cache_dir,
            stat_ink_api_key,
            file_export_path,
            monitor_interval,
            splashcat_api_key,
            extra,
        } = stored;

        self.login_state = login_state.or(self.login_state);
        self.app_user_agent = app_user_agent.or(self.app_user_agent);
        self.user_lang = user_lang.or(self.user_lang);
        self.user_country = user_country.or(self.user_country);
        self.rank_state = rank_state.or(self.rank_state);
        self.stat_ink_api_key = stat_ink_api_key.or(self.stat_ink_api_key);
        self.splashcat_api_key = splashcat_api_key.or(self.splashcat_api_key);

        if let Some(f_gen) = f_gen {
            self.f_gen = f_gen;
        }
        if let Some(cache_dir) = cache_dir {
            self.cache_dir = cache_dir;
        }
        if let Some(file_export_path) = file_export_path {
            self.file_export_path = file_export_path;
        }
        if let Some(monitor_interval) = monitor_interval {
            self.monitor_interval = monitor_interval;
        }

        self.extra.extend(extra);
        self
    }

    /// Copy of this state with tokens and API keys masked, for logs and display.
    pub fn redacted(&self) -> Self {
        let mask = |value: &Option<String>| value.as_ref().map(|_| REDACTED.to_string());

        let mut copy = self.clone();
        copy.login_state = self.login_state.as_ref().map(|login| LoginState {
            session_token: mask(&login.session_token),
            g_token: mask(&login.g_token),
            bullet_token: mask(&login.bullet_token),
        });
        copy.stat_ink_api_key = mask(&self.stat_ink_api_key);
        copy.splashcat_api_key = mask(&self.splashcat_api_key);
        copy
    }

    /// This state minus any `extra` entry named like a modelled field.
    ///
    /// Such an entry would be written next to the real field, producing a
    /// document with a duplicate key that no longer decodes.
    pub fn without_shadowed_extra(&self) -> Cow<'_, State> {
        let shadows = |key: &String| FIELD_NAMES.contains(&key.as_str());
        if !self.extra.keys().any(shadows) {
            return Cow::Borrowed(self);
        }

        let mut copy = self.clone();
        copy.extra.retain(|key, _| !shadows(key));
        Cow::Owned(copy)
    }
}

/// A profile document exactly as decoded from storage.
///
/// Fields that carry a default in [`State`] are optional here so that a
/// partial or older document can be told apart from one that spells out
/// the default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_state: Option<LoginState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_gen: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_user_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_lang: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_state: Option<RankState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_ink_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_export_path: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient::option_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub monitor_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splashcat_api_key: Option<String>,

    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl From<StoredState> for State {
    fn from(stored: StoredState) -> Self {
        State::default().merged_with(stored)
    }
}

impl From<State> for StoredState {
    fn from(state: State) -> Self {
        Self {
            login_state: state.login_state,
            f_gen: Some(state.f_gen),
            app_user_agent: state.app_user_agent,
            user_lang: state.user_lang,
            user_country: state.user_country,
            rank_state: state.rank_state,
            cache_dir: Some(state.cache_dir),
            stat_ink_api_key: state.stat_ink_api_key,
            file_export_path: Some(state.file_export_path),
            monitor_interval: Some(state.monitor_interval),
            splashcat_api_key: state.splashcat_api_key,
            extra: state.extra,
        }
    }
}

/// Numeric fields accept any number a JSON or YAML writer may emit,
/// including integral floats such as `1000.0`. Fractions are rounded and
/// out-of-range values saturate.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    impl Number {
        fn into_i64(self) -> i64 {
            match self {
                Self::Unsigned(n) => i64::try_from(n).unwrap_or(i64::MAX),
                Self::Signed(n) => n,
                Self::Float(f) => f.round() as i64,
            }
        }

        fn into_u64(self) -> u64 {
            match self {
                Self::Unsigned(n) => n,
                Self::Signed(n) => u64::try_from(n).unwrap_or(0),
                Self::Float(f) => f.round() as u64,
            }
        }
    }

    pub fn to_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Number::deserialize(deserializer).map(Number::into_i64)
    }

    pub fn option_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(Option::<Number>::deserialize(deserializer)?.map(Number::into_i64))
    }

    pub fn option_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(Option::<Number>::deserialize(deserializer)?.map(Number::into_u64))
    }
}
