//! User-editable configuration sections and the persisted country choice.
//!
//! Each section lives under its own store key. General settings are merged
//! field by field over the defaults when loaded; list sections replace the
//! stored value wholesale.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::countries::DEFAULT_COUNTRY;
use crate::error::StoreError;
use crate::models::{AssetAllocations, CountryCode};
use crate::store::ConfigStore;

pub const SELECTED_COUNTRY_KEY: &str = "oracle-portfolio-selected-country";
pub const CONFIG_VERSION: &str = "4.1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfig {
    pub app_name: String,
    pub version: String,
    pub language: String,
    pub timezone: String,
    /// Seconds.
    pub refresh_interval: u64,
    /// Seconds.
    pub api_timeout: u64,
    pub enable_notifications: bool,
    pub enable_auto_save: bool,
    pub enable_debug_mode: bool,
    pub max_history_days: u32,
    pub cache_size: u32,
    pub theme: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "Oracle Portfolio".to_string(),
            version: CONFIG_VERSION.to_string(),
            language: "fr".to_string(),
            timezone: "Europe/Paris".to_string(),
            refresh_interval: 30,
            api_timeout: 10,
            enable_notifications: true,
            enable_auto_save: true,
            enable_debug_mode: false,
            max_history_days: 30,
            cache_size: 100,
            theme: "dark".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub id: String,
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub enabled: bool,
    pub threshold: Threshold,
    pub source: String,
    pub update_frequency: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formula {
    pub id: String,
    pub name: String,
    pub description: String,
    pub formula: String,
    pub variables: Vec<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<f64>,
}

impl Formula {
    pub fn new(name: impl Into<String>, formula: impl Into<String>, variables: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            formula: formula.into(),
            variables,
            enabled: true,
            test_value: None,
            last_result: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub confidence: Range,
    pub growth: Range,
    pub inflation: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTraits {
    pub growth: String,
    pub inflation: String,
    pub volatility: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub thresholds: RegimeThresholds,
    pub characteristics: RegimeTraits,
    pub allocations: AssetAllocations,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub enabled: bool,
    pub installed: bool,
    pub category: String,
    pub size: String,
    pub last_update: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, Value>>,
}

/// A value persisted under one store key.
pub trait Section: Serialize + DeserializeOwned + Clone + Default + PartialEq + Send + Sync {
    const KEY: &'static str;

    /// Builds the section from what was stored.
    fn restore(stored: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(stored)
    }

    /// Applies a partial update.
    fn apply(&self, patch: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(patch)
    }
}

fn merge_over<T: Serialize + DeserializeOwned>(base: &T, patch: Value) -> Result<T, serde_json::Error> {
    let mut merged = serde_json::to_value(base)?;
    if let (Value::Object(target), Value::Object(fields)) = (&mut merged, patch) {
        for (name, value) in fields {
            target.insert(name, value);
        }
    }
    serde_json::from_value(merged)
}

impl Section for GeneralConfig {
    const KEY: &'static str = "oracle-general-config";

    fn restore(stored: Value) -> Result<Self, serde_json::Error> {
        merge_over(&GeneralConfig::default(), stored)
    }

    fn apply(&self, patch: Value) -> Result<Self, serde_json::Error> {
        merge_over(self, patch)
    }
}

impl Section for Vec<Indicator> {
    const KEY: &'static str = "oracle-indicators-config";
}

impl Section for Vec<Formula> {
    const KEY: &'static str = "oracle-formulas-config";
}

impl Section for Vec<RegimeConfig> {
    const KEY: &'static str = "oracle-regimes-config";
}

impl Section for Vec<Plugin> {
    const KEY: &'static str = "oracle-plugins-config";
}

/// In-memory copy of one section plus the last storage error.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigHook<T: Section> {
    pub config: T,
    pub error: Option<String>,
}

impl<T: Section> Default for ConfigHook<T> {
    fn default() -> Self {
        Self {
            config: T::default(),
            error: None,
        }
    }
}

impl<T: Section> ConfigHook<T> {
    /// Unreadable entries leave the defaults in place and record the error.
    pub async fn load(store: &dyn ConfigStore) -> Self {
        let mut hook = Self::default();
        let stored = match store.load(T::KEY).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(key = T::KEY, error = %err, "config load failed");
                hook.error = Some(format!("failed to load {}: {err}", T::KEY));
                return hook;
            }
        };
        let Some(raw) = stored else {
            return hook;
        };
        match serde_json::from_str(&raw).and_then(T::restore) {
            Ok(config) => hook.config = config,
            Err(err) => {
                warn!(key = T::KEY, error = %err, "stored config is invalid");
                hook.error = Some(format!("failed to load {}: {err}", T::KEY));
            }
        }
        hook
    }

    pub fn update(&mut self, patch: Value) -> Result<(), StoreError> {
        self.config = self.config.apply(patch)?;
        Ok(())
    }

    pub async fn save(&mut self, store: &dyn ConfigStore) -> Result<(), StoreError> {
        let result = match serde_json::to_string(&self.config) {
            Ok(raw) => store.save(T::KEY, &raw).await,
            Err(err) => Err(err.into()),
        };
        self.error = result.as_ref().err().map(|err| format!("failed to save {}: {err}", T::KEY));
        result
    }

    pub async fn reset(&mut self, store: &dyn ConfigStore) -> Result<(), StoreError> {
        self.config = T::default();
        store.remove(T::KEY).await
    }
}

impl<T> ConfigHook<Vec<T>>
where
    Vec<T>: Section,
{
    pub fn add(&mut self, item: T) {
        self.config.push(item);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleConfig {
    pub general: GeneralConfig,
    pub indicators: Vec<Indicator>,
    pub formulas: Vec<Formula>,
    pub regimes: Vec<RegimeConfig>,
    pub plugins: Vec<Plugin>,
    pub export_date: DateTime<Utc>,
    pub version: String,
}

/// Import document; any section may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigImport {
    pub general: Option<Value>,
    pub indicators: Option<Vec<Indicator>>,
    pub formulas: Option<Vec<Formula>>,
    pub regimes: Option<Vec<RegimeConfig>>,
    pub plugins: Option<Vec<Plugin>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub imported: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

/// All five sections loaded together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub general: ConfigHook<GeneralConfig>,
    pub indicators: ConfigHook<Vec<Indicator>>,
    pub formulas: ConfigHook<Vec<Formula>>,
    pub regimes: ConfigHook<Vec<RegimeConfig>>,
    pub plugins: ConfigHook<Vec<Plugin>>,
}

impl Configuration {
    pub async fn load(store: &dyn ConfigStore) -> Self {
        Self {
            general: ConfigHook::load(store).await,
            indicators: ConfigHook::load(store).await,
            formulas: ConfigHook::load(store).await,
            regimes: ConfigHook::load(store).await,
            plugins: ConfigHook::load(store).await,
        }
    }

    /// First section error, in section order.
    pub fn error(&self) -> Option<&str> {
        [
            &self.general.error,
            &self.indicators.error,
            &self.formulas.error,
            &self.regimes.error,
            &self.plugins.error,
        ]
        .into_iter()
        .find_map(|e| e.as_deref())
    }

    pub fn export(&self, now: DateTime<Utc>) -> OracleConfig {
        OracleConfig {
            general: self.general.config.clone(),
            indicators: self.indicators.config.clone(),
            formulas: self.formulas.config.clone(),
            regimes: self.regimes.config.clone(),
            plugins: self.plugins.config.clone(),
            export_date: now,
            version: CONFIG_VERSION.to_string(),
        }
    }

    /// Applies and saves every section present in `doc`.
    pub async fn import(
        &mut self,
        store: &dyn ConfigStore,
        doc: ConfigImport,
    ) -> Result<ImportReport, StoreError> {
        let mut report = ImportReport::default();

        match doc.general {
            Some(patch) => {
                self.general.update(patch)?;
                self.general.save(store).await?;
                report.imported.push(GeneralConfig::KEY);
            }
            None => report.skipped.push(GeneralConfig::KEY),
        }
        import_list(&mut self.indicators, doc.indicators, store, &mut report).await?;
        import_list(&mut self.formulas, doc.formulas, store, &mut report).await?;
        import_list(&mut self.regimes, doc.regimes, store, &mut report).await?;
        import_list(&mut self.plugins, doc.plugins, store, &mut report).await?;

        info!(
            imported = report.imported.len(),
            skipped = report.skipped.len(),
            "configuration imported"
        );
        Ok(report)
    }

    pub async fn reset_all(&mut self, store: &dyn ConfigStore) -> Result<(), StoreError> {
        self.general.reset(store).await?;
        self.indicators.reset(store).await?;
        self.formulas.reset(store).await?;
        self.regimes.reset(store).await?;
        self.plugins.reset(store).await?;
        Ok(())
    }

    pub async fn save_all(&mut self, store: &dyn ConfigStore) -> Result<(), StoreError> {
        self.general.save(store).await?;
        self.indicators.save(store).await?;
        self.formulas.save(store).await?;
        self.regimes.save(store).await?;
        self.plugins.save(store).await?;
        Ok(())
    }
}

async fn import_list<T>(
    hook: &mut ConfigHook<Vec<T>>,
    incoming: Option<Vec<T>>,
    store: &dyn ConfigStore,
    report: &mut ImportReport,
) -> Result<(), StoreError>
where
    Vec<T>: Section,
{
    match incoming {
        Some(items) => {
            hook.config = items;
            hook.save(store).await?;
            report.imported.push(<Vec<T> as Section>::KEY);
        }
        None => report.skipped.push(<Vec<T> as Section>::KEY),
    }
    Ok(())
}

/// Stored selection, or the default country when absent or unsupported.
pub async fn load_selected_country(store: &dyn ConfigStore) -> CountryCode {
    let stored = match store.load(SELECTED_COUNTRY_KEY).await {
        Ok(stored) => stored,
        Err(err) => {
            warn!(error = %err, "could not read selected country");
            None
        }
    };
    let Some(raw) = stored else {
        return DEFAULT_COUNTRY;
    };
    let code = serde_json::from_str::<String>(&raw).unwrap_or(raw);
    match code.trim().parse() {
        Ok(code) => code,
        Err(_) => {
            warn!(stored = %code, "ignoring unsupported stored country");
            DEFAULT_COUNTRY
        }
    }
}

pub async fn select_country(store: &dyn ConfigStore, code: &str) -> Result<CountryCode, StoreError> {
    let country: CountryCode = code
        .parse()
        .map_err(|_| StoreError::UnsupportedCountry(code.to_string()))?;
    store
        .save(SELECTED_COUNTRY_KEY, &serde_json::to_string(country.as_str())?)
        .await?;
    Ok(country)
}
