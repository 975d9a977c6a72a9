//! Client settings: defaults, optional `polyinsights.toml` overrides, then
//! `POLYINSIGHTS_*` environment overrides, in that order.

use std::{collections::HashMap, fs};

use anyhow::{Context, Result};
use url::Url;

use crate::{auth::AuthClient, records::RecordStoreClient, webhook::WebhookClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub analyze_url: String,
    pub report_url: String,
    pub preview_url: String,
    pub auth_base_url: String,
    pub records_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            analyze_url: "https://your-n8n-url/webhook/polyinsights/analyze/v1".into(),
            report_url: "https://your-n8n-url/webhook/polyinsights/report/v1".into(),
            // The teaser reuses the analyze pipeline unless pointed elsewhere.
            preview_url: "https://your-n8n-url/webhook/polyinsights/analyze/v1".into(),
            auth_base_url: "https://your-project.example.com/auth/v1".into(),
            records_base_url: "https://your-project.example.com/rest/v1".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("polyinsights.toml") {
        settings.apply_file_overrides(&raw);
    }

    if let Ok(v) = std::env::var("POLYINSIGHTS_ANALYZE_URL") {
        settings.analyze_url = v;
    }
    if let Ok(v) = std::env::var("POLYINSIGHTS_REPORT_URL") {
        settings.report_url = v;
    }
    if let Ok(v) = std::env::var("POLYINSIGHTS_PREVIEW_URL") {
        settings.preview_url = v;
    }
    if let Ok(v) = std::env::var("POLYINSIGHTS_AUTH_BASE_URL") {
        settings.auth_base_url = v;
    }
    if let Ok(v) = std::env::var("POLYINSIGHTS_RECORDS_BASE_URL") {
        settings.records_base_url = v;
    }

    settings
}

impl Settings {
    fn apply_file_overrides(&mut self, raw: &str) {
        let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
            return;
        };
        if let Some(v) = file_cfg.get("analyze_url") {
            self.analyze_url = v.clone();
        }
        if let Some(v) = file_cfg.get("report_url") {
            self.report_url = v.clone();
        }
        if let Some(v) = file_cfg.get("preview_url") {
            self.preview_url = v.clone();
        }
        if let Some(v) = file_cfg.get("auth_base_url") {
            self.auth_base_url = v.clone();
        }
        if let Some(v) = file_cfg.get("records_base_url") {
            self.records_base_url = v.clone();
        }
    }

    pub fn webhook_client(&self) -> Result<WebhookClient> {
        let analyze = Url::parse(&self.analyze_url)
            .with_context(|| format!("invalid analyze_url '{}'", self.analyze_url))?;
        let report = Url::parse(&self.report_url)
            .with_context(|| format!("invalid report_url '{}'", self.report_url))?;
        let preview = Url::parse(&self.preview_url)
            .with_context(|| format!("invalid preview_url '{}'", self.preview_url))?;
        Ok(WebhookClient::new(analyze, report, preview))
    }

    pub fn auth_client(&self) -> Result<AuthClient> {
        let base = Url::parse(&self.auth_base_url)
            .with_context(|| format!("invalid auth_base_url '{}'", self.auth_base_url))?;
        AuthClient::new(&base)
    }

    pub fn record_store_client(&self) -> Result<RecordStoreClient> {
        let base = Url::parse(&self.records_base_url)
            .with_context(|| format!("invalid records_base_url '{}'", self.records_base_url))?;
        RecordStoreClient::new(&base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_replace_only_named_keys() {
        let mut settings = Settings::default();
        settings.apply_file_overrides(
            "analyze_url = \"https://hooks.example.com/analyze\"\n\
             records_base_url = \"https://store.example.com/rest/v1\"\n",
        );

        assert_eq!(settings.analyze_url, "https://hooks.example.com/analyze");
        assert_eq!(
            settings.records_base_url,
            "https://store.example.com/rest/v1"
        );
        assert_eq!(settings.report_url, Settings::default().report_url);
    }

    #[test]
    fn malformed_file_leaves_defaults_untouched() {
        let mut settings = Settings::default();
        settings.apply_file_overrides("analyze_url = [not toml");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn default_settings_build_all_clients() {
        let settings = Settings::default();
        settings.webhook_client().expect("webhook client");
        settings.auth_client().expect("auth client");
        settings.record_store_client().expect("record store client");
    }

    #[test]
    fn invalid_url_is_rejected_with_context() {
        let settings = Settings {
            analyze_url: "not a url".into(),
            ..Settings::default()
        };
        let err = settings.webhook_client().expect_err("must fail");
        assert!(format!("{err:#}").contains("invalid analyze_url"));
    }
}
