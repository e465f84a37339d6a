//! Service configuration loaded from environment variables.
//!
//! - `ADMIN_INSIGHTS_WEBROOT` - Host application base URL (default: `http://localhost/`)
//! - `ADMIN_INSIGHTS_HOST_VERSION` - Host version used in versioned page URLs
//! - `ADMIN_INSIGHTS_ASSET_BASE` - Base URL of the client script and stylesheet
//! - `ADMIN_INSIGHTS_JSMO` - Name of the host's remote-call object on the page
//! - `ADMIN_INSIGHTS_DB` - SQLite database path (default: platform data dir)

use std::path::PathBuf;

const DEFAULT_WEBROOT: &str = "http://localhost/";
const DEFAULT_HOST_VERSION: &str = "14.0.0";
const DEFAULT_JS_OBJECT: &str = "DE_RUB_AdminInsights";
const DEFAULT_JSMO: &str = "ExternalModules.DE.RUB.AdminInsightsExternalModule";

/// What the service needs to know about the host application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    /// Absolute base URL of the host, always ending in `/`.
    pub webroot_url: String,
    pub host_version: String,
    /// Reported to the client as the payload `version`.
    pub module_version: String,
    /// Global name of the client dispatcher object.
    pub js_object: String,
    /// Name of the remote-call object the host provides on the page.
    pub jsmo_name: String,
    /// Base URL the client script and stylesheet are served from.
    pub asset_base: String,
}

impl HostConfig {
    pub fn new(webroot_url: impl Into<String>, host_version: impl Into<String>) -> Self {
        let mut webroot_url = webroot_url.into();
        if !webroot_url.ends_with('/') {
            webroot_url.push('/');
        }
        let asset_base = format!("{webroot_url}modules/admin_insights");
        Self {
            webroot_url,
            host_version: host_version.into(),
            module_version: env!("CARGO_PKG_VERSION").to_string(),
            js_object: DEFAULT_JS_OBJECT.to_string(),
            jsmo_name: DEFAULT_JSMO.to_string(),
            asset_base,
        }
    }

    /// Load host configuration from environment variables.
    pub fn from_env() -> Self {
        let webroot =
            std::env::var("ADMIN_INSIGHTS_WEBROOT").unwrap_or_else(|_| DEFAULT_WEBROOT.to_string());
        let version = std::env::var("ADMIN_INSIGHTS_HOST_VERSION")
            .unwrap_or_else(|_| DEFAULT_HOST_VERSION.to_string());

        let mut config = Self::new(webroot, version);
        if let Ok(asset_base) = std::env::var("ADMIN_INSIGHTS_ASSET_BASE") {
            config.asset_base = asset_base.trim_end_matches('/').to_string();
        }
        if let Ok(jsmo) = std::env::var("ADMIN_INSIGHTS_JSMO") {
            config.jsmo_name = jsmo;
        }
        config
    }

    /// URL of a page inside the host's versioned directory.
    pub fn versioned_url(&self, path: &str) -> String {
        format!(
            "{}redcap_v{}/{}",
            self.webroot_url,
            self.host_version,
            path.trim_start_matches('/')
        )
    }

    pub fn script_url(&self) -> String {
        format!("{}/js/admin-insights.js", self.asset_base)
    }

    pub fn stylesheet_url(&self) -> String {
        format!("{}/css/admin-insights.css", self.asset_base)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Database location from `ADMIN_INSIGHTS_DB`, if set.
pub fn database_path_from_env() -> Option<PathBuf> {
    std::env::var("ADMIN_INSIGHTS_DB").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webroot_gets_trailing_slash() {
        let config = HostConfig::new("https://host.example.org", "14.5.0");
        assert_eq!(config.webroot_url, "https://host.example.org/");
    }

    #[test]
    fn versioned_url_includes_host_version() {
        let config = HostConfig::new("https://host.example.org/", "14.5.0");
        assert_eq!(
            config.versioned_url("/Logging/index.php?pid=3"),
            "https://host.example.org/redcap_v14.5.0/Logging/index.php?pid=3"
        );
    }

    #[test]
    fn asset_urls_are_derived_from_webroot() {
        let config = HostConfig::new("https://host.example.org/", "14.5.0");
        assert_eq!(
            config.script_url(),
            "https://host.example.org/modules/admin_insights/js/admin-insights.js"
        );
    }
}
