use std::{collections::HashMap, fs};

#[derive(Debug, Default, PartialEq)]
pub struct Settings {
    pub service_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Loads `demo.toml` from the working directory, then applies environment
/// overrides. Flags passed on the command line win over both.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("demo.toml") {
        apply_file(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("ANALYSIS_SERVICE_URL") {
        settings.service_url = Some(v);
    }
    if let Ok(v) = std::env::var("APP__SERVICE_URL") {
        settings.service_url = Some(v);
    }
    if let Ok(v) = std::env::var("ANALYSIS_TIMEOUT_SECS") {
        settings.request_timeout_secs = v.parse().ok();
    }

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("service_url") {
            settings.service_url = Some(v.clone());
        }
        if let Some(v) = file_cfg.get("request_timeout_secs") {
            settings.request_timeout_secs = v.parse().ok();
        }
    }
}
