use crate::infrastructure::error::StoreError;
use chrono_tz::Tz;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "StudyBlocks",
        "timezone": "UTC"
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), StoreError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, StoreError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| StoreError::InvalidInput(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(StoreError::InvalidInput(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<serde_json::Value, StoreError> {
    read_config(&config_dir.join(APP_JSON))
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, StoreError> {
    let app = load_app_config(config_dir)?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

// Display timezone only affects conflict-message rendering; stored instants stay UTC.
pub fn read_display_timezone(config_dir: &Path) -> Tz {
    read_timezone(config_dir)
        .ok()
        .flatten()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}
