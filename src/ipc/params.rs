use serde_json::Value;

use super::error::err;

pub struct ParamErr {
    pub code: &'static str,
    pub message: String,
}

impl ParamErr {
    pub fn bad(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
        }
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, None)
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String, ParamErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParamErr::bad(format!("missing {}", key)))
}

pub fn opt_str(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

pub fn required_id_list(params: &Value, key: &str) -> Result<Vec<String>, ParamErr> {
    let ids: Vec<String> = params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if ids.is_empty() {
        return Err(ParamErr::bad(format!("{} must be a non-empty array", key)));
    }
    Ok(ids)
}
