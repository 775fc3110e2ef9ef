use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{AppError, Context};

use super::FetchResult;

/// Build the default header map for upstream requests.
///
/// Values may reference environment variables as `${NAME}`, which keeps API
/// keys out of config files.
pub fn build_headers(headers: &HashMap<String, String>) -> FetchResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("Invalid header name: {}", key))?;
        let expanded = expand_env_vars(value, |name| std::env::var(name).ok())?;
        let header_value = HeaderValue::from_str(&expanded)
            .with_context(|| format!("Invalid header value for {}", key))?;
        map.insert(name, header_value);
    }
    Ok(map)
}

/// Substitute `${NAME}` placeholders using `lookup`.
pub fn expand_env_vars<F>(value: &str, lookup: F) -> FetchResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            AppError::Config("Unterminated environment placeholder in header".to_string())
        })?;

        let name = &after[..end];
        if name.is_empty() {
            return Err(AppError::Config(
                "Encountered empty environment placeholder in header".to_string(),
            ));
        }

        let resolved = lookup(name).ok_or_else(|| {
            AppError::Config(format!(
                "Environment variable {} required by request header is not set",
                name
            ))
        })?;
        result.push_str(&resolved);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
