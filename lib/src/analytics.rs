//! Fire-and-forget forwarding to the external analytics sink.
//!
//! Ingestion calls this on its hot path, so forwarding never blocks and
//! never fails the caller. Disabled, unkeyed, or outside a runtime it is
//! a no-op.

use std::time::Duration;

use serde_json::json;

use crate::Config;

pub fn forward(config: &Config, event_type: &str, properties: serde_json::Value) {
    if !config.analytics.enabled || config.analytics.api_key.is_empty() {
        return;
    }
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => return,
    };

    let endpoint = config.analytics.endpoint.clone();
    let api_key = config.analytics.api_key.clone();
    let timeout = Duration::from_millis(config.analytics.timeout_ms);
    let event_type = event_type.to_string();

    handle.spawn(async move {
        let body = json!({
            "api_key": api_key,
            "events": [{
                "event_type": event_type,
                "device_id": "server",
                "event_properties": properties,
                "time": chrono::Utc::now().timestamp_millis(),
            }],
        });

        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!("analytics client build failed: {e}");
                return;
            }
        };
        if let Err(e) = client.post(&endpoint).json(&body).send().await {
            tracing::debug!("analytics forward failed: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sink_is_a_noop() {
        forward(&Config::default(), "email_open", json!({ "mailId": "m1" }));
    }

    #[test]
    fn enabled_but_unkeyed_sink_is_a_noop() {
        let mut config = Config::default();
        config.analytics.enabled = true;
        forward(&config, "email_open", json!({}));
    }

    #[tokio::test]
    async fn forwarding_outside_the_gate_never_panics() {
        let mut config = Config::default();
        config.analytics.enabled = true;
        config.analytics.api_key = "test-key".to_string();
        config.analytics.endpoint = "http://127.0.0.1:9".to_string();
        config.analytics.timeout_ms = 50;
        forward(&config, "email_open", json!({ "mailId": "m1" }));
    }
}
