//! Minimal W3C WebDriver client over HTTP. Covers only the handful of
//! commands the browser probe needs: session lifecycle, navigation, element
//! queries, click, and keystrokes.

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::debug;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Entry point: talks to a chromedriver-compatible endpoint.
#[derive(Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
    base: String,
}

impl WebDriverClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Whether a driver is listening and ready. Used for strategy selection,
    /// so failures are an answer, not an error.
    pub async fn status_ok(&self) -> bool {
        let url = format!("{}/status", self.base);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v["value"]["ready"].as_bool())
                .unwrap_or(true),
            _ => false,
        }
    }

    pub async fn new_session(&self) -> Result<WebDriverSession> {
        let payload = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--headless=new", "--no-sandbox", "--disable-dev-shm-usage"]
                    }
                }
            }
        });
        let url = format!("{}/session", self.base);
        let value: Value = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach WebDriver endpoint")?
            .json()
            .await
            .context("Invalid WebDriver session response")?;

        let id = value["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| anyhow!("WebDriver did not return a session id"))?
            .to_string();
        debug!(session = %id, "webdriver session created");
        Ok(WebDriverSession {
            http: self.http.clone(),
            base: format!("{}/session/{}", self.base, id),
        })
    }
}

/// One live browser session. `close` is best-effort; the driver reaps
/// abandoned sessions on its own timeout.
pub struct WebDriverSession {
    http: reqwest::Client,
    base: String,
}

impl WebDriverSession {
    async fn command(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.context("WebDriver request failed")?;
        let status = resp.status();
        let value: Value = resp.json().await.context("Invalid WebDriver response")?;
        if !status.is_success() {
            return Err(anyhow!(
                "WebDriver error: {}",
                value["value"]["message"].as_str().unwrap_or("unknown")
            ));
        }
        Ok(value)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.command(reqwest::Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        let value = self.command(reqwest::Method::GET, "/url", None).await?;
        Ok(value["value"].as_str().unwrap_or_default().to_string())
    }

    pub async fn body_text(&self) -> Result<String> {
        let value = self
            .command(
                reqwest::Method::POST,
                "/execute/sync",
                Some(json!({
                    "script": "return document.body ? document.body.innerText : ''",
                    "args": []
                })),
            )
            .await?;
        Ok(value["value"].as_str().unwrap_or_default().to_string())
    }

    /// Element ids matching a CSS selector, in document order.
    pub async fn find_elements(&self, css: &str) -> Result<Vec<String>> {
        let value = self
            .command(
                reqwest::Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        Ok(extract_element_ids(&value))
    }

    pub async fn click(&self, element_id: &str) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element_id}/click"),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    pub async fn send_keys(&self, element_id: &str, text: &str) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element_id}/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    pub async fn close(self) {
        let url = self.base.clone();
        let _ = self.http.delete(&url).send().await;
    }
}

fn extract_element_ids(response: &Value) -> Vec<String> {
    response["value"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item[ELEMENT_KEY].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_ok_false_when_unreachable() {
        let client = WebDriverClient::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(300))
                .build()
                .unwrap(),
            "http://127.0.0.1:1",
        );
        assert!(!client.status_ok().await);
    }

    #[test]
    fn test_extract_element_ids() {
        let response = json!({
            "value": [
                { "element-6066-11e4-a52e-4f735466cecf": "abc-1" },
                { "element-6066-11e4-a52e-4f735466cecf": "abc-2" },
                { "unrelated": true }
            ]
        });
        assert_eq!(extract_element_ids(&response), vec!["abc-1", "abc-2"]);

        let empty = json!({ "value": [] });
        assert!(extract_element_ids(&empty).is_empty());

        let malformed = json!({ "value": null });
        assert!(extract_element_ids(&malformed).is_empty());
    }
}
