//! W3C WebDriver backend (chromedriver, geckodriver, Selenium).
//!
//! # Responsibilities
//! - Create one headless browser session per remote session
//! - Translate `BrowserAction`s into WebDriver action chains
//! - Fetch viewport screenshots as PNG bytes

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde_json::{json, Value};
use url::Url;

use crate::remote::driver::{BrowserAction, BrowserDriver, BrowserHandle, SessionError, Viewport};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const DEFAULT_UPLOAD_SELECTOR: &str = "input[type=file]";

pub struct WebDriverBrowser {
    client: reqwest::Client,
    base: Url,
}

impl WebDriverBrowser {
    pub fn new(webdriver_url: &str, timeout: Duration) -> Result<Self, SessionError> {
        let mut base = Url::parse(webdriver_url).map_err(|e| SessionError::Driver(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| SessionError::Driver(e.to_string()))?;
        Ok(Self { client, base })
    }

    async fn command(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value, SessionError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| SessionError::Driver(e.to_string()))?;

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Driver(e.to_string()))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SessionError::Driver(e.to_string()))?;

        if !status.is_success() {
            return Err(SessionError::Driver(driver_error_message(&payload, status.as_u16())));
        }
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, SessionError> {
        self.command(reqwest::Method::POST, path, Some(body)).await
    }

    async fn upload(&self, handle: &BrowserHandle, selector: Option<&str>, path: &str) -> Result<(), SessionError> {
        let found = self
            .post(
                &format!("session/{}/element", handle.0),
                json!({"using": "css selector", "value": selector.unwrap_or(DEFAULT_UPLOAD_SELECTOR)}),
            )
            .await?;
        let element = found
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Driver("file input not found".into()))?;

        self.post(
            &format!("session/{}/element/{}/value", handle.0, element),
            json!({"text": path}),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn open(&self, url: &Url, viewport: Viewport) -> Result<BrowserHandle, SessionError> {
        let created = self.post("session", new_session_body(viewport)).await?;
        let id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Driver("driver returned no sessionId".into()))?
            .to_string();
        let handle = BrowserHandle(id);

        if let Err(e) = self
            .post(&format!("session/{}/url", handle.0), json!({"url": url.as_str()}))
            .await
        {
            let _ = self.close(&handle).await;
            return Err(e);
        }
        Ok(handle)
    }

    async fn screenshot(&self, handle: &BrowserHandle) -> Result<Bytes, SessionError> {
        let value = self
            .command(reqwest::Method::GET, &format!("session/{}/screenshot", handle.0), None)
            .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| SessionError::Driver("screenshot payload is not a string".into()))?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(|e| SessionError::Driver(format!("screenshot decode: {e}")))
    }

    async fn perform(&self, handle: &BrowserHandle, action: &BrowserAction) -> Result<(), SessionError> {
        match action {
            BrowserAction::Scroll { dx, dy } => {
                self.post(
                    &format!("session/{}/execute/sync", handle.0),
                    json!({"script": "window.scrollBy(arguments[0], arguments[1]);", "args": [dx, dy]}),
                )
                .await?;
            }
            BrowserAction::Upload { selector, path } => {
                self.upload(handle, selector.as_deref(), path).await?;
            }
            other => {
                self.post(&format!("session/{}/actions", handle.0), action_chain(other)?)
                    .await?;
            }
        }
        Ok(())
    }

    async fn close(&self, handle: &BrowserHandle) -> Result<(), SessionError> {
        self.command(reqwest::Method::DELETE, &format!("session/{}", handle.0), None)
            .await
            .map(|_| ())
    }
}

fn new_session_body(viewport: Viewport) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "goog:chromeOptions": {
                    "args": [
                        "--headless=new",
                        "--disable-gpu",
                        format!("--window-size={},{}", viewport.width, viewport.height),
                    ]
                },
                "moz:firefoxOptions": {
                    "args": [
                        "-headless",
                        format!("--width={}", viewport.width),
                        format!("--height={}", viewport.height),
                    ]
                }
            }
        }
    })
}

/// Pointer and key input for `POST /session/{id}/actions`.
fn action_chain(action: &BrowserAction) -> Result<Value, SessionError> {
    let chain = match action {
        BrowserAction::Click { x, y } => json!([{
            "type": "pointer",
            "id": "mouse",
            "parameters": {"pointerType": "mouse"},
            "actions": [
                {"type": "pointerMove", "duration": 0, "origin": "viewport", "x": x, "y": y},
                {"type": "pointerDown", "button": 0},
                {"type": "pointerUp", "button": 0}
            ]
        }]),
        BrowserAction::Type { text } => key_chain(text.chars().map(String::from)),
        BrowserAction::Key { key } => key_chain(std::iter::once(key_value(key))),
        _ => return Err(SessionError::InvalidAction(format!("{} has no action chain", action.kind()))),
    };
    Ok(json!({"actions": chain}))
}

fn key_chain(keys: impl Iterator<Item = String>) -> Value {
    let actions: Vec<Value> = keys
        .flat_map(|k| {
            [
                json!({"type": "keyDown", "value": k}),
                json!({"type": "keyUp", "value": k}),
            ]
        })
        .collect();
    json!([{"type": "key", "id": "keyboard", "actions": actions}])
}

/// Map DOM key names onto WebDriver's private-use code points.
fn key_value(key: &str) -> String {
    let code = match key {
        "Backspace" => '\u{E003}',
        "Tab" => '\u{E004}',
        "Enter" => '\u{E007}',
        "Shift" => '\u{E008}',
        "Control" => '\u{E009}',
        "Alt" => '\u{E00A}',
        "Escape" => '\u{E00C}',
        " " | "Space" => '\u{E00D}',
        "PageUp" => '\u{E00E}',
        "PageDown" => '\u{E00F}',
        "End" => '\u{E010}',
        "Home" => '\u{E011}',
        "ArrowLeft" => '\u{E012}',
        "ArrowUp" => '\u{E013}',
        "ArrowRight" => '\u{E014}',
        "ArrowDown" => '\u{E015}',
        "Delete" => '\u{E017}',
        "Meta" => '\u{E03D}',
        _ => return key.to_string(),
    };
    code.to_string()
}

fn driver_error_message(payload: &Value, status: u16) -> String {
    let value = payload.get("value");
    let error = value
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    format!("{error} (HTTP {status}) {message}").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(key_value("Enter"), "\u{E007}");
        assert_eq!(key_value("a"), "a");
    }

    #[test]
    fn test_click_chain() {
        let chain = action_chain(&BrowserAction::Click { x: 5, y: 7 }).unwrap();
        let moves = &chain["actions"][0]["actions"];
        assert_eq!(moves[0]["x"], 5);
        assert_eq!(moves[0]["y"], 7);
        assert_eq!(moves[1]["type"], "pointerDown");
    }

    #[test]
    fn test_type_chain_per_character() {
        let chain = action_chain(&BrowserAction::Type { text: "ab".into() }).unwrap();
        let keys = chain["actions"][0]["actions"].as_array().unwrap();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[2]["value"], "b");
    }

    #[test]
    fn test_upload_has_no_chain() {
        let upload = BrowserAction::Upload { selector: None, path: "/tmp/x".into() };
        assert!(matches!(action_chain(&upload), Err(SessionError::InvalidAction(_))));
    }

    #[test]
    fn test_driver_error_message() {
        let payload = json!({"value": {"error": "invalid session id", "message": "gone"}});
        assert_eq!(driver_error_message(&payload, 404), "invalid session id (HTTP 404) gone");
    }

    #[test]
    fn test_base_gets_trailing_slash() {
        let driver = WebDriverBrowser::new("http://127.0.0.1:4444/wd/hub", Duration::from_secs(5)).unwrap();
        assert_eq!(driver.base.as_str(), "http://127.0.0.1:4444/wd/hub/");
    }

    #[test]
    fn test_session_body_carries_viewport() {
        let body = new_session_body(Viewport { width: 800, height: 600 });
        let args = &body["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert_eq!(args[2], "--window-size=800,600");
    }
}
