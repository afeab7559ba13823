//! Minimal W3C WebDriver client.
//!
//! Only the commands the portal automation needs: one session, CSS lookups,
//! element state and keyboard/mouse input.

use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// JSON key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// Errors returned by the WebDriver server or the transport.
#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("cannot connect to WebDriver at {0}; is chromedriver running?")]
    Connect(String),

    #[error("WebDriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error '{error}': {message}")]
    Command { error: String, message: String },

    #[error("unexpected WebDriver response: {0}")]
    UnexpectedResponse(String),
}

impl WebDriverError {
    /// Errors caused by the page changing under us, worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WebDriverError::Command { error, .. }
                if error == "no such element"
                    || error == "element not interactable"
                    || error == "stale element reference"
        )
    }
}

/// Reference to an element of the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

/// A live WebDriver session.
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Start a maximized Chrome session.
    pub async fn new_session(base_url: &str) -> Result<Self, WebDriverError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": ["--start-maximized"] }
                }
            }
        });

        let url = format!("{}/session", base_url);
        let value = send(&http, &base_url, Method::POST, &url, Some(capabilities)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))?
            .to_string();

        debug!("WebDriver session {} started", session_id);
        Ok(Self {
            http,
            base_url,
            session_id,
        })
    }

    pub async fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    /// All elements of the page matching a CSS selector.
    pub async fn find_elements(&self, css: &str) -> Result<Vec<ElementId>, WebDriverError> {
        let value = self
            .command(Method::POST, "/elements", Some(css_locator(css)))
            .await?;
        parse_elements(value)
    }

    /// Descendants of `parent` matching a CSS selector.
    pub async fn find_elements_from(
        &self,
        parent: &ElementId,
        css: &str,
    ) -> Result<Vec<ElementId>, WebDriverError> {
        let path = format!("/element/{}/elements", parent.0);
        let value = self
            .command(Method::POST, &path, Some(css_locator(css)))
            .await?;
        parse_elements(value)
    }

    pub async fn attribute(
        &self,
        element: &ElementId,
        name: &str,
    ) -> Result<Option<String>, WebDriverError> {
        let path = format!("/element/{}/attribute/{}", element.0, name);
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn text(&self, element: &ElementId) -> Result<String, WebDriverError> {
        let path = format!("/element/{}/text", element.0);
        let value = self.command(Method::GET, &path, None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))
    }

    pub async fn is_selected(&self, element: &ElementId) -> Result<bool, WebDriverError> {
        self.element_flag(element, "selected").await
    }

    pub async fn is_enabled(&self, element: &ElementId) -> Result<bool, WebDriverError> {
        self.element_flag(element, "enabled").await
    }

    pub async fn is_displayed(&self, element: &ElementId) -> Result<bool, WebDriverError> {
        self.element_flag(element, "displayed").await
    }

    pub async fn click(&self, element: &ElementId) -> Result<(), WebDriverError> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({})))
            .await
            .map(|_| ())
    }

    pub async fn clear(&self, element: &ElementId) -> Result<(), WebDriverError> {
        let path = format!("/element/{}/clear", element.0);
        self.command(Method::POST, &path, Some(json!({})))
            .await
            .map(|_| ())
    }

    pub async fn send_keys(&self, element: &ElementId, text: &str) -> Result<(), WebDriverError> {
        let path = format!("/element/{}/value", element.0);
        self.command(Method::POST, &path, Some(json!({ "text": text })))
            .await
            .map(|_| ())
    }

    /// End the session, closing the browser.
    pub async fn delete_session(self) -> Result<(), WebDriverError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        send(&self.http, &self.base_url, Method::DELETE, &url, None).await?;
        debug!("WebDriver session {} closed", self.session_id);
        Ok(())
    }

    async fn element_flag(&self, element: &ElementId, flag: &str) -> Result<bool, WebDriverError> {
        let path = format!("/element/{}/{}", element.0, flag);
        let value = self.command(Method::GET, &path, None).await?;
        value
            .as_bool()
            .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        send(&self.http, &self.base_url, method, &url, body).await
    }
}

async fn send(
    http: &reqwest::Client,
    base_url: &str,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, WebDriverError> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_connect() {
            WebDriverError::Connect(base_url.to_string())
        } else {
            WebDriverError::Http(e)
        }
    })?;

    let success = response.status().is_success();
    let payload: Value = response.json().await?;
    unwrap_value(success, payload)
}

fn css_locator(css: &str) -> Value {
    json!({ "using": "css selector", "value": css })
}

/// Extract the `value` member of a response, turning error payloads into
/// [`WebDriverError::Command`].
fn unwrap_value(success: bool, mut payload: Value) -> Result<Value, WebDriverError> {
    let value = payload
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if success {
        return Ok(value);
    }

    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let error = field("error");
    if error.is_empty() {
        return Err(WebDriverError::UnexpectedResponse(payload.to_string()));
    }
    Err(WebDriverError::Command {
        error,
        message: field("message"),
    })
}

fn parse_elements(value: Value) -> Result<Vec<ElementId>, WebDriverError> {
    let items = value
        .as_array()
        .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))?;

    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementId(id.to_string()))
                .ok_or_else(|| WebDriverError::UnexpectedResponse(item.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_success_value() {
        let payload = json!({ "value": { "sessionId": "abc" } });
        let value = unwrap_value(true, payload).unwrap();
        assert_eq!(value["sessionId"], "abc");

        assert_eq!(unwrap_value(true, json!({ "value": null })).unwrap(), Value::Null);
    }

    #[test]
    fn test_unwrap_error_value() {
        let payload = json!({
            "value": {
                "error": "no such element",
                "message": "Unable to locate element",
                "stacktrace": ""
            }
        });
        let err = unwrap_value(false, payload).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "WebDriver error 'no such element': Unable to locate element"
        );
    }

    #[test]
    fn test_unwrap_session_error_is_not_transient() {
        let payload = json!({
            "value": { "error": "invalid session id", "message": "session deleted" }
        });
        assert!(!unwrap_value(false, payload).unwrap_err().is_transient());

        let garbage = unwrap_value(false, json!({ "status": 13 })).unwrap_err();
        assert!(matches!(garbage, WebDriverError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_parse_elements() {
        let value = json!([
            { ELEMENT_KEY: "one" },
            { ELEMENT_KEY: "two" }
        ]);
        assert_eq!(
            parse_elements(value).unwrap(),
            vec![ElementId("one".to_string()), ElementId("two".to_string())]
        );
        assert!(parse_elements(json!([])).unwrap().is_empty());
        assert!(parse_elements(json!([{ "ELEMENT": "legacy" }])).is_err());
        assert!(parse_elements(json!("nope")).is_err());
    }

    #[test]
    fn test_css_locator() {
        assert_eq!(
            css_locator("#unique_id"),
            json!({ "using": "css selector", "value": "#unique_id" })
        );
    }
}
