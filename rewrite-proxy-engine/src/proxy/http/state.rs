use std::collections::HashMap;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use http::{Response, StatusCode, Uri};
use tracing::{debug, warn};

use crate::handler::http::action::Upstream;
use crate::handler::http::state::{HeaderScope, RequestState, DELAY};

/// HeaderEdit is a change to the response headers, replayed in order once the response exists.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum HeaderEdit {
    Set(HeaderName, HeaderValue),
    Remove(HeaderName),
}

/// HttpState is the [RequestState] of a request flowing through the proxy.
#[derive(Debug, Clone, Default)]
pub struct HttpState {
    url: String,
    headers: HeaderMap,
    response_edits: Vec<HeaderEdit>,
    status: Option<u16>,
    content_type: Option<String>,
    upstream: Option<Upstream>,
    eval_directive: Option<String>,
    store: HashMap<String, String>,
}

impl HttpState {
    pub fn new(url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            url: url.into(),
            headers,
            ..Default::default()
        }
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn upstream(&self) -> Option<&Upstream> {
        self.upstream.as_ref()
    }

    pub fn eval_directive(&self) -> Option<&str> {
        self.eval_directive.as_deref()
    }

    pub fn response_edits(&self) -> &[HeaderEdit] {
        &self.response_edits
    }

    /// delay is the `delay` store value when it is a positive number of milliseconds.
    pub fn delay(&self) -> Option<Duration> {
        self.store
            .get(DELAY)
            .and_then(|millis| millis.parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    /// apply_response writes the content type, the status override and the header edits into the
    /// response.
    pub fn apply_response<B>(&self, response: &mut Response<B>) {
        if let Some(content_type) = &self.content_type {
            match HeaderValue::from_str(content_type) {
                Ok(value) => {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                Err(e) => warn!("invalid content type {}: {}", content_type, e),
            }
        }
        if let Some(code) = self.status {
            match StatusCode::from_u16(code) {
                Ok(status) => *response.status_mut() = status,
                Err(e) => warn!("cannot override status with {}: {}", code, e),
            }
        }
        for edit in &self.response_edits {
            match edit {
                HeaderEdit::Set(name, value) => {
                    response.headers_mut().insert(name, value.clone());
                }
                HeaderEdit::Remove(name) => {
                    response.headers_mut().remove(name);
                }
            }
        }
    }

    fn uri(&self) -> Option<Uri> {
        self.url.parse().ok()
    }

    fn split_query(&self) -> (&str, &str) {
        self.url.split_once('?').unwrap_or((self.url.as_str(), ""))
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        serde_urlencoded::from_str(self.split_query().1).unwrap_or_default()
    }

    fn write_query(&mut self, pairs: &[(String, String)]) {
        let query = match serde_urlencoded::to_string(pairs) {
            Ok(query) => query,
            Err(e) => {
                warn!("cannot encode query of {}: {}", self.url, e);
                return;
            }
        };
        let base = self.split_query().0.to_string();
        self.url = if query.is_empty() {
            base
        } else {
            format!("{}?{}", base, query)
        };
    }

    fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }

    fn write_cookies(&mut self, cookies: &[(String, String)]) {
        self.headers.remove(COOKIE);
        if cookies.is_empty() {
            return;
        }
        let joined = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        match HeaderValue::from_str(&joined) {
            Ok(value) => {
                self.headers.insert(COOKIE, value);
            }
            Err(e) => warn!("invalid cookie header {}: {}", joined, e),
        }
    }
}

fn header_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => Some((name, value)),
        _ => {
            debug!("ignoring invalid header `{}: {}`", name, value);
            None
        }
    }
}

impl RequestState for HttpState {
    fn url(&self) -> &str {
        &self.url
    }

    fn host(&self) -> String {
        self.uri()
            .and_then(|uri| uri.host().map(str::to_string))
            .unwrap_or_default()
    }

    fn port(&self) -> String {
        self.uri()
            .map(|uri| match uri.port_u16() {
                Some(port) => port.to_string(),
                None if uri.scheme_str() == Some("https") => "443".to_string(),
                None => "80".to_string(),
            })
            .unwrap_or_default()
    }

    fn path(&self) -> String {
        self.uri()
            .map(|uri| uri.path().to_string())
            .unwrap_or_default()
    }

    fn query(&self) -> String {
        self.split_query().1.to_string()
    }

    fn request_header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    fn set_url(&mut self, url: String) {
        self.url = url;
    }

    fn set_header(&mut self, scope: HeaderScope, name: &str, value: &str) {
        if let Some((name, value)) = header_pair(name, value) {
            match scope {
                HeaderScope::Request => {
                    self.headers.insert(name, value);
                }
                HeaderScope::Response => self.response_edits.push(HeaderEdit::Set(name, value)),
            }
        }
    }

    fn remove_header(&mut self, scope: HeaderScope, name: &str) {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                debug!("ignoring invalid header name `{}`", name);
                return;
            }
        };
        match scope {
            HeaderScope::Request => {
                self.headers.remove(name);
            }
            HeaderScope::Response => self.response_edits.push(HeaderEdit::Remove(name)),
        }
    }

    fn set_query_param(&mut self, name: &str, value: &str) {
        let mut pairs = self.query_pairs();
        match pairs.iter().position(|(key, _)| key == name) {
            Some(index) => {
                pairs[index].1 = value.to_string();
                let mut seen = 0;
                pairs.retain(|(key, _)| {
                    seen += (key == name) as usize;
                    key != name || seen == 1
                });
            }
            None => pairs.push((name.to_string(), value.to_string())),
        }
        self.write_query(&pairs);
    }

    fn remove_query_param(&mut self, name: &str) {
        let mut pairs = self.query_pairs();
        pairs.retain(|(key, _)| key != name);
        self.write_query(&pairs);
    }

    fn set_cookie(&mut self, name: &str, value: &str) {
        let mut cookies = self.cookies();
        match cookies.iter_mut().find(|(key, _)| key == name) {
            Some(cookie) => cookie.1 = value.to_string(),
            None => cookies.push((name.to_string(), value.to_string())),
        }
        self.write_cookies(&cookies);
    }

    fn remove_cookie(&mut self, name: &str) {
        let mut cookies = self.cookies();
        cookies.retain(|(key, _)| key != name);
        self.write_cookies(&cookies);
    }

    fn override_status(&mut self, code: u16) {
        self.status = Some(code);
    }

    fn set_response_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    fn set_upstream(&mut self, upstream: Option<Upstream>) {
        self.upstream = upstream;
    }

    fn set_eval_directive(&mut self, command: String) {
        self.eval_directive = Some(command);
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.store.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.store.insert(key.to_string(), value);
    }
}
