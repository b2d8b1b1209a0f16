use crate::handler::http::action::Upstream;

/// Store key of the value substituted for `~`.
pub const DOCUMENT_ROOT: &str = "documentRoot";
/// Store key of the response delay, in milliseconds.
pub const DELAY: &str = "delay";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HeaderScope {
    Request,
    Response,
}

/// RequestState is the view of one in-flight request the rule engine works on. It is implemented
/// by the transport, which later turns the recorded changes into the real upstream request and
/// client response.
pub trait RequestState {
    /// The full request URL, including scheme and query string.
    fn url(&self) -> &str;
    fn host(&self) -> String;
    fn port(&self) -> String;
    fn path(&self) -> String;
    fn query(&self) -> String;
    fn request_header(&self, name: &str) -> Option<String>;
    fn query_param(&self, name: &str) -> Option<String>;
    fn cookie(&self, name: &str) -> Option<String>;

    fn set_url(&mut self, url: String);
    fn set_header(&mut self, scope: HeaderScope, name: &str, value: &str);
    fn remove_header(&mut self, scope: HeaderScope, name: &str);
    fn set_query_param(&mut self, name: &str, value: &str);
    fn remove_query_param(&mut self, name: &str);
    fn set_cookie(&mut self, name: &str, value: &str);
    fn remove_cookie(&mut self, name: &str);
    fn override_status(&mut self, code: u16);
    fn set_response_type(&mut self, content_type: &str);
    /// Routes the request through an upstream proxy; `None` keeps the direct connection.
    fn set_upstream(&mut self, upstream: Option<Upstream>);
    /// Attaches a command the dispatcher evaluates before sending the request.
    fn set_eval_directive(&mut self, command: String);

    fn get(&self, key: &str) -> Option<&str>;
    fn set(&mut self, key: &str, value: String);
}
