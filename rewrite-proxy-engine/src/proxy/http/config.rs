#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Config {
    pub proxy_port: u16,
    /// Initial `documentRoot` of every request.
    pub document_root: Option<String>,
}
