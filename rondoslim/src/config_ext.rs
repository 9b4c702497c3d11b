//! rondoconfig extension for the slim backend section.

use serde_yaml::Value;

/// Extension trait for `rondoconfig::Config`.
pub trait SlimConfigExt {
    /// Address of the backend's CLI endpoint.
    fn slim_host(&self) -> String;

    /// Port of the backend's CLI endpoint.
    fn slim_port(&self) -> u16;

    /// Base URL of the backend's web interface, for cover art. `None`
    /// disables art fetching.
    fn slim_web_url(&self) -> Option<String>;

    /// Backend player id to attach to. `None` picks the first player
    /// the backend reports.
    fn slim_player(&self) -> Option<String>;
}

impl SlimConfigExt for rondoconfig::Config {
    fn slim_host(&self) -> String {
        match self.get_value(&["slim", "host"]) {
            Ok(Value::String(host)) if !host.is_empty() => host,
            _ => "127.0.0.1".to_string(),
        }
    }

    fn slim_port(&self) -> u16 {
        match self.get_value(&["slim", "port"]) {
            Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap() as u16,
            _ => 9090,
        }
    }

    fn slim_web_url(&self) -> Option<String> {
        match self.get_value(&["slim", "web_url"]) {
            Ok(Value::String(url)) if !url.is_empty() => Some(url),
            _ => None,
        }
    }

    fn slim_player(&self) -> Option<String> {
        match self.get_value(&["slim", "player"]) {
            Ok(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}
