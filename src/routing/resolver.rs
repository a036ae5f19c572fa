//! Hostname/URI to service resolution.
//!
//! # Responsibilities
//! - Walk service records and their `proxyHostnames` in order, first hit wins
//! - Recognise IP-mapping patterns and report the path prefix to strip
//! - Retry with the Referer's path prepended when nothing matched, so
//!   sub-resources of a page served through an IP mapping still resolve

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::http::headers::Headers;
use crate::observability::metrics;
use crate::routing::matcher::HostPattern;

/// One routable backend, as stored in `<name>.json`.
///
/// Fields other than `proxyHostnames` belong to the forwarding layer and
/// are carried through untouched in `target`, including a JSON `name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    /// File stem the record was loaded from.
    #[serde(skip)]
    pub name: String,

    #[serde(default, deserialize_with = "hostname_list")]
    pub proxy_hostnames: Vec<String>,

    #[serde(flatten)]
    pub target: Map<String, Value>,

    #[serde(skip)]
    patterns: OnceLock<Vec<HostPattern>>,
}

/// `null` or a non-array reads as no patterns; non-string entries are skipped.
fn hostname_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(pattern) => Some(pattern),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

impl ServiceRecord {
    pub fn new<I, S>(name: &str, proxy_hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            proxy_hostnames: proxy_hostnames.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// `proxyHostnames`, compiled on first use.
    ///
    /// Records are shared read-only once loaded; mutating `proxy_hostnames`
    /// after the first lookup is not reflected.
    pub fn patterns(&self) -> &[HostPattern] {
        self.patterns
            .get_or_init(|| self.proxy_hostnames.iter().map(|p| HostPattern::parse(p)).collect())
    }
}

/// A successful resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Matched on hostname.
    Service(Arc<ServiceRecord>),
    /// Matched an `@/prefix` pattern; the prefix must be removed from the URI
    /// before forwarding.
    IpMapped {
        service: Arc<ServiceRecord>,
        strip_path: String,
    },
}

impl Resolution {
    pub fn service(&self) -> &Arc<ServiceRecord> {
        match self {
            Resolution::Service(service) | Resolution::IpMapped { service, .. } => service,
        }
    }

    pub fn strip_path(&self) -> Option<&str> {
        match self {
            Resolution::Service(_) => None,
            Resolution::IpMapped { strip_path, .. } => Some(strip_path.as_str()),
        }
    }

    /// The URI to send upstream. Strips the mapped prefix when `uri`
    /// carries it; a Referer-corrected request never did, so it passes
    /// through as is.
    pub fn forward_uri<'a>(&self, uri: &'a str) -> &'a str {
        match self.strip_path() {
            Some(prefix) if !prefix.is_empty() => match uri.strip_prefix(prefix) {
                Some("") => "/",
                Some(rest) => rest,
                None => uri,
            },
            _ => uri,
        }
    }
}

/// First service whose patterns match `hostname` and `uri`.
pub fn match_service<'a, I>(services: I, hostname: &str, uri: &str) -> Option<Resolution>
where
    I: IntoIterator<Item = &'a Arc<ServiceRecord>>,
{
    for service in services {
        for pattern in service.patterns() {
            if let HostPattern::IpMapping(_) = pattern {
                if let Some(prefix) = pattern.ip_mapping_match(hostname, uri) {
                    return Some(Resolution::IpMapped {
                        service: Arc::clone(service),
                        strip_path: prefix.to_string(),
                    });
                }
            } else if pattern.matches_host(hostname) {
                return Some(Resolution::Service(Arc::clone(service)));
            }
        }
    }
    None
}

/// Resolve a request to a service.
///
/// `hostname` is `None` when the request carried no usable host; that never
/// matches. When nothing matches directly and `headers` has a `Referer`
/// whose path is not already a prefix of `uri`, matching is retried once
/// with that path prepended.
pub fn resolve<'a, I>(services: I, hostname: Option<&str>, uri: &str, headers: Option<&Headers>) -> Option<Resolution>
where
    I: IntoIterator<Item = &'a Arc<ServiceRecord>> + Clone,
{
    let Some(hostname) = hostname else {
        metrics::record_resolution("miss");
        return None;
    };

    if let Some(found) = match_service(services.clone(), hostname, uri) {
        metrics::record_resolution(match &found {
            Resolution::Service(_) => "direct",
            Resolution::IpMapped { .. } => "ip_mapped",
        });
        return Some(found);
    }

    let adjusted = headers.and_then(|h| referer_adjusted_uri(h, uri));
    let found = adjusted.and_then(|adjusted| {
        tracing::trace!(hostname, uri, adjusted = %adjusted, "Retrying with Referer prefix");
        match_service(services, hostname, &adjusted)
    });
    metrics::record_resolution(if found.is_some() { "referer" } else { "miss" });
    found
}

/// `uri` with the Referer's path prepended, when that is worth a retry.
fn referer_adjusted_uri(headers: &Headers, uri: &str) -> Option<String> {
    let referer = Url::parse(headers.get("referer")?).ok()?;
    let path = referer.path();
    let prefix = path.strip_suffix('/').unwrap_or(path);
    if prefix.is_empty() || prefix == "/" || uri.starts_with(prefix) {
        return None;
    }
    Some(format!("{}{}", prefix, uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(records: Vec<ServiceRecord>) -> Vec<Arc<ServiceRecord>> {
        records.into_iter().map(Arc::new).collect()
    }

    fn name(resolution: Option<Resolution>) -> Option<String> {
        resolution.map(|r| r.service().name.clone())
    }

    #[test]
    fn test_first_match_wins() {
        let services = services(vec![
            ServiceRecord::new("catchall", [".example.com"]),
            ServiceRecord::new("api", ["api.example.com"]),
        ]);
        assert_eq!(name(resolve(&services, Some("api.example.com"), "/", None)), Some("catchall".into()));
        assert_eq!(name(resolve(&services, Some("example.org"), "/", None)), None);
    }

    #[test]
    fn test_patterns_in_declared_order() {
        let services = services(vec![ServiceRecord::new("web", ["@/web", "web.local"])]);
        let hit = resolve(&services, Some("web.local"), "/web/x", None).unwrap();
        assert!(hit.strip_path().is_none());

        let hit = resolve(&services, Some("192.168.0.2"), "/web/x", None).unwrap();
        assert_eq!(hit.strip_path(), Some("/web"));
    }

    #[test]
    fn test_missing_hostname_and_empty_patterns() {
        let services = services(vec![ServiceRecord::new("empty", Vec::<String>::new())]);
        assert!(resolve(&services, None, "/", None).is_none());
        assert!(resolve(&services, Some("anything"), "/", None).is_none());
    }

    #[test]
    fn test_ip_mapping() {
        let services = services(vec![ServiceRecord::new("cod", ["@/cod"])]);

        match resolve(&services, Some("10.0.0.5"), "/cod/x", None) {
            Some(Resolution::IpMapped { service, strip_path }) => {
                assert_eq!(service.name, "cod");
                assert_eq!(strip_path, "/cod");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(resolve(&services, Some("example.com"), "/cod/x", None).is_none());
    }

    #[test]
    fn test_referer_fallback() {
        let services = services(vec![ServiceRecord::new("cod", ["@/cod"])]);
        let headers = Headers::from_iter([("Referer", "http://10.0.0.5/cod/page")]);

        // Without the Referer the asset request misses.
        assert!(resolve(&services, Some("10.0.0.5"), "/asset.js", None).is_none());

        let hit = resolve(&services, Some("10.0.0.5"), "/asset.js", Some(&headers)).unwrap();
        assert_eq!(hit.strip_path(), Some("/cod"));
        assert_eq!(hit.forward_uri("/asset.js"), "/asset.js");
    }

    #[test]
    fn test_referer_prefix_rules() {
        let headers = |referer: &str| Headers::from_iter([("referer", referer)]);

        assert_eq!(referer_adjusted_uri(&headers("http://h/cod/"), "/a.js"), Some("/cod/a.js".into()));
        assert_eq!(referer_adjusted_uri(&headers("http://h/cod/page"), "/a.js"), Some("/cod/page/a.js".into()));
        assert_eq!(referer_adjusted_uri(&headers("http://h/"), "/a.js"), None);
        assert_eq!(referer_adjusted_uri(&headers("http://h"), "/a.js"), None);
        assert_eq!(referer_adjusted_uri(&headers("http://h/cod"), "/cod/a.js"), None);
        assert_eq!(referer_adjusted_uri(&headers("not a url"), "/a.js"), None);
        assert_eq!(referer_adjusted_uri(&Headers::new(), "/a.js"), None);
    }

    #[test]
    fn test_referer_only_used_on_miss() {
        let services = services(vec![
            ServiceRecord::new("site", ["site.local"]),
            ServiceRecord::new("cod", ["@/cod"]),
        ]);
        let headers = Headers::from_iter([("Referer", "http://site.local/cod/")]);
        let hit = resolve(&services, Some("site.local"), "/x", Some(&headers)).unwrap();
        assert_eq!(hit.service().name, "site");
    }

    #[test]
    fn test_forward_uri() {
        let service = Arc::new(ServiceRecord::new("cod", ["@/cod"]));
        let mapped = Resolution::IpMapped { service: Arc::clone(&service), strip_path: "/cod".into() };
        assert_eq!(mapped.forward_uri("/cod/x?y=1"), "/x?y=1");
        assert_eq!(mapped.forward_uri("/cod"), "/");
        assert_eq!(Resolution::Service(service).forward_uri("/cod/x"), "/cod/x");
    }

    #[test]
    fn test_record_keeps_target_fields() {
        let record: ServiceRecord = serde_json::from_str(
            r#"{"proxyHostnames":["a.test"],"proxyTarget":"http://127.0.0.1:8080","ws":true}"#,
        )
        .unwrap();
        assert_eq!(record.proxy_hostnames, vec!["a.test"]);
        assert_eq!(record.target["proxyTarget"], "http://127.0.0.1:8080");
        assert_eq!(record.target["ws"], true);

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["proxyHostnames"][0], "a.test");
        assert!(back.get("name").is_none());
    }

    #[test]
    fn test_record_tolerates_loose_json() {
        let record: ServiceRecord =
            serde_json::from_str(r#"{"name":7,"proxyHostnames":["a.test",3,null]}"#).unwrap();
        assert_eq!(record.name, "");
        assert_eq!(record.target["name"], 7);
        assert_eq!(record.proxy_hostnames, vec!["a.test"]);

        for raw in [r#"{"proxyHostnames":null}"#, r#"{"proxyHostnames":"a.test"}"#, "{}"] {
            let record: ServiceRecord = serde_json::from_str(raw).unwrap();
            assert!(record.proxy_hostnames.is_empty(), "{}", raw);
        }

        // The stem-derived name never clashes with a JSON `name` on output.
        let mut record: ServiceRecord = serde_json::from_str(r#"{"name":"Pretty"}"#).unwrap();
        record.name = "b".into();
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["name"], "Pretty");
    }
}
