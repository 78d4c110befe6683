//! Topic name canonicalization.
//!
//! Pulsar topics are identified by `{domain}://{tenant}/{namespace}/{name}`.
//! Callers may pass the short forms `name` and `tenant/namespace/name`; both are
//! expanded here so that every form of a topic maps to the same cache key.

use std::fmt;

const DEFAULT_TENANT: &str = "public";
const DEFAULT_NAMESPACE: &str = "default";

/// Persistence domain of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicDomain {
    Persistent,
    NonPersistent,
}

impl TopicDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicDomain::Persistent => "persistent",
            TopicDomain::NonPersistent => "non-persistent",
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "persistent" => Some(TopicDomain::Persistent),
            "non-persistent" => Some(TopicDomain::NonPersistent),
            _ => None,
        }
    }
}

/// A fully qualified topic name, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName {
    pub domain: TopicDomain,
    pub tenant: String,
    pub namespace: String,
    pub local_name: String,
}

impl TopicName {
    /// Parses any of the three accepted shapes.
    ///
    /// Returns `None` for inputs that match none of them, e.g. a wrong number
    /// of segments or an unknown domain.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some((scheme, rest)) = raw.split_once("://") {
            if let Some(domain) = TopicDomain::from_scheme(scheme) {
                if let Some([tenant, namespace, local_name]) = split_segments(rest) {
                    return Some(Self::new(domain, tenant, namespace, local_name));
                }
            }
        }

        if let Some([tenant, namespace, local_name]) = split_segments(raw) {
            return Some(Self::new(TopicDomain::Persistent, tenant, namespace, local_name));
        }

        if !raw.is_empty() && !raw.contains('/') {
            return Some(Self::new(
                TopicDomain::Persistent,
                DEFAULT_TENANT,
                DEFAULT_NAMESPACE,
                raw,
            ));
        }

        None
    }

    fn new(domain: TopicDomain, tenant: &str, namespace: &str, local_name: &str) -> Self {
        Self {
            domain,
            tenant: tenant.to_string(),
            namespace: namespace.to_string(),
            local_name: local_name.to_string(),
        }
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            self.domain.as_str(),
            self.tenant,
            self.namespace,
            self.local_name
        )
    }
}

/// Splits `a/b/c` into exactly three non-empty segments.
fn split_segments(s: &str) -> Option<[&str; 3]> {
    let mut parts = s.split('/');
    let segments = [parts.next()?, parts.next()?, parts.next()?];
    if parts.next().is_some() || segments.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Canonicalizes a topic to `{persistent|non-persistent}://tenant/namespace/name`.
///
/// `foo` becomes `persistent://public/default/foo` and `tenant/ns/foo` becomes
/// `persistent://tenant/ns/foo`. Fully qualified names and anything that is not
/// recognized are returned unchanged, so this never fails.
pub fn canonicalize(raw: &str) -> String {
    match TopicName::parse(raw) {
        Some(name) => name.to_string(),
        None => raw.to_string(),
    }
}
