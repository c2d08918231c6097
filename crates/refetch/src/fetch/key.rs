use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::transport::PreparedRequest;

/// The deterministic identity of a logical request.
///
/// Two requests that should be treated as the same logical operation produce
/// the same key: the key is a SHA-256 hash over stable, human-readable
/// metadata derived from the method, the normalized URL, a digest of the body
/// (when present), and a caller-chosen subset of headers. Callers may also
/// supply an explicit override key via [`RequestKey::custom`].
#[derive(Debug, Clone, Eq)]
pub struct RequestKey {
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.hash {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for RequestKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl RequestKey {
    /// Derives the key for a request, folding in the given header subset.
    ///
    /// Only the named headers contribute to the identity; volatile headers
    /// (tracing ids, dates) should not be listed. The subset is sorted and
    /// deduplicated first, so the order call sites name it in does not
    /// change the key.
    pub fn from_request(request: &PreparedRequest, relevant_headers: &[&str]) -> Self {
        let mut builder = RequestKeyBuilder::new();
        builder.write_request_meta(request).unwrap();

        let mut names = relevant_headers.to_vec();
        names.sort_unstable();
        names.dedup();
        for name in names {
            if let Some(value) = request.headers().get(name) {
                builder.write_header(name, value).unwrap();
            }
        }
        builder.build()
    }

    /// An explicit override key, hashed from the given stable string.
    pub fn custom(key: impl AsRef<str>) -> Self {
        let mut builder = RequestKeyBuilder::new();
        builder.write_str(key.as_ref()).unwrap();
        builder.build()
    }

    /// The human-readable metadata that forms the basis of this key.
    pub fn metadata(&self) -> &str {
        &self.metadata
    }
}

/// A builder for [`RequestKey`]s.
///
/// This builder implements the [`Write`](std::fmt::Write) trait, and the
/// intention of it is to accept human readable, but most importantly
/// **stable**, input. This input is then hashed to form the [`RequestKey`].
pub struct RequestKeyBuilder {
    metadata: String,
}

impl RequestKeyBuilder {
    pub fn new() -> Self {
        Self {
            metadata: String::new(),
        }
    }

    /// Writes the method, normalized URL, and body digest into the key.
    ///
    /// URL parsing already lowercases the scheme and host and drops default
    /// ports; the fragment never reaches the server and is dropped here.
    pub fn write_request_meta(&mut self, request: &PreparedRequest) -> Result<(), fmt::Error> {
        let mut url = request.url().clone();
        url.set_fragment(None);

        self.metadata
            .write_fmt(format_args!("method: {}\nurl: {}\n", request.method(), url))?;

        if let Some(body) = request.body() {
            let digest = Sha256::digest(body);
            self.metadata.write_str("body: ")?;
            for b in digest {
                self.metadata.write_fmt(format_args!("{b:02x}"))?;
            }
            self.metadata.write_char('\n')?;
        }

        Ok(())
    }

    /// Writes one identity-relevant header into the key.
    pub fn write_header(&mut self, name: &str, value: &str) -> Result<(), fmt::Error> {
        self.metadata
            .write_fmt(format_args!("header: {name}: {value}\n"))
    }

    /// Finalize the [`RequestKey`].
    pub fn build(self) -> RequestKey {
        let hash: [u8; 32] = Sha256::digest(&self.metadata).into();

        RequestKey {
            metadata: self.metadata.into(),
            hash,
        }
    }
}

impl Default for RequestKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for RequestKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.metadata.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use crate::transport::Method;

    use super::*;

    fn request(url: &str) -> PreparedRequest {
        PreparedRequest::new(Method::Get, Url::parse(url).unwrap())
    }

    #[test]
    fn test_same_request_same_key() {
        let a = RequestKey::from_request(&request("https://example.com/item"), &[]);
        let b = RequestKey::from_request(&request("https://example.com/item"), &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_url_normalization() {
        // Default port and fragments do not change the identity, casing of
        // the host does not either.
        let a = RequestKey::from_request(&request("https://example.com/item"), &[]);
        let b = RequestKey::from_request(&request("HTTPS://EXAMPLE.com:443/item#frag"), &[]);
        assert_eq!(a, b);

        let c = RequestKey::from_request(&request("https://example.com/item?x=1"), &[]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_method_and_body_contribute() {
        let url = Url::parse("https://example.com/item").unwrap();

        let get = RequestKey::from_request(&PreparedRequest::get(url.clone()), &[]);
        let post = RequestKey::from_request(&PreparedRequest::post(url.clone(), "x"), &[]);
        let post2 = RequestKey::from_request(&PreparedRequest::post(url, "y"), &[]);

        assert_ne!(get, post);
        assert_ne!(post, post2);
    }

    #[test]
    fn test_relevant_header_subset() {
        let req = request("https://example.com/item")
            .with_header("accept", "image/png")
            .with_header("x-trace-id", "volatile");

        let a = RequestKey::from_request(&req, &["accept"]);
        let b = RequestKey::from_request(
            &request("https://example.com/item").with_header("accept", "image/png"),
            &["accept"],
        );
        // The volatile header is not part of the subset and changes nothing.
        assert_eq!(a, b);

        let c = RequestKey::from_request(&req, &[]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_header_subset_order_is_irrelevant() {
        let req = request("https://example.com/item")
            .with_header("accept", "image/png")
            .with_header("authorization", "Bearer token");

        // The same logical subset must yield the same key no matter how a
        // call site orders it, duplicates included.
        let a = RequestKey::from_request(&req, &["accept", "authorization"]);
        let b = RequestKey::from_request(&req, &["authorization", "accept"]);
        let c = RequestKey::from_request(&req, &["accept", "authorization", "accept"]);

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_custom_key() {
        let a = RequestKey::custom("user-avatar-42");
        let b = RequestKey::custom("user-avatar-42");
        let c = RequestKey::custom("user-avatar-43");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.metadata(), "user-avatar-42");
    }
}
