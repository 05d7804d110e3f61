//! AWS Signature Version 4
//!
//! Signs a fully serialized request. The body hash covers the exact bytes
//! that will be sent, so signing must happen after serialization.

use std::fmt::Write;

use hmac::{Hmac, Mac};
use http::header::{AUTHORIZATION, HOST, HeaderMap, HeaderValue};
use http::Method;
use jiff::Timestamp;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::LlmError;

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Credentials and scope for one signature
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
    pub region: &'a str,
    pub service: &'a str,
    pub time: Timestamp,
}

/// Sign a request, returning `headers` plus the signing headers
///
/// The returned map carries `authorization`, `x-amz-date` and, for
/// temporary credentials, `x-amz-security-token`. `host` is signed but
/// left for the HTTP client to send.
pub fn sign(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    body: &[u8],
    params: &SigningParams<'_>,
) -> Result<HeaderMap, LlmError> {
    let amz_date = params.time.strftime("%Y%m%dT%H%M%SZ").to_string();
    let date = &amz_date[..8];

    let mut signed = headers.clone();
    signed.insert(HOST, header_value(&host(url)?)?);
    signed.insert("x-amz-date", header_value(&amz_date)?);
    if let Some(token) = params.session_token {
        signed.insert("x-amz-security-token", header_value(token)?);
    }

    let (canonical_headers, signed_headers) = canonical_headers(&signed);
    let request = canonical_request(method, url, &canonical_headers, &signed_headers, body);

    let scope = format!("{date}/{}/{}/aws4_request", params.region, params.service);
    let string_to_sign = format!("{ALGORITHM}\n{amz_date}\n{scope}\n{}", sha256_hex(request.as_bytes()));

    let key = signing_key(params.secret_access_key, date, params.region, params.service)?;
    let signature = hex(&hmac(&key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        params.access_key_id
    );

    signed.remove(HOST);
    signed.insert(AUTHORIZATION, header_value(&authorization)?);

    Ok(signed)
}

/// Build the canonical request string
pub fn canonical_request(
    method: &Method,
    url: &Url,
    canonical_headers: &str,
    signed_headers: &str,
    body: &[u8],
) -> String {
    format!(
        "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{}",
        canonical_uri(url.path()),
        canonical_query(url),
        sha256_hex(body)
    )
}

/// Lower-cased, sorted `name:value` lines and the `;`-joined name list
pub fn canonical_headers(headers: &HeaderMap) -> (String, String) {
    let mut entries: Vec<(&str, String)> = headers
        .keys()
        .map(|name| {
            let value = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
                .collect::<Vec<_>>()
                .join(",");
            (name.as_str(), value)
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let lines = entries.iter().fold(String::new(), |mut out, (name, value)| {
        let _ = writeln!(out, "{name}:{value}");
        out
    });
    let names = entries.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(";");

    (lines, names)
}

/// Each path segment URI-encoded again
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (urlencoding::encode(&k).into_owned(), urlencoding::encode(&v).into_owned()))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn host(url: &Url) -> Result<String, LlmError> {
    let host = url
        .host_str()
        .ok_or_else(|| LlmError::Config(format!("cannot sign request to `{url}`: no host")))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// `kSigning` derived from the secret through date, region and service
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, LlmError> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, LlmError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow::anyhow!("invalid HMAC key: {e}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn header_value(value: &str) -> Result<HeaderValue, LlmError> {
    HeaderValue::from_str(value).map_err(|e| LlmError::Config(format!("invalid signing header value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn params(time: &str) -> SigningParams<'static> {
        SigningParams {
            access_key_id: "AKIDEXAMPLE",
            secret_access_key: SECRET,
            session_token: None,
            region: "us-east-1",
            service: "service",
            time: time.parse().unwrap(),
        }
    }

    #[test]
    fn derives_documented_signing_key() {
        let key = signing_key(SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(hex(&key), "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d");
    }

    #[test]
    fn signs_vanilla_get() {
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let headers = sign(&Method::GET, &url, &HeaderMap::new(), b"", &params("2015-08-30T12:36:00Z")).unwrap();

        assert_eq!(headers["x-amz-date"], "20150830T123600Z");
        assert_eq!(
            headers[AUTHORIZATION],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert!(headers.get(HOST).is_none());
    }

    #[test]
    fn session_token_is_signed() {
        let url = Url::parse("https://bedrock-runtime.us-east-1.amazonaws.com/model/m/invoke").unwrap();
        let mut params = params("2024-01-01T00:00:00Z");
        params.session_token = Some("session");

        let headers = sign(&Method::POST, &url, &HeaderMap::new(), b"{}", &params).unwrap();
        assert_eq!(headers["x-amz-security-token"], "session");

        let authorization = headers[AUTHORIZATION].to_str().unwrap();
        assert!(authorization.contains("SignedHeaders=host;x-amz-date;x-amz-security-token,"));
    }

    #[test]
    fn extra_headers_are_lowercased_sorted_and_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Amz-Bedrock-Accept", HeaderValue::from_static("*/*"));
        headers.insert("Content-Type", HeaderValue::from_static("  application/json "));
        headers.insert(HOST, HeaderValue::from_static("h"));

        let (lines, names) = canonical_headers(&headers);
        assert_eq!(lines, "content-type:application/json\nhost:h\nx-amz-bedrock-accept:*/*\n");
        assert_eq!(names, "content-type;host;x-amz-bedrock-accept");
    }

    #[test]
    fn canonical_request_sorts_query_and_reencodes_path() {
        let url = Url::parse("https://h/model/anthropic.claude-v2%3A1/invoke?b=2&a=x y").unwrap();
        let request = canonical_request(&Method::POST, &url, "host:h\n", "host", b"");

        let lines: Vec<_> = request.lines().collect();
        assert_eq!(lines[0], "POST");
        assert_eq!(lines[1], "/model/anthropic.claude-v2%253A1/invoke");
        assert_eq!(lines[2], "a=x%20y&b=2");
        assert_eq!(lines.last().copied(), Some(sha256_hex(b"").as_str()));
    }

    #[test]
    fn body_hash_depends_on_exact_bytes() {
        let url = Url::parse("https://h/").unwrap();
        let a = sign(&Method::POST, &url, &HeaderMap::new(), b"{\"a\":1}", &params("2024-01-01T00:00:00Z")).unwrap();
        let b = sign(&Method::POST, &url, &HeaderMap::new(), b"{\"a\": 1}", &params("2024-01-01T00:00:00Z")).unwrap();
        assert_ne!(a[AUTHORIZATION], b[AUTHORIZATION]);
    }
}
