//! AK/SK request signing (SDK-HMAC-SHA256)

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use super::error::SdkError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_SDK_DATE: &str = "X-Sdk-Date";
const SDK_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Signs requests with an access key / secret key pair
#[derive(Clone)]
pub struct Signer {
    access_key: String,
    secret_key: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

impl Signer {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn sdk_date(now: DateTime<Utc>) -> String {
        now.format(SDK_DATE_FORMAT).to_string()
    }

    /// Compute the `Authorization` header value.
    ///
    /// `headers` must already contain `X-Sdk-Date` and `Host`; every header
    /// in it is signed.
    pub fn authorization(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<String, SdkError> {
        let sdk_date = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(HEADER_SDK_DATE))
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| SdkError::Config(format!("missing {} header", HEADER_SDK_DATE)))?;

        let (canonical, signed_headers) = canonical_request(method, url, headers, body);
        let string_to_sign = format!(
            "{}\n{}\n{}",
            SIGN_ALGORITHM,
            sdk_date,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| SdkError::Config(format!("invalid secret key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!(
            "{} Access={}, SignedHeaders={}, Signature={}",
            SIGN_ALGORITHM, self.access_key, signed_headers, signature
        ))
    }
}

/// Build the canonical request and the `;`-joined signed header list
pub fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    body: &[u8],
) -> (String, String) {
    let mut uri: String = url
        .path()
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect::<Vec<_>>()
        .join("/");
    if !uri.ends_with('/') {
        uri.push('/');
    }

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    query.sort();
    let query = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut lowered: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    lowered.sort();
    let canonical_headers: String = lowered
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    let signed_headers = lowered
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        uri,
        query,
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(body))
    );
    (canonical, signed_headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn headers() -> Vec<(String, String)> {
        vec![
            ("Host".to_string(), "ddm.cn-north-4.myhuaweicloud.com".to_string()),
            (HEADER_SDK_DATE.to_string(), "20240102T030405Z".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    #[test]
    fn sdk_date_format() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(Signer::sdk_date(now), "20240102T030405Z");
    }

    #[test]
    fn canonical_request_layout() {
        let url = Url::parse(
            "https://ddm.cn-north-4.myhuaweicloud.com/v1/p1/instances?offset=0&limit=10",
        )
        .unwrap();
        let (canonical, signed) = canonical_request("GET", &url, &headers(), b"");
        assert_eq!(signed, "content-type;host;x-sdk-date");

        let lines: Vec<&str> = canonical.split('\n').collect();
        assert_eq!(lines[0], "GET");
        assert_eq!(lines[1], "/v1/p1/instances/");
        assert_eq!(lines[2], "limit=10&offset=0");
        assert_eq!(lines[3], "content-type:application/json");
        assert_eq!(lines[4], "host:ddm.cn-north-4.myhuaweicloud.com");
        assert_eq!(lines[5], "x-sdk-date:20240102T030405Z");
        assert_eq!(lines[6], "");
        assert_eq!(lines[7], signed);
        // sha256 of the empty body
        assert_eq!(
            lines[8],
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn authorization_header() {
        let signer = Signer::new("AK", "SK");
        let url = Url::parse("https://ddm.cn-north-4.myhuaweicloud.com/v1/p1/instances").unwrap();
        let auth = signer
            .authorization("POST", &url, &headers(), br#"{"a":1}"#)
            .unwrap();

        let (canonical, _) = canonical_request("POST", &url, &headers(), br#"{"a":1}"#);
        let to_sign = format!(
            "SDK-HMAC-SHA256\n20240102T030405Z\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let mut mac = HmacSha256::new_from_slice(b"SK").unwrap();
        mac.update(to_sign.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(
            auth,
            format!(
                "SDK-HMAC-SHA256 Access=AK, SignedHeaders=content-type;host;x-sdk-date, Signature={}",
                expected
            )
        );
    }

    #[test]
    fn missing_date_header_is_an_error() {
        let signer = Signer::new("AK", "SK");
        let url = Url::parse("https://iam.myhuaweicloud.com/v3/projects").unwrap();
        let err = signer.authorization("GET", &url, &[], b"").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn secret_key_is_not_debug_printed() {
        let signer = Signer::new("AK", "super-secret");
        assert!(!format!("{:?}", signer).contains("super-secret"));
    }
}
