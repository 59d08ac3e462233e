//! Mapping service errors onto "resource absent" and provider errors

use carina_core::provider::ProviderError;
use carina_core::resource::ResourceId;

use crate::client::SdkError;
use crate::utils::path_str;
use crate::wait::WaitError;

/// Turn a 404 into `Ok(None)`
pub fn check_deleted<T>(result: Result<T, SdkError>) -> Result<Option<T>, SdkError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Treat an error with `status` whose body carries one of `codes` at
/// `code_path` as a 404
pub fn convert_expected_into_404(
    err: SdkError,
    status: u16,
    code_path: &str,
    codes: &[&str],
) -> SdkError {
    if err.status() != Some(status) {
        return err;
    }
    let matched = err
        .body_json()
        .and_then(|body| path_str(code_path, &body))
        .is_some_and(|code| codes.contains(&code.as_str()));
    if matched { err.into_not_found() } else { err }
}

/// Services that answer 400 for a missing resource
pub fn convert_expected_400_into_404(err: SdkError, code_path: &str, codes: &[&str]) -> SdkError {
    convert_expected_into_404(err, 400, code_path, codes)
}

/// Provider error with context and cause
pub fn provider_error(
    id: &ResourceId,
    context: impl Into<String>,
    cause: impl std::error::Error + Send + Sync + 'static,
) -> ProviderError {
    ProviderError::new(context)
        .for_resource(id.clone())
        .with_cause(cause)
}

impl From<SdkError> for ProviderError {
    fn from(e: SdkError) -> Self {
        ProviderError::new("HuaweiCloud API request failed").with_cause(e)
    }
}

impl From<WaitError> for ProviderError {
    fn from(e: WaitError) -> Self {
        ProviderError::new("error waiting for resource").with_cause(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(status: u16, code: &str) -> SdkError {
        SdkError::http(
            status,
            "GET",
            "u",
            format!(r#"{{"error_code":"{}","error_msg":"m"}}"#, code),
        )
    }

    #[test]
    fn check_deleted_maps_404() {
        assert_eq!(check_deleted(Ok::<_, SdkError>(1)).unwrap(), Some(1));
        assert_eq!(check_deleted::<()>(Err(err(404, "x"))).unwrap(), None);
        assert!(check_deleted::<()>(Err(err(500, "x"))).is_err());
    }

    #[test]
    fn expected_400_becomes_404() {
        let converted =
            convert_expected_400_into_404(err(400, "PCA.10010002"), "error_code", &["PCA.10010002"]);
        assert!(converted.is_not_found());

        let kept = convert_expected_400_into_404(err(400, "PCA.1"), "error_code", &["PCA.10010002"]);
        assert_eq!(kept.status(), Some(400));

        let other_status =
            convert_expected_400_into_404(err(403, "PCA.10010002"), "error_code", &["PCA.10010002"]);
        assert_eq!(other_status.status(), Some(403));
    }

    #[test]
    fn provider_error_carries_resource() {
        let e = provider_error(
            &ResourceId::new("ddm_instance", "db"),
            "error creating DDM instance",
            err(500, "x"),
        );
        assert!(e.to_string().starts_with("[ddm_instance.db] error creating DDM instance"));
    }
}
