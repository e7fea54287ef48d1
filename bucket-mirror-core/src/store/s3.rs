//! S3-compatible bucket binding (AWS S3, Cloudflare R2, MinIO).

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::config::RemoteConfig;
use crate::contract::{collect_pages, ListPage, ObjectStore, PageSource, WriteOptions};
use crate::error::{ListingError, Side, StoreError};
use crate::ignore::IgnoreRules;
use crate::key::{Key, KeySet, ObjectMeta};
use crate::retry::RetryPolicy;

const TRANSIENT_CODES: &[&str] = &[
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "RequestTimeout",
    "InternalError",
    "ServiceUnavailable",
];

pub struct S3Store {
    client: Client,
    bucket: String,
    ignore: IgnoreRules,
    retry: RetryPolicy,
}

impl S3Store {
    /// Build a client from explicit credentials; nothing is read from the environment.
    pub fn connect(config: &RemoteConfig, ignore: IgnoreRules, retry: RetryPolicy) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "bucket-mirror",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.resolved_region()))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = config.resolved_endpoint() {
            builder = builder.endpoint_url(endpoint);
        }
        info!(
            bucket = %config.bucket,
            endpoint = ?config.resolved_endpoint(),
            region = %config.resolved_region(),
            "Initialised S3 client"
        );
        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            ignore,
            retry,
        }
    }
}

fn classify<E>(operation: &str, key: &str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_owned);
    let message = format!("{operation} {key}: {}", DisplayErrorContext(&err));

    if status == Some(404) || matches!(code.as_deref(), Some("NoSuchKey" | "NotFound")) {
        return StoreError::NotFound(key.to_string());
    }
    let transient = matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    ) || matches!(status, Some(429) | Some(500..=599))
        || code.as_deref().is_some_and(|c| TRANSIENT_CODES.contains(&c));
    if transient {
        StoreError::Transient(message)
    } else {
        StoreError::Permanent(message)
    }
}

#[async_trait]
impl PageSource for S3Store {
    async fn fetch_page(&self, cursor: Option<String>) -> Result<ListPage, StoreError> {
        let mut req = self.client.list_objects_v2().bucket(&self.bucket);
        if let Some(token) = cursor {
            req = req.continuation_token(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| classify("list", &self.bucket, e))?;

        page_from_output(resp)
    }
}

fn page_from_output(resp: ListObjectsV2Output) -> Result<ListPage, StoreError> {
    let entries = resp
        .contents
        .unwrap_or_default()
        .into_iter()
        .filter_map(|obj| {
            let size = obj.size.and_then(|s| u64::try_from(s).ok());
            obj.key.map(|k| {
                (
                    k,
                    ObjectMeta {
                        size,
                        content_type: None,
                    },
                )
            })
        })
        .collect();
    let next = if resp.is_truncated.unwrap_or(false) {
        match resp.next_continuation_token {
            Some(token) => Some(token),
            None => {
                return Err(StoreError::Permanent(
                    "truncated listing without a continuation token".into(),
                ))
            }
        }
    } else {
        None
    };
    Ok(ListPage { entries, next })
}

#[async_trait]
impl ObjectStore for S3Store {
    fn side(&self) -> Side {
        Side::Remote
    }

    async fn list(&self) -> Result<KeySet, ListingError> {
        collect_pages(self, Side::Remote, &self.ignore, &self.retry).await
    }

    async fn read(&self, key: &Key) -> Result<Vec<u8>, StoreError> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| classify("get", key.as_str(), e))?;
        let bytes = out
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Transient(format!("reading body of {key}: {e}")))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn write(
        &self,
        key: &Key,
        bytes: Vec<u8>,
        options: &WriteOptions,
    ) -> Result<(), StoreError> {
        let size = bytes.len();
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(ByteStream::from(bytes));
        if let Some(content_type) = &options.content_type {
            req = req.content_type(content_type);
        }
        if let Some(cache_control) = &options.cache_control {
            req = req.cache_control(cache_control);
        }
        req.send()
            .await
            .map_err(|e| classify("put", key.as_str(), e))?;
        debug!(key = %key, size, "Uploaded object");
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| classify("delete", key.as_str(), e))?;
        debug!(key = %key, "Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_sdk_s3::types::Object;
    use aws_smithy_runtime_api::client::result::ConnectorError;
    use aws_smithy_runtime_api::http::StatusCode;
    use aws_smithy_types::body::SdkBody;

    fn response(status: u16) -> HttpResponse {
        HttpResponse::new(StatusCode::try_from(status).unwrap(), SdkBody::empty())
    }

    fn service(status: u16, code: Option<&str>) -> SdkError<GetObjectError, HttpResponse> {
        let mut meta = ErrorMetadata::builder().message("scripted");
        if let Some(code) = code {
            meta = meta.code(code);
        }
        SdkError::service_error(GetObjectError::generic(meta.build()), response(status))
    }

    fn classified(err: SdkError<GetObjectError, HttpResponse>) -> StoreError {
        classify("get", "A/1.mp3", err)
    }

    #[test]
    fn missing_objects_are_not_found() {
        assert!(matches!(classified(service(404, None)), StoreError::NotFound(k) if k == "A/1.mp3"));
        assert!(matches!(
            classified(service(400, Some("NoSuchKey"))),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        assert!(matches!(classified(service(429, None)), StoreError::Transient(_)));
        assert!(matches!(classified(service(503, None)), StoreError::Transient(_)));
        assert!(matches!(classified(service(500, Some("InternalError"))), StoreError::Transient(_)));
        for code in ["SlowDown", "Throttling", "RequestTimeout"] {
            assert!(
                matches!(classified(service(400, Some(code))), StoreError::Transient(_)),
                "{code} should be transient"
            );
        }
    }

    #[test]
    fn network_failures_are_transient() {
        let timeout: SdkError<GetObjectError, HttpResponse> = SdkError::timeout_error("timed out");
        assert!(matches!(classified(timeout), StoreError::Transient(_)));

        let dispatch: SdkError<GetObjectError, HttpResponse> =
            SdkError::dispatch_failure(ConnectorError::io("connection reset".into()));
        assert!(matches!(classified(dispatch), StoreError::Transient(_)));
    }

    #[test]
    fn other_failures_are_permanent() {
        assert!(matches!(
            classified(service(403, Some("AccessDenied"))),
            StoreError::Permanent(_)
        ));
        assert!(matches!(
            classified(service(400, Some("InvalidBucketName"))),
            StoreError::Permanent(_)
        ));
        let construction: SdkError<GetObjectError, HttpResponse> =
            SdkError::construction_failure("bad request");
        assert!(matches!(classified(construction), StoreError::Permanent(_)));
    }

    #[test]
    fn listing_page_carries_keys_sizes_and_cursor() {
        let output = ListObjectsV2Output::builder()
            .contents(Object::builder().key("A/1.mp3").size(3).build())
            .contents(Object::builder().size(1).build())
            .is_truncated(true)
            .next_continuation_token("c1")
            .build();

        let page = page_from_output(output).unwrap();
        assert_eq!(page.next.as_deref(), Some("c1"));
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].0, "A/1.mp3");
        assert_eq!(page.entries[0].1.size, Some(3));
    }

    #[test]
    fn truncated_page_without_cursor_is_an_error() {
        let output = ListObjectsV2Output::builder().is_truncated(true).build();
        assert!(matches!(page_from_output(output), Err(StoreError::Permanent(_))));

        let last = ListObjectsV2Output::builder().is_truncated(false).build();
        assert_eq!(page_from_output(last).unwrap().next, None);
    }
}
