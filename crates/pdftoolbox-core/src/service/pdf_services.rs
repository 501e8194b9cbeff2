use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::client::{ExtractionService, ServiceError, ServiceResult};
use super::config::ServiceConfig;
use super::credentials::Credentials;
use super::profile::ExtractionProfile;
use crate::document::SourceDocument;

/// Refresh the access token this long before the service says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

const fn default_expiry() -> u64 {
    3600
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetResponse {
    upload_uri: String,
    #[serde(rename = "assetID")]
    asset_id: String,
}

#[derive(Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    resource: Option<JobResource>,
    #[serde(default)]
    error: Option<JobError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    download_uri: String,
}

#[derive(Deserialize)]
struct JobError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// HTTP client for the PDF Services extract operation.
///
/// Each submission uploads the PDF as an asset, starts an extract job,
/// polls it to completion and downloads the resulting archive.
pub struct PdfServicesClient {
    http: Client,
    endpoint: Url,
    credentials: Credentials,
    config: ServiceConfig,
    token: Mutex<Option<AccessToken>>,
}

impl PdfServicesClient {
    pub fn new(config: ServiceConfig, credentials: Credentials) -> ServiceResult<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| ServiceError::Endpoint(e.to_string()))?;

        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .user_agent(concat!("pdftoolbox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            credentials,
            config,
            token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header("x-api-key", &self.credentials.client_id)
    }

    async fn access_token(&self) -> ServiceResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(ref token) = *cached {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting access token");
        let response = self
            .http
            .post(self.url("token"))
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(response).await?.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn upload(&self, token: &str, pdf: Vec<u8>) -> ServiceResult<String> {
        let response = self
            .authorized(self.http.post(self.url("assets")), token)
            .json(&json!({ "mediaType": "application/pdf" }))
            .send()
            .await?;
        let asset: AssetResponse = check_status(response).await?.json().await?;

        let response = self
            .http
            .put(&asset.upload_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(pdf)
            .send()
            .await?;
        check_status(response).await?;

        debug!("Uploaded asset {}", asset.asset_id);
        Ok(asset.asset_id)
    }

    async fn start_job(
        &self,
        token: &str,
        asset_id: &str,
        profile: &ExtractionProfile,
    ) -> ServiceResult<String> {
        let response = self
            .authorized(self.http.post(self.url("operation/extractpdf")), token)
            .json(&profile.job_options(asset_id))
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| ServiceError::Api {
                status: response.status().as_u16(),
                message: "extract job response has no Location header".into(),
            })
    }

    async fn wait_for_job(&self, token: &str, job_url: &str) -> ServiceResult<String> {
        let deadline = Instant::now() + self.config.job_timeout();

        loop {
            let response = self
                .authorized(self.http.get(job_url), token)
                .send()
                .await?;
            let job: JobStatus = check_status(response).await?.json().await?;

            match job.status.as_str() {
                "done" => {
                    return job.resource.map(|r| r.download_uri).ok_or_else(|| {
                        ServiceError::Api {
                            status: 200,
                            message: "finished job has no downloadUri".into(),
                        }
                    });
                }
                "failed" => return Err(job_failure(job.error)),
                other => debug!("Job {} is {}", job_url, other),
            }

            if Instant::now() >= deadline {
                return Err(ServiceError::Timeout(self.config.job_timeout()));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn extract(
        &self,
        token: &str,
        pdf: Vec<u8>,
        profile: &ExtractionProfile,
    ) -> ServiceResult<Vec<u8>> {
        let asset_id = self.upload(token, pdf).await?;
        let job_url = self.start_job(token, &asset_id, profile).await?;
        let download_uri = self.wait_for_job(token, &job_url).await?;

        self.download(&download_uri).await
    }

    async fn download(&self, uri: &str) -> ServiceResult<Vec<u8>> {
        let response = self.http.get(uri).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl ExtractionService for PdfServicesClient {
    async fn submit(
        &self,
        document: &SourceDocument,
        profile: &ExtractionProfile,
    ) -> ServiceResult<Vec<u8>> {
        let pdf = tokio::fs::read(&document.path).await?;
        let token = self.access_token().await?;

        let result = self.extract(&token, pdf, profile).await;
        if let Err(ServiceError::Auth(ref message)) = result {
            debug!("Dropping cached access token: {}", message);
            *self.token.lock().await = None;
        }
        result
    }
}

async fn check_status(response: Response) -> ServiceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::from_status(status.as_u16(), body))
}

fn job_failure(error: Option<JobError>) -> ServiceError {
    let Some(error) = error else {
        return ServiceError::Api {
            status: 500,
            message: "extract job failed without details".into(),
        };
    };

    let code = error.code.to_ascii_uppercase();
    let message = if error.code.is_empty() {
        error.message
    } else {
        format!("{}: {}", error.code, error.message)
    };

    if code.contains("QUOTA") || code.contains("LIMIT") {
        ServiceError::Quota(message)
    } else {
        ServiceError::from_status(error.status.unwrap_or(500), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ExtractionClient, RetryPolicy};
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Mock {
        base: String,
        token_calls: Arc<AtomicUsize>,
        polls: Arc<AtomicUsize>,
        uploaded: Arc<std::sync::Mutex<Vec<u8>>>,
        job_options: Arc<std::sync::Mutex<Option<Value>>>,
        token_status: Option<StatusCode>,
        assets_status: Option<StatusCode>,
        asset_calls: Arc<AtomicUsize>,
        revoke_first_token: bool,
        job_error: Option<Value>,
    }

    async fn token(State(mock): State<Mock>) -> AxumResponse {
        mock.token_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = mock.token_status {
            return (status, "invalid_client").into_response();
        }
        Json(json!({"access_token": "tok-1", "token_type": "bearer", "expires_in": 86399}))
            .into_response()
    }

    async fn assets(State(mock): State<Mock>, headers: HeaderMap) -> AxumResponse {
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer tok-1");
        assert_eq!(headers.get("x-api-key").unwrap(), "client-1");
        if let Some(status) = mock.assets_status {
            return (status, "usage limit reached").into_response();
        }
        if mock.revoke_first_token && mock.asset_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return (StatusCode::UNAUTHORIZED, "token revoked").into_response();
        }
        Json(json!({"uploadUri": format!("{}/upload", mock.base), "assetID": "asset-1"}))
            .into_response()
    }

    async fn upload(State(mock): State<Mock>, body: Bytes) -> StatusCode {
        *mock.uploaded.lock().unwrap() = body.to_vec();
        StatusCode::OK
    }

    async fn extract(State(mock): State<Mock>, Json(options): Json<Value>) -> AxumResponse {
        *mock.job_options.lock().unwrap() = Some(options);
        (
            StatusCode::CREATED,
            [(header::LOCATION, format!("{}/jobs/1", mock.base))],
        )
            .into_response()
    }

    async fn job(State(mock): State<Mock>) -> Json<Value> {
        let n = mock.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = mock.job_error {
            return Json(json!({"status": "failed", "error": error}));
        }
        if n == 0 {
            Json(json!({"status": "in progress"}))
        } else {
            Json(json!({
                "status": "done",
                "resource": {"downloadUri": format!("{}/download", mock.base)}
            }))
        }
    }

    async fn download() -> &'static [u8] {
        b"PK\x03\x04archive"
    }

    async fn start(mut mock: Mock) -> (Mock, PdfServicesClient) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        mock.base = format!("http://{}", listener.local_addr().unwrap());

        let app = Router::new()
            .route("/token", post(token))
            .route("/assets", post(assets))
            .route("/upload", put(upload))
            .route("/operation/extractpdf", post(extract))
            .route("/jobs/1", get(job))
            .route("/download", get(download))
            .with_state(mock.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = ServiceConfig {
            endpoint: mock.base.clone(),
            poll_interval_ms: 10,
            job_timeout_secs: 5,
            ..Default::default()
        };
        let client = PdfServicesClient::new(config, Credentials::new("client-1", "secret-1")).unwrap();
        (mock, client)
    }

    fn pdf_document(dir: &std::path::Path) -> SourceDocument {
        let path = dir.join("report.pdf");
        std::fs::write(&path, b"%PDF-1.7 body").unwrap();
        SourceDocument::from_path(path).unwrap()
    }

    #[tokio::test]
    async fn test_full_extract_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = start(Mock::default()).await;
        let doc = pdf_document(dir.path());

        let archive = client
            .submit(&doc, &ExtractionProfile::detailed())
            .await
            .unwrap();

        assert_eq!(archive, b"PK\x03\x04archive");
        assert_eq!(*mock.uploaded.lock().unwrap(), b"%PDF-1.7 body");
        assert_eq!(mock.polls.load(Ordering::SeqCst), 2);

        let options = mock.job_options.lock().unwrap().clone().unwrap();
        assert_eq!(options["assetID"], "asset-1");
        assert_eq!(options["includeStyling"], true);
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = start(Mock::default()).await;
        let doc = pdf_document(dir.path());
        let profile = ExtractionProfile::standard();

        client.submit(&doc, &profile).await.unwrap();
        mock.polls.store(0, Ordering::SeqCst);
        client.submit(&doc, &profile).await.unwrap();

        assert_eq!(mock.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_refreshes_token() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = start(Mock {
            revoke_first_token: true,
            ..Default::default()
        })
        .await;
        let doc = pdf_document(dir.path());
        let profile = ExtractionProfile::standard();

        let err = client.submit(&doc, &profile).await.unwrap_err();
        assert!(matches!(err, ServiceError::Auth(_)));

        let archive = client.submit(&doc, &profile).await.unwrap();

        assert_eq!(archive, b"PK\x03\x04archive");
        assert_eq!(mock.token_calls.load(Ordering::SeqCst), 2);
        assert_eq!(mock.asset_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_recovers_within_retry() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, client) = start(Mock {
            revoke_first_token: true,
            ..Default::default()
        })
        .await;
        let client = ExtractionClient::new(
            std::sync::Arc::new(client),
            ExtractionProfile::standard(),
            RetryPolicy::immediate(2),
            dir.path().join("zips"),
        );

        let saved = client.submit(&pdf_document(dir.path())).await.unwrap();

        assert_eq!(saved.attempts, 2);
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"PK\x03\x04archive");
        assert_eq!(mock.token_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let (_mock, client) = start(Mock {
            token_status: Some(StatusCode::UNAUTHORIZED),
            ..Default::default()
        })
        .await;

        let err = client
            .submit(&pdf_document(dir.path()), &ExtractionProfile::standard())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Auth(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let (_mock, client) = start(Mock {
            assets_status: Some(StatusCode::TOO_MANY_REQUESTS),
            ..Default::default()
        })
        .await;

        let err = client
            .submit(&pdf_document(dir.path()), &ExtractionProfile::standard())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Quota(_)));
    }

    #[tokio::test]
    async fn test_failed_job() {
        let dir = tempfile::tempdir().unwrap();
        let (_mock, client) = start(Mock {
            job_error: Some(json!({"code": "BAD_PDF", "message": "Unable to extract", "status": 400})),
            ..Default::default()
        })
        .await;

        let err = client
            .submit(&pdf_document(dir.path()), &ExtractionProfile::standard())
            .await
            .unwrap_err();

        match err {
            ServiceError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("BAD_PDF"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_mock, client) = start(Mock::default()).await;
        let doc = SourceDocument::from_path(dir.path().join("gone.pdf")).unwrap();

        let err = client
            .submit(&doc, &ExtractionProfile::standard())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Source(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_job_failure_quota_code() {
        let err = job_failure(Some(JobError {
            code: "QUOTA_EXCEEDED".into(),
            message: "monthly".into(),
            status: Some(400),
        }));
        assert!(matches!(err, ServiceError::Quota(_)));
    }
}
