//! gRPC service implementation.

use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Code, Request, Response, Status};
use tracing::{debug, error, info};

use shortlink_server::handlers::shorten::{BatchItem, ShortenError};
use shortlink_server::{Shortener, UserTokenSigner};
use shortlink_storage::UrlStore;

use crate::errors::{classify, ErrorKind};
use crate::proto::shortlink::v1::{
    shortener_server::Shortener as ShortenerRpc, BatchResult, DeleteUrlsRequest,
    DeleteUrlsResponse, ExpandRequest, ExpandResponse, ListUserUrlsRequest, ListUserUrlsResponse,
    PingRequest, PingResponse, ShortenBatchRequest, ShortenBatchResponse, ShortenRequest,
    ShortenResponse, UserUrl,
};

/// Metadata key carrying the signed user token, in both directions.
pub const USER_TOKEN_METADATA: &str = "user-token";

/// Metadata key carrying the existing short URL on `ALREADY_EXISTS`.
pub const SHORT_URL_METADATA: &str = "short-url";

/// gRPC front end over the same [`Shortener`] the HTTP API uses.
pub struct ShortenerGrpcService<S: UrlStore> {
    shortener: Shortener<S>,
    signer: UserTokenSigner,
}

impl<S: UrlStore> ShortenerGrpcService<S> {
    pub fn new(shortener: Shortener<S>, signer: UserTokenSigner) -> Self {
        Self { shortener, signer }
    }

    fn verified_user(&self, metadata: &MetadataMap) -> Option<String> {
        let token = metadata.get(USER_TOKEN_METADATA)?.to_str().ok()?;
        match self.signer.verify(token.trim()) {
            Ok(user_id) => Some(user_id),
            Err(e) => {
                debug!(error = %e, "ignoring invalid user token");
                None
            }
        }
    }

    /// The caller, or a newly issued user together with its token.
    fn identify(&self, metadata: &MetadataMap) -> (String, Option<String>) {
        match self.verified_user(metadata) {
            Some(user_id) => (user_id, None),
            None => {
                let (user_id, token) = self.signer.issue();
                (user_id, Some(token))
            }
        }
    }

    fn require_user(&self, metadata: &MetadataMap) -> Result<String, Status> {
        self.verified_user(metadata)
            .ok_or_else(|| Status::unauthenticated("a valid user-token is required"))
    }

    fn error_to_status(&self, err: ShortenError) -> Status {
        match classify(&err) {
            ErrorKind::InvalidInput(message) => Status::invalid_argument(message),
            ErrorKind::Conflict { short_id } => {
                let short_url = self.shortener.short_url(&short_id);
                let mut metadata = MetadataMap::new();
                if let Ok(value) = short_url.parse() {
                    metadata.insert(SHORT_URL_METADATA, value);
                }
                Status::with_metadata(
                    Code::AlreadyExists,
                    format!("URL is already shortened as {short_url}"),
                    metadata,
                )
            }
            ErrorKind::NotFound(message) => Status::not_found(message),
            ErrorKind::Gone(message) => Status::failed_precondition(message),
            ErrorKind::Unavailable(message) => Status::unavailable(message),
            ErrorKind::Timeout(message) => Status::deadline_exceeded(message),
            ErrorKind::Internal(message) => Status::internal(message),
        }
    }
}

/// Wraps `message` in a response, attaching `issued_token` if one was issued.
fn with_token<T>(message: T, issued_token: Option<String>) -> Result<Response<T>, Status> {
    let mut response = Response::new(message);
    if let Some(token) = issued_token {
        let value = MetadataValue::try_from(token).map_err(|e| {
            error!(error = %e, "issued user token is not valid metadata");
            Status::internal("failed to issue user token")
        })?;
        response.metadata_mut().insert(USER_TOKEN_METADATA, value);
    }
    Ok(response)
}

#[tonic::async_trait]
impl<S: UrlStore> ShortenerRpc for ShortenerGrpcService<S> {
    async fn shorten(
        &self,
        request: Request<ShortenRequest>,
    ) -> Result<Response<ShortenResponse>, Status> {
        let (user_id, issued_token) = self.identify(request.metadata());
        let req = request.into_inner();

        let short_id = self
            .shortener
            .shorten(&req.url, &user_id)
            .await
            .map_err(|e| self.error_to_status(e))?;

        let response = ShortenResponse {
            short_url: self.shortener.short_url(&short_id),
            short_id,
        };
        with_token(response, issued_token)
    }

    async fn shorten_batch(
        &self,
        request: Request<ShortenBatchRequest>,
    ) -> Result<Response<ShortenBatchResponse>, Status> {
        let (user_id, issued_token) = self.identify(request.metadata());
        let items = request
            .into_inner()
            .entries
            .into_iter()
            .map(|entry| BatchItem {
                correlation_id: entry.correlation_id,
                original_url: entry.original_url,
            })
            .collect();

        let shortened = self
            .shortener
            .shorten_batch(items, &user_id)
            .await
            .map_err(|e| self.error_to_status(e))?;

        let results = shortened
            .into_iter()
            .map(|s| BatchResult {
                short_url: self.shortener.short_url(&s.short_id),
                correlation_id: s.correlation_id,
            })
            .collect();
        with_token(ShortenBatchResponse { results }, issued_token)
    }

    async fn expand(
        &self,
        request: Request<ExpandRequest>,
    ) -> Result<Response<ExpandResponse>, Status> {
        let req = request.into_inner();
        let original_url = self
            .shortener
            .expand(&req.short_id)
            .await
            .map_err(|e| self.error_to_status(e))?;
        Ok(Response::new(ExpandResponse { original_url }))
    }

    async fn list_user_urls(
        &self,
        request: Request<ListUserUrlsRequest>,
    ) -> Result<Response<ListUserUrlsResponse>, Status> {
        let user_id = self.require_user(request.metadata())?;

        let urls = self
            .shortener
            .user_urls(&user_id)
            .await
            .map_err(|e| self.error_to_status(e))?
            .into_iter()
            .map(|record| UserUrl {
                short_url: self.shortener.short_url(&record.short_id),
                original_url: record.original_url,
            })
            .collect();
        Ok(Response::new(ListUserUrlsResponse { urls }))
    }

    async fn delete_urls(
        &self,
        request: Request<DeleteUrlsRequest>,
    ) -> Result<Response<DeleteUrlsResponse>, Status> {
        let user_id = self.require_user(request.metadata())?;
        let short_ids = request.into_inner().short_ids;
        let count = short_ids.len();

        self.shortener
            .delete_urls(&user_id, short_ids)
            .map_err(|e| self.error_to_status(e))?;
        info!(user_id = %user_id, count, "deletion accepted");

        Ok(Response::new(DeleteUrlsResponse { accepted: true }))
    }

    async fn ping(&self, _request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        let response = match self.shortener.ping().await {
            Ok(status) => PingResponse {
                healthy: true,
                latency_micros: u64::try_from(status.latency.as_micros()).unwrap_or(u64::MAX),
            },
            Err(e) => {
                error!(error = %e, "storage ping failed");
                PingResponse {
                    healthy: false,
                    latency_micros: 0,
                }
            }
        };
        Ok(Response::new(response))
    }
}
