//! HTTP server
//!
//! hyper http1 with TokioIo, one task per connection, and a match-based
//! router. All /api routes require a bearer token.

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::ai::OpenAiBackend;
use crate::auth::{extract_token_from_header, JwtValidator};
use crate::cache::{spawn_sweep_task, MongoResponseStore, ResponseCache};
use crate::config::Args;
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    ContainerNodeDoc, LearningNodeDoc, UserDoc, CACHED_RESPONSE_COLLECTION,
    CONTAINER_NODE_COLLECTION, LEARNING_NODE_COLLECTION, PROJECT_REVIEW_COLLECTION,
    TEST_ATTEMPT_COLLECTION, USER_COLLECTION,
};
use crate::routes;
use crate::routes::helpers::{error_response, preflight_response};
use crate::services::{
    MongoAttemptStore, MongoNodeStore, MongoReviewStore, RateLimiter, ReviewService, TestService,
};
use crate::types::UltimaError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub jwt: JwtValidator,
    pub users: MongoCollection<UserDoc>,
    pub containers: MongoCollection<ContainerNodeDoc>,
    pub learning: MongoCollection<LearningNodeDoc>,
    pub cache: ResponseCache,
    pub quota: Arc<RateLimiter>,
    pub test_quota: Arc<RateLimiter>,
    pub tests: TestService,
    pub reviews: ReviewService,
    pub started_at: Instant,
}

impl AppState {
    /// Connect to MongoDB and wire up all services
    pub async fn init(args: Args) -> Result<Self, UltimaError> {
        let jwt = if args.dev_mode && args.jwt_secret.is_none() {
            warn!("Development mode: using built-in JWT secret");
            JwtValidator::new_dev()
        } else {
            JwtValidator::new(args.jwt_secret()?, args.jwt_expiry_seconds)?
        };

        let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;

        let users = mongo.collection(USER_COLLECTION).await?;
        let containers = mongo.collection(CONTAINER_NODE_COLLECTION).await?;
        let learning: MongoCollection<LearningNodeDoc> =
            mongo.collection(LEARNING_NODE_COLLECTION).await?;
        let attempts = mongo.collection(TEST_ATTEMPT_COLLECTION).await?;
        let reviews_coll = mongo.collection(PROJECT_REVIEW_COLLECTION).await?;
        let cached = mongo.collection(CACHED_RESPONSE_COLLECTION).await?;

        let cache = ResponseCache::new(Arc::new(MongoResponseStore::new(cached)));
        let quota = Arc::new(RateLimiter::daily(args.daily_submission_limit));
        let test_quota = Arc::new(RateLimiter::hourly(args.test_rate_limit));

        let ai = Arc::new(OpenAiBackend::new(
            args.ai_base_url.clone(),
            args.ai_api_key.clone(),
            Duration::from_secs(args.ai_timeout_seconds),
        )?);

        let node_store = Arc::new(MongoNodeStore::new(learning.clone()));

        let tests = TestService::new(
            node_store.clone(),
            Arc::new(MongoAttemptStore::new(attempts)),
            cache.clone(),
            ai.clone(),
            args.ai_model.clone(),
            Duration::from_secs(args.test_cache_ttl_days as u64 * 24 * 60 * 60),
        );
        let reviews = ReviewService::new(
            node_store,
            Arc::new(MongoReviewStore::new(reviews_coll)),
            cache.clone(),
            ai,
            quota.clone(),
            args.ai_model.clone(),
            args.ai_model_strong.clone(),
            Duration::from_secs(args.review_cache_ttl_days as u64 * 24 * 60 * 60),
        );

        Ok(Self {
            args,
            jwt,
            users,
            containers,
            learning,
            cache,
            quota,
            test_quota,
            tests,
            reviews,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), UltimaError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    // Drop expired cache entries hourly; the store's own TTL index is the
    // backstop for entries this instance never touches
    spawn_sweep_task(state.cache.clone(), Duration::from_secs(3600));

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move {
                            Ok::<_, hyper::Error>(handle_request(state, req).await)
                        }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Authenticate a request from its Authorization header
pub(crate) fn authenticate(
    state: &AppState,
    req: &Request<Incoming>,
) -> Result<ObjectId, UltimaError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| UltimaError::Unauthorized("Authorization header required".into()))?;

    let token = extract_token_from_header(header)
        .ok_or_else(|| UltimaError::Unauthorized("Bearer token required".into()))?;

    let claims = state.jwt.validate_token(token)?;
    if claims.refresh {
        return Err(UltimaError::Unauthorized(
            "Refresh token cannot be used for API access".into(),
        ));
    }

    ObjectId::parse_str(&claims.user_id)
        .map_err(|_| UltimaError::Unauthorized("Malformed token subject".into()))
}

/// Route incoming HTTP requests
async fn handle_request(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("{} {}", method, path);

    if method == Method::OPTIONS {
        return preflight_response();
    }

    // Public routes
    match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return routes::health_check(state);
        }
        (&Method::GET, "/version") => return routes::version_info(),
        _ => {}
    }

    if path.starts_with("/auth") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return response;
        }
        return error_response(&UltimaError::NotFound(format!("No route for {}", path)));
    }

    // Everything under /api requires a valid access token
    if path.starts_with("/api") {
        let user_id = match authenticate(&state, &req) {
            Ok(user_id) => user_id,
            Err(e) => return error_response(&e),
        };

        if path.starts_with("/api/nodes") {
            return routes::handle_nodes_request(req, state, user_id).await;
        }
        if path.starts_with("/api/tests") {
            return routes::handle_tests_request(req, state, user_id).await;
        }
        if path.starts_with("/api/projects") {
            return routes::handle_projects_request(req, state, user_id).await;
        }
    }

    error_response(&UltimaError::NotFound(format!("No route for {}", path)))
}
