//! HTTP API server implementation

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::core::auth::{require_user, IdentityResolver, JwtIdentityResolver};
use crate::core::cache::MetadataCache;
use crate::core::client::{provider_from_config, TranslationProvider};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::TranslatorConfig;
use crate::core::errors::TranslationError;
use crate::core::history::{HistoryStore, InMemoryHistoryStore, TranslationHistory};
use crate::core::languages::unsupported_codes;
use crate::core::ledger::{InMemoryUsageStore, UsageLedger, UsageStore};
use crate::core::models::{
    HistoryEntry, Language, LanguageDirection, Preferences, ProviderUsage, TranslationRequest,
    TranslationResult, UsageStat,
};
use crate::core::preferences::{InMemoryPreferencesStore, PreferencesStore, UserPreferences};
use crate::core::rate_limiter::RateLimiter;
use crate::core::translator::Translator;

/// Persistence shared by the pipeline and the per-user endpoints
#[derive(Clone)]
pub struct Storage {
    /// Per-user daily usage counters
    pub ledger: Arc<UsageLedger>,
    /// Completed translations
    pub history: Arc<TranslationHistory>,
    /// Saved language pairs
    pub preferences: Arc<UserPreferences>,
}

impl Storage {
    /// Build each service over its backend, sharing one clock
    pub fn new(
        usage: Arc<dyn UsageStore>,
        history: Arc<dyn HistoryStore>,
        preferences: Arc<dyn PreferencesStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger: Arc::new(UsageLedger::new(usage, clock.clone())),
            history: Arc::new(TranslationHistory::new(history, clock)),
            preferences: Arc::new(UserPreferences::new(preferences)),
        }
    }

    /// Everything in process memory on the given clock
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(InMemoryUsageStore::new()),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(InMemoryPreferencesStore::new()),
            clock,
        )
    }

    #[cfg(feature = "mongodb")]
    async fn from_config(config: &TranslatorConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        use crate::core::mongo_store::{
            connect, MongoHistoryStore, MongoPreferencesStore, MongoUsageStore,
        };

        let Some(uri) = &config.mongodb_uri else {
            return Ok(Self::in_memory(clock));
        };
        let database = connect(uri, &config.mongodb_database).await?;
        Ok(Self::new(
            Arc::new(MongoUsageStore::open(&database).await?),
            Arc::new(MongoHistoryStore::open(&database).await?),
            Arc::new(MongoPreferencesStore::open(&database).await?),
            clock,
        ))
    }

    #[cfg(not(feature = "mongodb"))]
    async fn from_config(config: &TranslatorConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        if config.mongodb_uri.is_some() {
            warn!("MONGODB_URI is set but the mongodb feature is disabled, data is kept in memory");
        }
        Ok(Self::in_memory(clock))
    }
}

/// Application state
pub struct AppState {
    /// Translate pipeline
    pub translator: Translator,
    /// Provider metadata cache
    pub cache: MetadataCache,
    /// Usage, history and preferences
    pub storage: Storage,
    /// Bearer token verification
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Wire every component from configuration
    pub async fn from_config(config: &TranslatorConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let provider = provider_from_config(config)?;

        let resolver = JwtIdentityResolver::new(
            &config.auth_issuer_domain,
            config.auth_audience.clone(),
            config.timeout(),
            clock.clone(),
        )?;
        info!("Accepting identity tokens issued by {}", resolver.issuer());
        let identity: Arc<dyn IdentityResolver> = Arc::new(resolver);

        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_window(),
            config.rate_limit_max_requests,
            clock.clone(),
        ));
        info!(
            "Rate limit: {} translations per {}s per user",
            limiter.max_requests(),
            limiter.window().as_secs()
        );

        let storage = Storage::from_config(config, clock.clone()).await?;
        let cache = MetadataCache::new(
            provider.clone(),
            clock,
            config.language_cache_ttl(),
            config.usage_cache_ttl(),
        );

        Ok(Self::new(provider, identity, limiter, storage, cache, config.max_text_bytes))
    }

    /// Assemble state from already-built components
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        identity: Arc<dyn IdentityResolver>,
        limiter: Arc<RateLimiter>,
        storage: Storage,
        cache: MetadataCache,
        max_text_bytes: usize,
    ) -> Self {
        let translator = Translator::new(provider, identity.clone(), limiter, storage.ledger.clone())
            .with_history(storage.history.clone())
            .with_max_text_bytes(max_text_bytes);
        Self {
            translator,
            cache,
            storage,
            identity,
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Normalized, caller-safe message
    pub error: String,
}

#[derive(Deserialize)]
struct LanguagesQuery {
    #[serde(rename = "type")]
    direction: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Deserialize)]
struct HistoryListQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LanguageList {
    languages: Vec<Language>,
}

#[derive(Serialize)]
struct LanguagePairs {
    source: Vec<Language>,
    target: Vec<Language>,
}

#[derive(Serialize)]
struct UsageHistory {
    stats: Vec<UsageStat>,
}

#[derive(Serialize)]
struct HistoryList {
    entries: Vec<HistoryEntry>,
}

impl IntoResponse for TranslationError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if let TranslationError::Internal(detail) = &self {
            error!("Internal error: {}", detail);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

/// Token from an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn parse_date(field: &str, value: Option<&str>) -> Result<NaiveDate, TranslationError> {
    let value = value.ok_or_else(|| {
        TranslationError::invalid_input(format!("{field} is required (YYYY-MM-DD)"))
    })?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| TranslationError::invalid_input(format!("{field} must be a YYYY-MM-DD date")))
}

fn malformed_body(what: &str, rejection: JsonRejection) -> TranslationError {
    warn!("Rejected {} body: {}", what, rejection);
    TranslationError::invalid_input("Malformed JSON body")
}

/// Health check handler
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Translation handler
async fn translate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<TranslationRequest>, JsonRejection>,
) -> Result<Json<TranslationResult>, TranslationError> {
    let Json(request) = payload.map_err(|e| malformed_body("translate", e))?;

    let result = state
        .translator
        .translate(bearer_token(&headers), &request)
        .await?;

    Ok(Json(result))
}

/// Languages handler, one direction or both
async fn languages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LanguagesQuery>,
) -> Result<Response, TranslationError> {
    match query.direction.as_deref() {
        Some(direction) => {
            let direction: LanguageDirection = direction
                .parse()
                .map_err(|_| TranslationError::invalid_input("type must be source or target"))?;
            let languages = state.cache.languages_or_fallback(direction).await;
            Ok(Json(LanguageList { languages }).into_response())
        }
        None => {
            let (source, target) = tokio::join!(
                state.cache.languages_or_fallback(LanguageDirection::Source),
                state.cache.languages_or_fallback(LanguageDirection::Target),
            );
            Ok(Json(LanguagePairs { source, target }).into_response())
        }
    }
}

/// Provider quota handler
async fn usage(State(state): State<Arc<AppState>>) -> Result<Json<ProviderUsage>, TranslationError> {
    Ok(Json(state.cache.get_usage().await?))
}

/// Caller's usage for today
async fn usage_today(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UsageStat>, TranslationError> {
    let user = require_user(state.identity.as_ref(), bearer_token(&headers)).await?;
    let ledger = &state.storage.ledger;
    let stat = ledger
        .get_today(&user.id)
        .await?
        .unwrap_or_else(|| UsageStat::empty(user.id.clone(), ledger.today()));
    Ok(Json(stat))
}

/// Caller's usage over an inclusive date range
async fn usage_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<UsageHistory>, TranslationError> {
    let user = require_user(state.identity.as_ref(), bearer_token(&headers)).await?;
    let from = parse_date("from", query.from.as_deref())?;
    let to = parse_date("to", query.to.as_deref())?;
    if from > to {
        return Err(TranslationError::invalid_input("from must not be after to"));
    }

    let stats = state.storage.ledger.get_range(&user.id, from, to).await?;
    Ok(Json(UsageHistory { stats }))
}

/// Caller's recent translations, newest first
async fn list_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<HistoryListQuery>, QueryRejection>,
) -> Result<Json<HistoryList>, TranslationError> {
    let user = require_user(state.identity.as_ref(), bearer_token(&headers)).await?;
    let Query(query) =
        query.map_err(|_| TranslationError::invalid_input("limit must be a non-negative integer"))?;

    let entries = state.storage.history.list(&user.id, query.limit).await?;
    Ok(Json(HistoryList { entries }))
}

/// Delete the caller's history
async fn clear_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, TranslationError> {
    let user = require_user(state.identity.as_ref(), bearer_token(&headers)).await?;
    let deleted = state.storage.history.clear(&user.id).await?;
    info!("Cleared {} history entries for {}", deleted, user.id);
    Ok(Json(json!({ "deleted": deleted })))
}

/// Caller's saved language pair, defaults if never saved
async fn get_preferences(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Preferences>, TranslationError> {
    let user = require_user(state.identity.as_ref(), bearer_token(&headers)).await?;
    Ok(Json(state.storage.preferences.get(&user.id).await?))
}

/// Save the caller's language pair
async fn save_preferences(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<Preferences>, JsonRejection>,
) -> Result<Json<Preferences>, TranslationError> {
    let user = require_user(state.identity.as_ref(), bearer_token(&headers)).await?;
    let Json(preferences) = payload.map_err(|e| malformed_body("preferences", e))?;

    Ok(Json(state.storage.preferences.save(&user.id, &preferences).await?))
}

/// CORS policy for the configured browser origins
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Build the router
pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/translate", post(translate))
        .route("/languages", get(languages))
        .route("/usage", get(usage))
        .route("/usage/today", get(usage_today))
        .route("/usage/history", get(usage_history))
        .route("/history", get(list_history).delete(clear_history))
        .route("/preferences", get(get_preferences).put(save_preferences))
        .with_state(state)
        .layer(cors)
}

/// Warn about mapped language codes the provider does not advertise
async fn check_language_table(state: &AppState) {
    let dialect = state.translator.dialect();
    let mut advertised = Vec::new();
    for direction in LanguageDirection::ALL {
        match state.cache.get_languages(direction).await {
            Ok(languages) => advertised.extend(languages),
            Err(e) => {
                warn!("Could not fetch {} languages at startup: {}", direction, e);
                return;
            }
        }
    }

    let missing = unsupported_codes(dialect, &advertised);
    if missing.is_empty() {
        info!("All {} mapped language codes are supported by the provider", advertised.len());
    } else {
        warn!("Provider does not list mapped language codes: {}", missing.join(", "));
    }
}

/// Run the HTTP server
pub async fn run_server(config: TranslatorConfig, host: String, port: u16) -> anyhow::Result<()> {
    config.validate()?;

    let state = Arc::new(AppState::from_config(&config).await?);
    check_language_table(&state).await;

    let app = router(state, cors_layer(&config.cors_allowed_origins)?);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {} with provider {}", addr, config.provider);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
