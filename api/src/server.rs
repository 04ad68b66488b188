use std::{net::SocketAddr, sync::Arc};

use anyhow::{anyhow, Context};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use smart_hub_common::{
    policy::{format_time_of_day, parse_time_of_day},
    ActuatorCommand, HubSettings, SensorReport, SwitchState, PATH_GRAPH, PATH_SENSORS_DATA,
    PATH_SETTINGS,
};

use crate::{
    store::{HubStore, Reading, StoredSettings, MAX_STORAGE},
    sunset::SunsetResolver,
};

const DEFAULT_TIMEZONE: &str = "America/Antigua";
const DEFAULT_SUNSET: &str = "18:45";
const DEFAULT_CORS_ORIGIN: &str = "https://simple-smart-hub-client.netlify.app";

type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    store: HubStore,
    timezone: Tz,
    sunsets: SunsetResolver,
    now: NowFn,
}

impl AppState {
    pub fn new(store: HubStore, timezone: Tz, default_sunset: NaiveTime) -> Self {
        Self {
            store,
            timezone,
            sunsets: SunsetResolver::new(timezone, default_sunset),
            now: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.now = Arc::new(now);
        self
    }

    fn local_now(&self) -> DateTime<Tz> {
        (self.now)().with_timezone(&self.timezone)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SettingsRequest {
    #[serde(default)]
    id: Option<Uuid>,
    user_temp: i32,
    user_light: String,
    light_duration: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SensorDataResponse {
    #[serde(flatten)]
    command: ActuatorCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GraphQuery {
    size: Option<usize>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let timezone_name =
        std::env::var("HUB_TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string());
    let timezone: Tz = timezone_name
        .parse()
        .map_err(|err| anyhow!("invalid HUB_TIMEZONE `{timezone_name}`: {err}"))?;

    let sunset_value =
        std::env::var("HUB_DEFAULT_SUNSET").unwrap_or_else(|_| DEFAULT_SUNSET.to_string());
    let sunset = parse_time_of_day(&sunset_value).context("invalid HUB_DEFAULT_SUNSET")?;

    let cors_origin =
        std::env::var("HUB_CORS_ORIGIN").unwrap_or_else(|_| DEFAULT_CORS_ORIGIN.to_string());
    let cors_origin: HeaderValue = cors_origin
        .parse()
        .with_context(|| format!("invalid HUB_CORS_ORIGIN `{cors_origin}`"))?;

    let state = AppState::new(HubStore::default(), timezone, sunset);
    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(cors_origin)
            .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
            .allow_headers(Any),
    );

    let port = std::env::var("HUB_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind hub server at {addr}"))?;

    info!("hub listening on http://{addr} (timezone {timezone}, fallback sunset {sunset})");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PATH_SENSORS_DATA, post(handle_post_sensors_data))
        .route(
            PATH_SETTINGS,
            get(handle_get_settings).put(handle_put_settings),
        )
        .route(PATH_GRAPH, get(handle_get_graph))
        .with_state(state)
}

async fn handle_post_sensors_data(
    State(state): State<AppState>,
    Json(report): Json<SensorReport>,
) -> impl IntoResponse {
    let now = state.local_now();
    state
        .store
        .record(Reading {
            temperature: report.temperature,
            presence: report.presence,
            datetime: now.fixed_offset(),
        })
        .await;

    let response = match state.store.settings().await {
        Some(settings) => SensorDataResponse {
            command: settings.policy.decide(&report, now.time()),
            settings: None,
        },
        None => SensorDataResponse {
            command: ActuatorCommand {
                fan: SwitchState::Off,
                light: SwitchState::Off,
            },
            settings: Some("none"),
        },
    };

    info!(
        "reading {:.2}°C presence={} -> fan={} light={}",
        report.temperature,
        report.presence,
        response.command.fan.as_str(),
        response.command.light.as_str()
    );
    Json(response)
}

async fn handle_put_settings(
    State(state): State<AppState>,
    Json(request): Json<SettingsRequest>,
) -> axum::response::Response {
    let sunset = if request.user_light.trim().eq_ignore_ascii_case("sunset") {
        let today = state.local_now().date_naive();
        state.sunsets.resolve(request.lat, request.lng, today).await
    } else {
        state.sunsets.fallback()
    };

    let policy = match HubSettings::from_request(
        request.user_temp,
        &request.user_light,
        &request.light_duration,
        sunset,
    ) {
        Ok(policy) => policy,
        Err(err) => {
            warn!("rejected settings update: {err}");
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string());
        }
    };

    let stored = StoredSettings {
        id: request.id.unwrap_or_else(Uuid::new_v4),
        user_temp: policy.user_temp,
        user_light: format_time_of_day(policy.light.on),
        light_time_off: format_time_of_day(policy.light.off),
        policy,
    };

    info!(
        "settings updated: fan above {}°C, light {}-{}",
        stored.user_temp, stored.user_light, stored.light_time_off
    );
    state.store.replace_settings(stored.clone()).await;
    Json(stored).into_response()
}

async fn handle_get_settings(State(state): State<AppState>) -> axum::response::Response {
    match state.store.settings().await {
        Some(settings) => Json(settings).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No settings found"),
    }
}

async fn handle_get_graph(
    State(state): State<AppState>,
    query: Result<Query<GraphQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &format!("size must be an integer between 1 and {MAX_STORAGE}: {rejection}"),
            );
        }
    };
    let Some(size) = query.size else {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "Missing 'size' parameter");
    };
    if !(1..=MAX_STORAGE).contains(&size) {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("size must be between 1 and {MAX_STORAGE}"),
        );
    }

    if state.store.is_empty().await {
        return error_response(StatusCode::NOT_FOUND, "No sensor data available");
    }

    Json(state.store.latest(size).await).into_response()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
