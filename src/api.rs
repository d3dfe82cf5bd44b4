//! REST API
//!
//! Thin axum layer over the orchestrator. Responses carry HAL-style `_links`
//! so clients can follow `launch`/`quit` without building URLs.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info};

use ldfleet_core::{CreationRequest, Instance, LdError, RawCreation};
use ldfleet_lifecycle::Orchestrator;

pub const COLLECTION_PATH: &str = "/ldplayers";

/// Router for the `/ldplayers` resource
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route(COLLECTION_PATH, get(list_instances).post(create_instance))
        .route("/ldplayers/:index", get(get_instance))
        .route("/ldplayers/:index/launch", put(launch_instance))
        .route("/ldplayers/:index/quit", put(quit_instance))
        .with_state(orchestrator)
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub href: String,
}

impl Link {
    fn to(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// One instance with its links
#[derive(Debug, Serialize)]
pub struct InstanceModel {
    #[serde(flatten)]
    pub instance: Instance,
    #[serde(rename = "_links")]
    pub links: BTreeMap<&'static str, Link>,
}

impl From<Instance> for InstanceModel {
    fn from(instance: Instance) -> Self {
        let href = instance_path(instance.index);
        let mut links = BTreeMap::new();
        links.insert("self", Link::to(href.clone()));
        links.insert("ldplayers", Link::to(COLLECTION_PATH));
        if instance.running {
            links.insert("quit", Link::to(format!("{}/quit", href)));
        } else {
            links.insert("launch", Link::to(format!("{}/launch", href)));
        }
        Self { instance, links }
    }
}

#[derive(Debug, Serialize)]
pub struct Embedded {
    pub ldplayers: Vec<InstanceModel>,
}

#[derive(Debug, Serialize)]
pub struct InstanceCollection {
    #[serde(rename = "_embedded")]
    pub embedded: Embedded,
    #[serde(rename = "_links")]
    pub links: BTreeMap<&'static str, Link>,
}

fn instance_path(index: i32) -> String {
    format!("{}/{}", COLLECTION_PATH, index)
}

/// Orchestrator error as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub LdError);

impl From<LdError> for ApiError {
    fn from(err: LdError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            LdError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.0.is_lifecycle_failure() {
            error!("Request failed: {}", self.0.detailed_message());
        }
        (status, self.0.detailed_message()).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn list_instances(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> ApiResult<Json<InstanceCollection>> {
    let instances = orchestrator.get_all().await?;

    let mut links = BTreeMap::new();
    links.insert("self", Link::to(COLLECTION_PATH));
    Ok(Json(InstanceCollection {
        embedded: Embedded {
            ldplayers: instances.into_iter().map(InstanceModel::from).collect(),
        },
        links,
    }))
}

async fn create_instance(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(raw): Json<RawCreation>,
) -> ApiResult<Response> {
    let request = CreationRequest::from(raw);
    let instance = orchestrator.create(&request).await?;
    info!("Created instance '{}' at index {}", instance.name, instance.index);

    let location = instance_path(instance.index);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(InstanceModel::from(instance)),
    )
        .into_response())
}

async fn get_instance(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(index): Path<i32>,
) -> ApiResult<Json<InstanceModel>> {
    let instance = orchestrator
        .get(index)
        .await?
        .ok_or(LdError::NotFound(index))?;
    Ok(Json(instance.into()))
}

async fn launch_instance(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(index): Path<i32>,
) -> ApiResult<Json<InstanceModel>> {
    let instance = orchestrator.launch_and_wait_ready(index).await?;
    Ok(Json(instance.into()))
}

async fn quit_instance(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(index): Path<i32>,
) -> ApiResult<Json<InstanceModel>> {
    let instance = orchestrator.quit_and_wait(index).await?;
    Ok(Json(instance.into()))
}
