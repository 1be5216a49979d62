//! Catalog routes: list loaded catalogs and inspect one.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::catalog::{CatalogSummary, Section};
use crate::errors::{ApiResponse, AppError};
use crate::models::check::Classification;
use crate::models::engine::EngineType;
use crate::AppState;

/// One check as listed by the catalog detail endpoint.
#[derive(Debug, Serialize)]
pub struct CheckEntry {
    pub id: String,
    pub title: String,
    pub section: String,
    pub classification: Classification,
    pub level: u8,
}

#[derive(Debug, Serialize)]
pub struct CatalogDetail {
    pub engine: EngineType,
    pub standard: String,
    pub version: String,
    pub title: String,
    pub sections: Vec<Section>,
    pub checks: Vec<CheckEntry>,
}

/// GET /api/v1/catalogs
pub async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<CatalogSummary>>> {
    ApiResponse::success(state.catalogs.summaries())
}

/// GET /api/v1/catalogs/{engine}/{standard}
pub async fn get(
    State(state): State<AppState>,
    Path((engine, standard)): Path<(String, String)>,
) -> Result<Json<ApiResponse<CatalogDetail>>, AppError> {
    let not_found = || AppError::NotFound(format!("No catalog '{standard}' for '{engine}'"));

    let engine_type: EngineType = engine.parse().map_err(|_| not_found())?;
    let catalog = state
        .catalogs
        .get(engine_type, &standard)
        .ok_or_else(not_found)?;

    Ok(ApiResponse::success(CatalogDetail {
        engine: catalog.engine,
        standard: catalog.standard.clone(),
        version: catalog.version.clone(),
        title: catalog.title.clone(),
        sections: catalog.sections.clone(),
        checks: catalog
            .checks
            .iter()
            .map(|c| CheckEntry {
                id: c.id.clone(),
                title: c.title.clone(),
                section: c.section.clone(),
                classification: c.classification,
                level: c.level,
            })
            .collect(),
    }))
}
