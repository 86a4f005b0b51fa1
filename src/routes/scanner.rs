// src/routes/scanner.rs

use actix_web::{get, web, HttpResponse, Responder};
use serde::Deserialize;

use crate::services::reads::ScannerReads;
use crate::services::relative::RelativeMetricsService;
use crate::utils::errors::ScanError;
use crate::utils::types::{ApiResponse, Timeframe};

#[derive(Debug, Deserialize)]
pub struct TimeframeQuery {
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

#[derive(Debug, Deserialize)]
pub struct RelativeQuery {
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_lookback")]
    pub lookback: u32,
}

fn default_timeframe() -> String {
    "5m".to_string()
}

fn default_lookback() -> u32 {
    200
}

fn bad_timeframe(raw: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::<()> {
        success: false,
        message: Some(format!("unsupported timeframe: {raw}")),
        data: None,
    })
}

fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()> {
        success: false,
        message: Some(message.to_string()),
        data: None,
    })
}

fn internal(e: ScanError) -> HttpResponse {
    HttpResponse::InternalServerError().json(ApiResponse::<()> {
        success: false,
        message: Some(format!("read failed: {e}")),
        data: None,
    })
}

#[get("/scanner")]
pub async fn scanner(
    query: web::Query<TimeframeQuery>,
    reads: web::Data<ScannerReads>,
) -> impl Responder {
    let Ok(timeframe) = query.timeframe.parse::<Timeframe>() else {
        return bad_timeframe(&query.timeframe);
    };

    match reads.scanner(timeframe).await {
        Ok(Some(payload)) => HttpResponse::Ok().json(payload),
        Ok(None) => not_found("no scanner snapshot available"),
        Err(e) => internal(e),
    }
}

#[get("/symbol/{symbol}")]
pub async fn symbol_detail(
    path: web::Path<String>,
    query: web::Query<TimeframeQuery>,
    reads: web::Data<ScannerReads>,
) -> impl Responder {
    let Ok(timeframe) = query.timeframe.parse::<Timeframe>() else {
        return bad_timeframe(&query.timeframe);
    };
    let symbol = path.into_inner().trim().to_uppercase();

    match reads.symbol(timeframe, &symbol).await {
        Ok(Some(payload)) => HttpResponse::Ok().json(payload),
        Ok(None) => not_found("symbol not present in latest snapshot"),
        Err(e) => internal(e),
    }
}

#[get("/benchmarks")]
pub async fn benchmarks(
    query: web::Query<TimeframeQuery>,
    reads: web::Data<ScannerReads>,
) -> impl Responder {
    let Ok(timeframe) = query.timeframe.parse::<Timeframe>() else {
        return bad_timeframe(&query.timeframe);
    };

    match reads.benchmarks(timeframe).await {
        Ok(Some(payload)) => HttpResponse::Ok().json(payload),
        Ok(None) => not_found("no benchmark states available"),
        Err(e) => internal(e),
    }
}

#[get("/relative/{symbol}")]
pub async fn relative_metrics(
    path: web::Path<String>,
    query: web::Query<RelativeQuery>,
    relative: web::Data<RelativeMetricsService>,
) -> impl Responder {
    let Ok(timeframe) = query.timeframe.parse::<Timeframe>() else {
        return bad_timeframe(&query.timeframe);
    };

    match relative
        .get_metrics(&path.into_inner(), timeframe, query.lookback)
        .await
    {
        Ok(payload) => HttpResponse::Ok().json(payload),
        Err(e) => internal(e),
    }
}
