//! Reporting endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::report::{LibraryOverview, ReaderIssueCount, StaffIssueCount};

use super::{read_or_default, AuthenticatedUser};

/// Headline counters; all zero with a `message` when they could not be read
#[derive(Serialize, ToSchema)]
pub struct OverviewResponse {
    #[serde(flatten)]
    pub overview: LibraryOverview,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ReaderStatsResponse {
    pub readers: Vec<ReaderIssueCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StaffStatsResponse {
    pub staff: Vec<StaffIssueCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Library overview
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Headline counters", body = OverviewResponse)
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> Json<OverviewResponse> {
    let (overview, message) =
        read_or_default(state.services.reports.overview().await, "Library overview");
    Json(OverviewResponse { overview, message })
}

/// Most active readers
#[utoipa::path(
    get,
    path = "/stats/readers",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Top readers by issues", body = ReaderStatsResponse)
    )
)]
pub async fn get_reader_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> Json<ReaderStatsResponse> {
    let (readers, message) =
        read_or_default(state.services.reports.top_readers().await, "Reader statistics");
    Json(ReaderStatsResponse { readers, message })
}

/// Issues recorded per staff member
#[utoipa::path(
    get,
    path = "/stats/staff",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Issues per staff member", body = StaffStatsResponse)
    )
)]
pub async fn get_staff_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> Json<StaffStatsResponse> {
    let (staff, message) =
        read_or_default(state.services.reports.staff_activity().await, "Staff statistics");
    Json(StaffStatsResponse { staff, message })
}
