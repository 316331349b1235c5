//! Store-backed tests for spatial-planning violation reports: the review
//! workflow, kpis, map points and the yearly trend.

mod common;

use assert_matches::assert_matches;
use building_report_backend::analytics::DateRange;
use building_report_backend::context::RequestContext;
use building_report_backend::domain::common::ReportHeader;
use building_report_backend::domain::enums::{EnvironmentalImpact, ViolationLevel, ViolationType};
use building_report_backend::domain::status::ReportStatus;
use building_report_backend::domain::DashboardScope;
use building_report_backend::error::CoreError;
use chrono::{TimeZone, Utc};
use common::{date, spatial, spatial_repo};
use sqlx::PgPool;

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn review_workflow_ends_in_resolution(pool: PgPool) {
    let repo = spatial_repo(&pool);
    let ctx = RequestContext::background();
    let stored = repo
        .create(&ctx, spatial(ViolationLevel::Moderate, ViolationType::BorderEncroachment), &[])
        .await
        .unwrap();
    let id = stored.header.id.clone();
    assert_eq!(stored.status, ReportStatus::Pending);

    let err = repo.update_status(&ctx, &id, ReportStatus::Verified, None).await.unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
    let err = repo.update_status(&ctx, &id, ReportStatus::Resolved, None).await.unwrap_err();
    assert_matches!(err, CoreError::Validation(_));

    for next in [ReportStatus::Reviewing, ReportStatus::Processing, ReportStatus::Resolved] {
        let moved = repo.update_status(&ctx, &id, next, Some("tindak lanjut")).await.unwrap();
        assert_eq!(moved.status, next);
    }

    let err = repo.update_status(&ctx, &id, ReportStatus::Processing, None).await.unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
    let again = repo
        .update_status(&ctx, &id, ReportStatus::Resolved, Some("ignored"))
        .await
        .unwrap();
    assert_eq!(again.status, ReportStatus::Resolved);
    assert_eq!(again.status_note.as_deref(), Some("tindak lanjut"));
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn standard_tokens_are_refused_on_create(pool: PgPool) {
    let repo = spatial_repo(&pool);
    let ctx = RequestContext::background();
    let mut report = spatial(ViolationLevel::Light, ViolationType::ZoningViolation);
    report.status = ReportStatus::Completed;

    let err = repo.create(&ctx, report, &[]).await.unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn edits_keep_the_review_status(pool: PgPool) {
    let repo = spatial_repo(&pool);
    let ctx = RequestContext::background();
    let stored = repo
        .create(&ctx, spatial(ViolationLevel::Light, ViolationType::BuildingWithoutPermit), &[])
        .await
        .unwrap();
    let id = stored.header.id.clone();
    repo.update_status(&ctx, &id, ReportStatus::Reviewing, None).await.unwrap();

    let mut edit = stored.clone();
    edit.violation_level = ViolationLevel::Heavy;
    edit.status = ReportStatus::Pending;
    let updated = repo.update(&ctx, &id, edit).await.unwrap();

    assert_eq!(updated.violation_level, ViolationLevel::Heavy);
    assert_eq!(updated.status, ReportStatus::Reviewing);
    assert_eq!(updated.header.created_at, stored.header.created_at);
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn kpis_count_statuses_and_compare_with_last_year(pool: PgPool) {
    let repo = spatial_repo(&pool);
    let ctx = RequestContext::background();

    let heavy = repo
        .create(&ctx, spatial(ViolationLevel::Heavy, ViolationType::LandUseChange), &[])
        .await
        .unwrap();
    for next in [ReportStatus::Reviewing, ReportStatus::Processing, ReportStatus::Resolved] {
        repo.update_status(&ctx, &heavy.header.id, next, None).await.unwrap();
    }
    let mut high_impact = spatial(ViolationLevel::Light, ViolationType::ZoningViolation);
    high_impact.environmental_impact = EnvironmentalImpact::High;
    repo.create(&ctx, high_impact, &[]).await.unwrap();
    let rejected = repo
        .create(&ctx, spatial(ViolationLevel::Moderate, ViolationType::IllegalMining), &[])
        .await
        .unwrap();
    repo.update_status(&ctx, &rejected.header.id, ReportStatus::Rejected, None).await.unwrap();

    let mut last_year = spatial(ViolationLevel::Light, ViolationType::ZoningViolation);
    last_year.report_datetime = Utc.with_ymd_and_hms(2023, 8, 1, 9, 0, 0).unwrap();
    repo.create(&ctx, last_year, &[]).await.unwrap();

    let unbounded = repo.kpis(&ctx, &DashboardScope::new()).await.unwrap();
    assert_eq!(unbounded["total_reports"], 4.0);
    assert!(!unbounded.keys().any(|k| k.ends_with("_growth_pct")));

    let year = DateRange::new(date(2024, 1, 1), date(2024, 12, 31)).unwrap();
    let scope = DashboardScope::new().with_range(year);
    let kpis = repo.kpis(&ctx, &scope).await.unwrap();
    assert_eq!(kpis["total_reports"], 3.0);
    assert_eq!(kpis["pending_reports"], 1.0);
    assert_eq!(kpis["resolved_reports"], 1.0);
    assert_eq!(kpis["rejected_reports"], 1.0);
    assert_eq!(kpis["heavy_violations"], 1.0);
    assert_eq!(kpis["high_impact_reports"], 1.0);
    assert_eq!(kpis["resolution_rate"], 33.33);
    assert_eq!(kpis["total_reports_previous"], 1.0);
    assert_eq!(kpis["total_reports_growth_pct"], 200.0);
    assert!(kpis.keys().all(|k| !k.starts_with("estimated_")));
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn map_points_carry_estimates_and_skip_unlocated(pool: PgPool) {
    let repo = spatial_repo(&pool);
    let ctx = RequestContext::background();

    let mut conversion = spatial(ViolationLevel::Heavy, ViolationType::LandUseChange);
    conversion.location_description = Some("Sawah dialihfungsikan".to_string());
    let conversion = repo.create(&ctx, conversion, &[]).await.unwrap();

    let mut untitled = spatial(ViolationLevel::Light, ViolationType::ZoningViolation);
    untitled.location_description = Some(String::new());
    untitled.report_datetime = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
    repo.create(&ctx, untitled, &[]).await.unwrap();

    let mut unlocated = spatial(ViolationLevel::Moderate, ViolationType::IllegalMining);
    unlocated.header = ReportHeader::new("Rina Wulandari");
    repo.create(&ctx, unlocated, &[]).await.unwrap();

    let points = repo.map_points(&ctx, &DashboardScope::new()).await.unwrap();
    assert_eq!(points.len(), 2);

    let first = &points[0];
    assert_eq!(first.point.id, conversion.header.id);
    assert_eq!(first.point.title, "Sawah dialihfungsikan");
    assert_eq!(first.point.category, "LAND_USE_CHANGE");
    assert_eq!(first.point.severity.as_deref(), Some("HEAVY"));
    assert_eq!(first.point.status.as_deref(), Some("PENDING"));
    assert_eq!(first.point.reported_on, date(2024, 4, 15));
    assert_eq!(first.estimated_length_m, 400.0);
    assert_eq!(first.estimated_area_m2, 15_000.0);

    let second = &points[1];
    assert_eq!(second.point.title, "ZONING_VIOLATION");
    assert_eq!(second.estimated_length_m, 50.0);
    assert_eq!(second.estimated_area_m2, 500.0);
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn trend_counts_resolved_reports_per_year(pool: PgPool) {
    let repo = spatial_repo(&pool);
    let ctx = RequestContext::background();

    let resolved = repo
        .create(&ctx, spatial(ViolationLevel::Moderate, ViolationType::GreenSpaceConversion), &[])
        .await
        .unwrap();
    for next in [ReportStatus::Reviewing, ReportStatus::Processing, ReportStatus::Resolved] {
        repo.update_status(&ctx, &resolved.header.id, next, None).await.unwrap();
    }
    repo.create(&ctx, spatial(ViolationLevel::Light, ViolationType::ZoningViolation), &[])
        .await
        .unwrap();

    let trend = repo.yearly_trend(&ctx, &[2023, 2024], &DashboardScope::new()).await.unwrap();
    let rows: Vec<_> = trend.iter().map(|p| (p.year, p.count, p.value)).collect();
    assert_eq!(rows, vec![(2023, 0, 0.0), (2024, 2, 1.0)]);

    let levels = repo.group_counts(&ctx, "violation_level", &DashboardScope::new()).await.unwrap();
    let labels: Vec<_> = levels.iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec!["LIGHT", "MODERATE"]);
    assert_eq!(levels.iter().map(|g| g.percentage).sum::<f64>(), 100.0);
}
