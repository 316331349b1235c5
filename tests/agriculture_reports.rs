//! Store-backed tests for extension-officer visits and the commodity fan-out.

mod common;

use assert_matches::assert_matches;
use building_report_backend::analytics::DateRange;
use building_report_backend::context::RequestContext;
use building_report_backend::domain::enums::CommodityType;
use building_report_backend::domain::DashboardScope;
use building_report_backend::error::CoreError;
use common::{agriculture_repo, block, date, visit};
use sqlx::PgPool;

fn year_2024() -> DashboardScope {
    DashboardScope::new().with_range(DateRange::new(date(2024, 1, 1), date(2024, 12, 31)).unwrap())
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn distribution_splits_land_area_by_block(pool: PgPool) {
    let repo = agriculture_repo(&pool);
    let ctx = RequestContext::background();

    let mut food = visit(date(2024, 3, 4));
    food.food = block("PADI", 2.5);
    let mut horti = visit(date(2024, 4, 9));
    horti.horti = block("CABAI", 0.5);
    let mut plantation = visit(date(2024, 7, 21));
    plantation.plantation = block("KOPI", 3.5);
    let mut outside = visit(date(2023, 7, 21));
    outside.food = block("PADI", 40.0);
    for v in [food, horti, plantation, outside] {
        repo.create(&ctx, v, &[]).await.unwrap();
    }

    let dist = repo.commodity_distribution(&ctx, &year_2024()).await.unwrap();

    let by_type: Vec<_> = dist.by_type.iter().map(|t| (t.commodity_type, t.land_area)).collect();
    assert_eq!(
        by_type,
        vec![
            (CommodityType::Pangan, 2.5),
            (CommodityType::Hortikultura, 0.5),
            (CommodityType::Perkebunan, 3.5),
        ]
    );
    assert_eq!(dist.combined_total, 6.5);
    let fan_sum: f64 = dist.rows.iter().map(|r| r.land_area).sum();
    assert!((fan_sum - dist.combined_total).abs() < 1e-6);
    let pct: f64 = dist.by_type.iter().map(|t| t.percentage).sum();
    assert!((pct - 100.0).abs() <= 0.05);
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn fan_out_matches_combined_area_with_mixed_blocks(pool: PgPool) {
    let repo = agriculture_repo(&pool);
    let ctx = RequestContext::background();

    let mut mixed = visit(date(2024, 2, 1));
    mixed.food = block("JAGUNG", 1.25);
    mixed.plantation = block("KAKAO", 0.75);
    let mut blank = visit(date(2024, 2, 2));
    blank.food = block("KEDELAI", 2.0);
    blank.horti = block("   ", 9.0);
    for v in [mixed, blank] {
        repo.create(&ctx, v, &[]).await.unwrap();
    }

    let scope = year_2024();
    let dist = repo.commodity_distribution(&ctx, &scope).await.unwrap();
    let combined = repo.combined_land_area(&ctx, &scope).await.unwrap();
    let fan_sum: f64 = dist.by_type.iter().map(|t| t.land_area).sum();
    assert!((fan_sum - combined).abs() < 1e-6, "fan-out {fan_sum} vs combined {combined}");
    assert!((combined - 4.0).abs() < 1e-6);
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn productivity_trend_zero_fills_missing_years(pool: PgPool) {
    let repo = agriculture_repo(&pool);
    let ctx = RequestContext::background();
    let mut v = visit(date(2023, 8, 17));
    v.food = block("PADI", 10.0);
    repo.create(&ctx, v, &[]).await.unwrap();

    let trend = repo
        .productivity_trend(&ctx, "PADI", &[2022, 2023, 2024], &DashboardScope::new())
        .await
        .unwrap();

    let rows: Vec<_> = trend.iter().map(|p| (p.year, p.land_area, p.production)).collect();
    assert_eq!(rows, vec![(2022, 0.0, 0.0), (2023, 10.0, 52.0), (2024, 0.0, 0.0)]);
    assert_eq!(trend[1].productivity, 5.2);
    assert_eq!(trend[0].productivity, 0.0);
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn visit_without_a_commodity_is_rejected(pool: PgPool) {
    let repo = agriculture_repo(&pool);
    let ctx = RequestContext::background();
    let mut v = visit(date(2024, 1, 5));
    v.food = block("  ", 3.0);

    let err = repo.create(&ctx, v, &[]).await.unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
}

#[sqlx::test(migrations = false, fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn stored_visit_reads_back_with_derived_type(pool: PgPool) {
    let repo = agriculture_repo(&pool);
    let ctx = RequestContext::background();
    let mut v = visit(date(2024, 5, 5));
    v.horti = block("TOMAT", 0.4);
    v.plantation = block("KOPI", 1.0);

    let stored = repo.create(&ctx, v, &[]).await.unwrap();
    let read = repo.find_by_id(&ctx, &stored.header.id).await.unwrap();

    assert_eq!(read.header.id, stored.header.id);
    assert!(read.header.created_at <= read.header.updated_at);
    assert_eq!(read.commodity_type, Some(CommodityType::Hortikultura));
    assert!(read.food.is_none());
    assert_eq!(read.horti.as_ref().map(|b| b.commodity.as_str()), Some("TOMAT"));
}
