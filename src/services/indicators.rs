//! Indicator read model and the executive summary built over it.

use futures::future::try_join_all;

use crate::auth::{AuthContext, Capability};
use crate::context::RequestContext;
use crate::domain::indicators::{IndicatorKind, IndicatorSnapshot, IndicatorValue};
use crate::error::CoreResult;
use crate::repositories::IndicatorRepository;

#[derive(Clone)]
pub struct IndicatorService {
    indicators: IndicatorRepository,
}

impl IndicatorService {
    pub fn new(indicators: IndicatorRepository) -> Self {
        Self { indicators }
    }

    pub async fn list_by_year(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        kind: IndicatorKind,
        year: i32,
    ) -> CoreResult<Vec<IndicatorValue>> {
        auth.require(Capability::ViewReports)?;
        self.indicators.list_by_year(ctx, kind, year).await
    }

    pub async fn find(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        kind: IndicatorKind,
        indicator_name: &str,
        year: i32,
    ) -> CoreResult<IndicatorValue> {
        auth.require(Capability::ViewReports)?;
        self.indicators.find(ctx, kind, indicator_name, year).await
    }

    /// One indicator's series for a trend chart, oldest first.
    pub async fn trend(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        kind: IndicatorKind,
        indicator_name: &str,
    ) -> CoreResult<Vec<IndicatorValue>> {
        auth.require(Capability::ViewReports)?;
        self.indicators.list_by_indicator(ctx, kind, indicator_name).await
    }

    pub async fn available_years(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        kind: IndicatorKind,
    ) -> CoreResult<Vec<i32>> {
        auth.require(Capability::ViewReports)?;
        self.indicators.available_years(ctx, kind).await
    }

    /// The latest year's values of every series. A series without data
    /// appears with no year and no values.
    pub async fn executive_summary(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
    ) -> CoreResult<Vec<IndicatorSnapshot>> {
        auth.require(Capability::ViewReports)?;
        ctx.run(try_join_all(
            IndicatorKind::ALL.iter().map(|kind| self.snapshot(ctx, *kind)),
        ))
        .await
    }

    async fn snapshot(
        &self,
        ctx: &RequestContext,
        kind: IndicatorKind,
    ) -> CoreResult<IndicatorSnapshot> {
        let years = self.indicators.available_years(ctx, kind).await?;
        let Some(year) = years.first().copied() else {
            return Ok(IndicatorSnapshot {
                kind,
                year: None,
                values: Vec::new(),
            });
        };
        let values = self.indicators.list_by_year(ctx, kind, year).await?;
        Ok(IndicatorSnapshot {
            kind,
            year: Some(year),
            values,
        })
    }
}
