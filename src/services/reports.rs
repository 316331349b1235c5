//! Report ingest and listing.
//!
//! [`ReportService`] is generic over the store traits below; each repository
//! opts into the ones its domain supports. Every successful write drops the
//! domain's cached dashboards. A failed invalidation never fails the write.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::auth::{AuthContext, Capability};
use crate::config::Settings;
use crate::context::RequestContext;
use crate::domain::common::{NewPhoto, ReportPhoto};
use crate::domain::dashboard::{DashboardScope, ReportDomain, Scored};
use crate::domain::status::ReportStatus;
use crate::domain::{AgricultureReport, RiceField, RoadReport, SpatialReport, WaterReport};
use crate::error::{CoreError, CoreResult};
use crate::pagination::{Page, PageRequest};
use crate::priority::Prioritized;
use crate::repositories::{
    AgricultureRepository, ListQuery, RiceFieldRepository, RoadRepository, SpatialRepository,
    WaterRepository,
};
use crate::services::cache::Cache;

/// Create, read and delete for one record kind.
#[async_trait]
pub trait RecordStore: Send + Sync {
    type Record: Serialize + Send + Sync + 'static;

    fn domain(&self) -> ReportDomain;

    fn set_owner(record: &mut Self::Record, owner: String);

    async fn insert(
        &self,
        ctx: &RequestContext,
        record: Self::Record,
        photos: &[NewPhoto],
    ) -> CoreResult<Self::Record>;

    async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> CoreResult<Self::Record>;

    async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<Self::Record>>;

    async fn find_by_owner(
        &self,
        ctx: &RequestContext,
        owner: &str,
        page: PageRequest,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<Self::Record>>;

    async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()>;
}

#[async_trait]
pub trait EditableStore: RecordStore {
    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        record: Self::Record,
    ) -> CoreResult<Self::Record>;
}

#[async_trait]
pub trait WorkflowStore: RecordStore {
    async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: ReportStatus,
        note: Option<&str>,
    ) -> CoreResult<Self::Record>;
}

#[async_trait]
pub trait PhotoStore: RecordStore {
    async fn add_photo(
        &self,
        ctx: &RequestContext,
        id: &str,
        photo: &NewPhoto,
    ) -> CoreResult<ReportPhoto>;

    async fn delete_photo(&self, ctx: &RequestContext, id: &str, photo_id: &str) -> CoreResult<()>;
}

#[async_trait]
pub trait PriorityStore: RecordStore {
    async fn find_by_priority(
        &self,
        ctx: &RequestContext,
        limit: i64,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<Scored<Self::Record>>>;
}

pub struct ReportService<S> {
    store: S,
    cache: Cache,
    default_limit: i64,
    max_limit: i64,
}

pub type RoadReports = ReportService<RoadRepository>;
pub type WaterReports = ReportService<WaterRepository>;
pub type SpatialReports = ReportService<SpatialRepository>;
pub type AgricultureReports = ReportService<AgricultureRepository>;
pub type RiceFieldReports = ReportService<RiceFieldRepository>;

impl<S: RecordStore> ReportService<S> {
    pub fn new(store: S, cache: Cache, settings: &Settings) -> Self {
        Self {
            store,
            cache,
            default_limit: settings.default_page_limit,
            max_limit: settings.max_page_limit,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and store a new record owned by the caller.
    #[instrument(skip_all, fields(domain = %self.store.domain(), user_id = %auth.user_id))]
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        mut record: S::Record,
        photos: &[NewPhoto],
    ) -> CoreResult<S::Record> {
        auth.require(Capability::SubmitReports)?;
        S::set_owner(&mut record, auth.owner_id());
        let stored = self.store.insert(ctx, record, photos).await?;
        self.invalidate(ctx).await;
        Ok(stored)
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: &str,
    ) -> CoreResult<S::Record> {
        auth.require(Capability::ViewReports)?;
        self.store.find_by_id(ctx, id).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        query: &ListQuery,
    ) -> CoreResult<Page<S::Record>> {
        auth.require(Capability::ViewReports)?;
        self.store
            .find_all(ctx, query, self.default_limit, self.max_limit)
            .await
    }

    /// Records the caller created.
    pub async fn list_mine(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        page: PageRequest,
    ) -> CoreResult<Page<S::Record>> {
        self.store
            .find_by_owner(ctx, &auth.owner_id(), page, self.default_limit, self.max_limit)
            .await
    }

    #[instrument(skip_all, fields(domain = %self.store.domain(), id = id))]
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: &str,
    ) -> CoreResult<()> {
        auth.require(Capability::DeleteReports)?;
        self.store.delete(ctx, id).await?;
        self.invalidate(ctx).await;
        Ok(())
    }

    async fn invalidate(&self, ctx: &RequestContext) {
        let domain = self.store.domain();
        if let Err(e) = self.cache.invalidate_domain(ctx, domain).await {
            warn!(domain = %domain, error = %e, "Dashboard cache invalidation failed");
        }
    }
}

impl<S: EditableStore> ReportService<S> {
    #[instrument(skip_all, fields(domain = %self.store.domain(), id = id))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: &str,
        record: S::Record,
    ) -> CoreResult<S::Record> {
        auth.require(Capability::EditReports)?;
        let stored = self.store.update(ctx, id, record).await?;
        self.invalidate(ctx).await;
        Ok(stored)
    }
}

impl<S: WorkflowStore> ReportService<S> {
    #[instrument(skip_all, fields(domain = %self.store.domain(), id = id, status = %status))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: &str,
        status: ReportStatus,
        note: Option<&str>,
    ) -> CoreResult<S::Record> {
        auth.require(Capability::ReviewReports)?;
        let stored = self.store.update_status(ctx, id, status, note).await?;
        self.invalidate(ctx).await;
        Ok(stored)
    }
}

impl<S: PhotoStore> ReportService<S> {
    pub async fn add_photo(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: &str,
        photo: &NewPhoto,
    ) -> CoreResult<ReportPhoto> {
        auth.require(Capability::EditReports)?;
        let stored = self.store.add_photo(ctx, id, photo).await?;
        self.invalidate(ctx).await;
        Ok(stored)
    }

    pub async fn delete_photo(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: &str,
        photo_id: &str,
    ) -> CoreResult<()> {
        auth.require(Capability::EditReports)?;
        self.store.delete_photo(ctx, id, photo_id).await?;
        self.invalidate(ctx).await;
        Ok(())
    }
}

impl<S> ReportService<S>
where
    S: RecordStore,
    S::Record: Prioritized,
{
    /// A page with each record's in-code priority score attached.
    pub async fn list_scored(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        query: &ListQuery,
    ) -> CoreResult<Page<Scored<S::Record>>> {
        let page = self.list(ctx, auth, query).await?;
        Ok(page.map(score))
    }
}

impl<S: PriorityStore> ReportService<S> {
    /// Open records, highest score first. A zero limit is an empty queue.
    pub async fn priority_queue(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        limit: i64,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<Scored<S::Record>>> {
        auth.require(Capability::ViewReports)?;
        if limit < 0 {
            return Err(CoreError::validation("limit must not be negative"));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store
            .find_by_priority(ctx, limit.min(self.max_limit), scope)
            .await
    }
}

pub fn score<T: Prioritized>(record: T) -> Scored<T> {
    let priority_score = record.priority_score();
    Scored { record, priority_score }
}

// ---------------------------------------------------------------------------
// Store implementations
// ---------------------------------------------------------------------------

macro_rules! report_store {
    ($repo:ty, $record:ty, $domain:expr) => {
        #[async_trait]
        impl RecordStore for $repo {
            type Record = $record;

            fn domain(&self) -> ReportDomain {
                $domain
            }

            fn set_owner(record: &mut $record, owner: String) {
                record.header.created_by = Some(owner);
            }

            async fn insert(
                &self,
                ctx: &RequestContext,
                record: $record,
                photos: &[NewPhoto],
            ) -> CoreResult<$record> {
                self.create(ctx, record, photos).await
            }

            async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> CoreResult<$record> {
                <$repo>::find_by_id(self, ctx, id).await
            }

            async fn find_all(
                &self,
                ctx: &RequestContext,
                query: &ListQuery,
                default_limit: i64,
                max_limit: i64,
            ) -> CoreResult<Page<$record>> {
                <$repo>::find_all(self, ctx, query, default_limit, max_limit).await
            }

            async fn find_by_owner(
                &self,
                ctx: &RequestContext,
                owner: &str,
                page: PageRequest,
                default_limit: i64,
                max_limit: i64,
            ) -> CoreResult<Page<$record>> {
                <$repo>::find_by_owner(self, ctx, owner, page, default_limit, max_limit).await
            }

            async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()> {
                <$repo>::delete(self, ctx, id).await
            }
        }

        #[async_trait]
        impl PhotoStore for $repo {
            async fn add_photo(
                &self,
                ctx: &RequestContext,
                id: &str,
                photo: &NewPhoto,
            ) -> CoreResult<ReportPhoto> {
                <$repo>::add_photo(self, ctx, id, photo).await
            }

            async fn delete_photo(
                &self,
                ctx: &RequestContext,
                id: &str,
                photo_id: &str,
            ) -> CoreResult<()> {
                <$repo>::delete_photo(self, ctx, id, photo_id).await
            }
        }
    };
}

macro_rules! workflow_store {
    ($repo:ty, $record:ty) => {
        #[async_trait]
        impl EditableStore for $repo {
            async fn update(
                &self,
                ctx: &RequestContext,
                id: &str,
                record: $record,
            ) -> CoreResult<$record> {
                <$repo>::update(self, ctx, id, record).await
            }
        }

        #[async_trait]
        impl WorkflowStore for $repo {
            async fn update_status(
                &self,
                ctx: &RequestContext,
                id: &str,
                status: ReportStatus,
                note: Option<&str>,
            ) -> CoreResult<$record> {
                <$repo>::update_status(self, ctx, id, status, note).await
            }
        }
    };
}

macro_rules! priority_store {
    ($repo:ty, $record:ty) => {
        #[async_trait]
        impl PriorityStore for $repo {
            async fn find_by_priority(
                &self,
                ctx: &RequestContext,
                limit: i64,
                scope: &DashboardScope,
            ) -> CoreResult<Vec<Scored<$record>>> {
                <$repo>::find_by_priority(self, ctx, limit, scope).await
            }
        }
    };
}

report_store!(RoadRepository, RoadReport, ReportDomain::Road);
report_store!(WaterRepository, WaterReport, ReportDomain::Water);
report_store!(SpatialRepository, SpatialReport, ReportDomain::Spatial);
report_store!(AgricultureRepository, AgricultureReport, ReportDomain::Agriculture);

workflow_store!(RoadRepository, RoadReport);
workflow_store!(WaterRepository, WaterReport);
workflow_store!(SpatialRepository, SpatialReport);

priority_store!(RoadRepository, RoadReport);
priority_store!(WaterRepository, WaterReport);

#[async_trait]
impl RecordStore for RiceFieldRepository {
    type Record = RiceField;

    fn domain(&self) -> ReportDomain {
        ReportDomain::RiceField
    }

    fn set_owner(record: &mut RiceField, owner: String) {
        record.created_by = Some(owner);
    }

    async fn insert(
        &self,
        ctx: &RequestContext,
        record: RiceField,
        photos: &[NewPhoto],
    ) -> CoreResult<RiceField> {
        if !photos.is_empty() {
            return Err(CoreError::validation("rice field snapshots do not take photos"));
        }
        self.create(ctx, record).await
    }

    async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> CoreResult<RiceField> {
        RiceFieldRepository::find_by_id(self, ctx, id).await
    }

    async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<RiceField>> {
        RiceFieldRepository::find_all(self, ctx, query, default_limit, max_limit).await
    }

    async fn find_by_owner(
        &self,
        ctx: &RequestContext,
        owner: &str,
        page: PageRequest,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<RiceField>> {
        RiceFieldRepository::find_by_owner(self, ctx, owner, page, default_limit, max_limit).await
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()> {
        RiceFieldRepository::delete(self, ctx, id).await
    }
}

#[async_trait]
impl EditableStore for RiceFieldRepository {
    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        record: RiceField,
    ) -> CoreResult<RiceField> {
        RiceFieldRepository::update(self, ctx, id, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use uuid::Uuid;

    use crate::domain::users::Role;
    use crate::pagination::Window;
    use crate::services::cache::{CacheStore, MemoryCache};

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Note {
        id: String,
        owner: Option<String>,
        weight: i32,
    }

    impl Prioritized for Note {
        fn priority_score(&self) -> i32 {
            self.weight * 10
        }
    }

    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<Vec<Note>>,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        type Record = Note;

        fn domain(&self) -> ReportDomain {
            ReportDomain::Road
        }

        fn set_owner(record: &mut Note, owner: String) {
            record.owner = Some(owner);
        }

        async fn insert(
            &self,
            _ctx: &RequestContext,
            record: Note,
            _photos: &[NewPhoto],
        ) -> CoreResult<Note> {
            self.rows.lock().push(record.clone());
            Ok(record)
        }

        async fn find_by_id(&self, _ctx: &RequestContext, id: &str) -> CoreResult<Note> {
            self.rows
                .lock()
                .iter()
                .find(|n| n.id == id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(id))
        }

        async fn find_all(
            &self,
            _ctx: &RequestContext,
            _query: &ListQuery,
            default_limit: i64,
            _max_limit: i64,
        ) -> CoreResult<Page<Note>> {
            let rows = self.rows.lock().clone();
            let total = rows.len() as i64;
            Ok(Page::new(rows, Window { limit: default_limit, offset: 0 }, total))
        }

        async fn find_by_owner(
            &self,
            _ctx: &RequestContext,
            owner: &str,
            _page: PageRequest,
            default_limit: i64,
            _max_limit: i64,
        ) -> CoreResult<Page<Note>> {
            let rows: Vec<Note> = self
                .rows
                .lock()
                .iter()
                .filter(|n| n.owner.as_deref() == Some(owner))
                .cloned()
                .collect();
            let total = rows.len() as i64;
            Ok(Page::new(rows, Window { limit: default_limit, offset: 0 }, total))
        }

        async fn delete(&self, _ctx: &RequestContext, id: &str) -> CoreResult<()> {
            self.rows.lock().retain(|n| n.id != id);
            Ok(())
        }
    }

    #[async_trait]
    impl PhotoStore for FakeStore {
        async fn add_photo(
            &self,
            _ctx: &RequestContext,
            id: &str,
            photo: &NewPhoto,
        ) -> CoreResult<ReportPhoto> {
            Ok(ReportPhoto {
                id: format!("{id}-photo"),
                report_id: id.to_string(),
                photo_url: photo.photo_url.clone(),
                caption: photo.caption.clone(),
                created_at: chrono::Utc::now(),
            })
        }

        async fn delete_photo(
            &self,
            _ctx: &RequestContext,
            _id: &str,
            _photo_id: &str,
        ) -> CoreResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl PriorityStore for FakeStore {
        async fn find_by_priority(
            &self,
            _ctx: &RequestContext,
            limit: i64,
            _scope: &DashboardScope,
        ) -> CoreResult<Vec<Scored<Note>>> {
            let mut scored: Vec<Scored<Note>> =
                self.rows.lock().iter().cloned().map(score).collect();
            scored.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
            scored.truncate(limit as usize);
            Ok(scored)
        }
    }

    fn service() -> (ReportService<FakeStore>, MemoryCache) {
        let settings = Settings::from_source(|key| {
            (key == "DATABASE_URL").then(|| "postgres://localhost/reports".to_string())
        })
        .unwrap();
        let store = MemoryCache::new();
        let cache = Cache::new(Arc::new(store.clone()), "brp", Duration::from_secs(60));
        (ReportService::new(FakeStore::default(), cache, &settings), store)
    }

    fn note(id: &str, weight: i32) -> Note {
        Note { id: id.into(), owner: None, weight }
    }

    #[tokio::test]
    async fn submit_sets_owner_and_drops_cached_dashboards() {
        let (service, store) = service();
        let ctx = RequestContext::background();
        let auth = AuthContext::new(Uuid::new_v4(), "op", Role::Operator);
        store
            .set("brp:dash:road::*:*", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("brp:dash:water::*:*", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let stored = service.submit(&ctx, &auth, note("a", 1), &[]).await.unwrap();
        assert_eq!(stored.owner, Some(auth.owner_id()));
        assert!(!store.exists("brp:dash:road::*:*").await.unwrap());
        assert!(store.exists("brp:dash:water::*:*").await.unwrap());

        let mine = service.list_mine(&ctx, &auth, PageRequest::default()).await.unwrap();
        assert_eq!(mine.total(), 1);
    }

    #[tokio::test]
    async fn viewer_cannot_submit_or_delete() {
        let (service, _) = service();
        let ctx = RequestContext::background();
        let viewer = AuthContext::new(Uuid::new_v4(), "viewer", Role::Viewer);
        assert_matches!(
            service.submit(&ctx, &viewer, note("a", 1), &[]).await,
            Err(CoreError::Unauthorized(_))
        );
        assert_matches!(service.delete(&ctx, &viewer, "a").await, Err(CoreError::Unauthorized(_)));
        assert!(service.store().rows.lock().is_empty());
    }

    #[tokio::test]
    async fn listing_attaches_scores() {
        let (service, _) = service();
        let ctx = RequestContext::background();
        let auth = AuthContext::new(Uuid::new_v4(), "sup", Role::Supervisor);
        service.submit(&ctx, &auth, note("a", 2), &[]).await.unwrap();
        service.submit(&ctx, &auth, note("b", 5), &[]).await.unwrap();

        let page = service.list_scored(&ctx, &auth, &ListQuery::new()).await.unwrap();
        let scores: Vec<i32> = page.data.iter().map(|s| s.priority_score).collect();
        assert_eq!(scores, vec![20, 50]);
    }

    #[tokio::test]
    async fn photo_changes_drop_cached_dashboards() {
        let (service, store) = service();
        let ctx = RequestContext::background();
        let auth = AuthContext::new(Uuid::new_v4(), "op", Role::Operator);
        let key = "brp:dash:road::*:*";

        store.set(key, "{}".into(), Duration::from_secs(60)).await.unwrap();
        let photo = service
            .add_photo(&ctx, &auth, "a", &NewPhoto::new("https://img.example.org/a.jpg"))
            .await
            .unwrap();
        assert_eq!(photo.report_id, "a");
        assert!(!store.exists(key).await.unwrap());

        store.set(key, "{}".into(), Duration::from_secs(60)).await.unwrap();
        service.delete_photo(&ctx, &auth, "a", &photo.id).await.unwrap();
        assert!(!store.exists(key).await.unwrap());
    }

    #[tokio::test]
    async fn zero_limit_queue_is_empty() {
        let (service, _) = service();
        let ctx = RequestContext::background();
        let auth = AuthContext::new(Uuid::new_v4(), "sup", Role::Supervisor);
        service.submit(&ctx, &auth, note("a", 2), &[]).await.unwrap();
        service.submit(&ctx, &auth, note("b", 5), &[]).await.unwrap();
        let scope = DashboardScope::new();

        assert!(service.priority_queue(&ctx, &auth, 0, &scope).await.unwrap().is_empty());
        let top = service.priority_queue(&ctx, &auth, 1, &scope).await.unwrap();
        assert_eq!(top[0].record.id, "b");
        assert_matches!(
            service.priority_queue(&ctx, &auth, -1, &scope).await,
            Err(CoreError::Validation(_))
        );
    }
}
