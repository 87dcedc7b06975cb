//! Read-through cache in front of slug lookups.

use crate::cache::{Cacheable, InMemoryCache, DEFAULT_ENTRY_COST};
use crate::error::{IdentityError, Result};
use crate::models::Group;
use crate::repository::GroupRepository;
use async_trait::async_trait;
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

pub const GROUP_KEY_PREFIX: &str = "group";

fn cache_key(prefix: &str, slug: &str) -> String {
    format!("{}:{}", prefix, slug)
}

/// Backend read path keyed by slug.
#[async_trait]
pub trait SlugSource<T>: Send + Sync {
    async fn fetch_by_slug(&self, slug: &str) -> Result<T>;
}

#[async_trait]
impl<R> SlugSource<Group> for R
where
    R: GroupRepository + ?Sized,
{
    async fn fetch_by_slug(&self, slug: &str) -> Result<Group> {
        GroupRepository::get_by_slug(self, slug).await
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CachedRepository<T: Send + Sync + 'static>: Send + Sync {
    async fn get_by_slug(&self, slug: &str) -> Result<T>;
}

/// Cache-aside wrapper over any [`SlugSource`]; entries live under
/// `<prefix>:<slug>`.
pub struct CachedSlugRepository<T, S: ?Sized> {
    cache: InMemoryCache,
    source: Arc<S>,
    prefix: &'static str,
    _value: PhantomData<fn() -> T>,
}

/// Group-by-slug instance used by the group service.
pub type CachedGroupRepository = CachedSlugRepository<Group, dyn GroupRepository>;

impl<T, S: ?Sized> CachedSlugRepository<T, S> {
    pub fn with_prefix(prefix: &'static str, cache: InMemoryCache, source: Arc<S>) -> Self {
        Self {
            cache,
            source,
            prefix,
            _value: PhantomData,
        }
    }

    pub fn cache(&self) -> &InMemoryCache {
        &self.cache
    }

    pub fn key(&self, slug: &str) -> String {
        cache_key(self.prefix, slug)
    }
}

impl CachedSlugRepository<Group, dyn GroupRepository> {
    pub fn new(cache: InMemoryCache, repository: Arc<dyn GroupRepository>) -> Self {
        Self::with_prefix(GROUP_KEY_PREFIX, cache, repository)
    }
}

#[async_trait]
impl<T, S> CachedRepository<T> for CachedSlugRepository<T, S>
where
    T: Cacheable + Clone + Send + Sync + 'static,
    S: SlugSource<T> + ?Sized,
{
    async fn get_by_slug(&self, slug: &str) -> Result<T> {
        let key = self.key(slug);

        if let Some(value) = self.cache.get(&key).await {
            let kind = value.kind();
            return T::from_cache_value(value).ok_or_else(|| {
                warn!(
                    key = %key,
                    found = kind,
                    expected = type_name::<T>(),
                    "Cached value has the wrong type"
                );
                IdentityError::Parsing(key.clone())
            });
        }

        let value = self.source.fetch_by_slug(slug).await?;
        if !self.cache.set(&key, value.clone(), DEFAULT_ENTRY_COST).await {
            debug!(key = %key, "Value was not admitted to the cache");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::models::User;
    use crate::repository::MockGroupRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_group() -> Group {
        let mut group = Group::new("test group", "test-group-slug", "org-1");
        group.id = "test-group-id".to_string();
        group
    }

    #[tokio::test]
    async fn test_hit_skips_backend() {
        let cache = InMemoryCache::new(CacheConfig::default());
        let group = create_test_group();
        cache.set(&cache_key(GROUP_KEY_PREFIX, &group.slug), group.clone(), 0).await;
        cache.wait().await;

        let mut repository = MockGroupRepository::new();
        repository.expect_get_by_slug().never();

        let cached = CachedGroupRepository::new(cache, Arc::new(repository));
        let found = cached.get_by_slug("test-group-slug").await.unwrap();
        assert_eq!(found, group);
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let group = create_test_group();
        let returned = group.clone();

        let mut repository = MockGroupRepository::new();
        repository
            .expect_get_by_slug()
            .withf(|slug| slug == "test-group-slug")
            .times(1)
            .returning(move |_| Ok(returned.clone()));

        let cached = CachedGroupRepository::new(
            InMemoryCache::new(CacheConfig::default()),
            Arc::new(repository),
        );

        assert_eq!(cached.get_by_slug("test-group-slug").await.unwrap(), group);
        cached.cache().wait().await;
        // second read is served from the cache, the mock allows one call only
        assert_eq!(cached.get_by_slug("test-group-slug").await.unwrap(), group);

        let metrics = cached.cache().metrics().unwrap();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_not_cached() {
        let mut repository = MockGroupRepository::new();
        repository
            .expect_get_by_slug()
            .times(2)
            .returning(|_| Err(IdentityError::GroupNotFound));

        let cached = CachedGroupRepository::new(
            InMemoryCache::new(CacheConfig::default()),
            Arc::new(repository),
        );

        for _ in 0..2 {
            assert!(matches!(
                cached.get_by_slug("missing").await,
                Err(IdentityError::GroupNotFound)
            ));
        }
        assert_eq!(cached.cache().metrics().unwrap().keys_added, 0);
    }

    #[tokio::test]
    async fn test_wrong_cached_type_is_a_parsing_error() {
        let cache = InMemoryCache::new(CacheConfig::default());
        cache
            .set(&cache_key(GROUP_KEY_PREFIX, "test-group-slug"), "corrupt".to_string(), 0)
            .await;
        cache.wait().await;

        let mut repository = MockGroupRepository::new();
        repository.expect_get_by_slug().never();

        let cached = CachedGroupRepository::new(cache, Arc::new(repository));
        let result = cached.get_by_slug("test-group-slug").await;
        assert!(matches!(result, Err(IdentityError::Parsing(_))));
    }

    struct UsersByHandle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SlugSource<User> for UsersByHandle {
        async fn fetch_by_slug(&self, slug: &str) -> Result<User> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(User::new("u1", slug, "alice@example.com"))
        }
    }

    #[tokio::test]
    async fn test_any_cacheable_type_can_be_cached() {
        let source = Arc::new(UsersByHandle {
            calls: AtomicUsize::new(0),
        });
        let cached: CachedSlugRepository<User, UsersByHandle> = CachedSlugRepository::with_prefix(
            "user",
            InMemoryCache::new(CacheConfig::default()),
            source.clone(),
        );

        assert_eq!(cached.get_by_slug("alice").await.unwrap().id, "u1");
        cached.cache().wait().await;
        assert_eq!(cached.get_by_slug("alice").await.unwrap().name, "alice");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert!(matches!(
            cached.cache().get("user:alice").await,
            Some(crate::cache::CacheValue::User(_))
        ));
    }
}
