// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segment-by-segment browse path resolution with an optional cache.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{BrowseError, Error, Result};
use crate::protocol::{Browser, with_timeout};
use crate::types::{BrowsePath, NodeRef};

use super::BrowseFilter;

type CacheKey = (NodeRef, BrowsePath);

/// Resolves a [`BrowsePath`] to exactly one [`NodeRef`].
///
/// Each segment costs one browse round trip. With caching enabled, every
/// resolved prefix is remembered per root, and a later resolution starts
/// from the longest cached prefix. If a walk that started from the cache
/// hits a missing segment, the entries under that prefix are dropped and the
/// path is walked again from the root.
#[derive(Debug)]
pub struct PathResolver {
    cache: Option<Mutex<HashMap<CacheKey, NodeRef>>>,
}

impl PathResolver {
    /// Creates a resolver that always walks from the root.
    #[must_use]
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Creates a resolver that caches resolved prefixes.
    #[must_use]
    pub fn with_cache() -> Self {
        Self {
            cache: Some(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` if prefixes are cached.
    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Returns the number of cached prefixes.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }

    /// Resolves `path` starting at `root`.
    ///
    /// `timeout` bounds each browse round trip.
    ///
    /// # Errors
    ///
    /// - `BrowseError::NotFound` if no child matches a segment
    /// - `BrowseError::Ambiguous` if more than one child matches a segment
    /// - `Error::Protocol` / `Error::Timeout` if a browse fails
    pub async fn resolve<B>(
        &self,
        browser: &B,
        root: &NodeRef,
        path: &BrowsePath,
        timeout: Duration,
    ) -> Result<NodeRef>
    where
        B: Browser + ?Sized,
    {
        let (start, from) = self.longest_cached_prefix(root, path);
        if start == path.len() {
            tracing::trace!(root = %root, path = %path, "Browse path cache hit");
            return Ok(from);
        }

        match self.walk(browser, root, from, path, start, timeout).await {
            Err(Error::Browse(BrowseError::NotFound { .. })) if start > 0 => {
                tracing::debug!(
                    root = %root,
                    path = %path,
                    cached_segments = start,
                    "Cached browse path is stale, resolving from root"
                );
                if let Some(stale) = path.prefix(start) {
                    self.invalidate(root, &stale);
                }
                self.walk(browser, root, root.clone(), path, 0, timeout).await
            }
            other => other,
        }
    }

    /// Drops the cached entries of `root` at or below `path`.
    pub fn invalidate(&self, root: &NodeRef, path: &BrowsePath) {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .retain(|(r, p), _| !(r == root && p.starts_with(path)));
        }
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    fn longest_cached_prefix(&self, root: &NodeRef, path: &BrowsePath) -> (usize, NodeRef) {
        if let Some(cache) = &self.cache {
            let cache = cache.lock();
            for len in (1..=path.len()).rev() {
                let Some(prefix) = path.prefix(len) else {
                    continue;
                };
                if let Some(node) = cache.get(&(root.clone(), prefix)) {
                    return (len, node.clone());
                }
            }
        }
        (0, root.clone())
    }

    fn remember(&self, root: &NodeRef, path: &BrowsePath, len: usize, node: &NodeRef) {
        if let (Some(cache), Some(prefix)) = (&self.cache, path.prefix(len)) {
            cache.lock().insert((root.clone(), prefix), node.clone());
        }
    }

    async fn walk<B>(
        &self,
        browser: &B,
        root: &NodeRef,
        from: NodeRef,
        path: &BrowsePath,
        start: usize,
        timeout: Duration,
    ) -> Result<NodeRef>
    where
        B: Browser + ?Sized,
    {
        let mut current = from;
        for (idx, segment) in path.segments().iter().enumerate().skip(start) {
            let filter = BrowseFilter::named(segment.clone());
            let children = with_timeout(timeout, browser.browse_children(&current, &filter)).await?;
            let mut matches = children.into_iter().filter(|entry| filter.matches(entry));

            let Some(first) = matches.next() else {
                // Deeper entries under a missing segment are stale as well.
                if let Some(missing) = path.prefix(idx + 1) {
                    self.invalidate(root, &missing);
                }
                return Err(BrowseError::NotFound {
                    path: path.clone(),
                    segment: segment.clone(),
                }
                .into());
            };
            let extra = matches.count();
            if extra > 0 {
                return Err(BrowseError::Ambiguous {
                    path: path.clone(),
                    segment: segment.clone(),
                    matches: extra + 1,
                }
                .into());
            }

            current = first.node;
            self.remember(root, path, idx + 1, &current);
        }
        Ok(current)
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::browse::BrowseEntry;
    use crate::error::ProtocolError;
    use crate::types::{NodeClass, QualifiedName};

    /// Fixed tree: Objects(85) -> 2:MyObject(ns=2;i=1) -> 2:MyVariable(ns=2;i=2),
    /// plus two children named 2:Twin under Objects.
    struct TreeBrowser {
        calls: AtomicUsize,
        object_renamed: Mutex<bool>,
    }

    impl TreeBrowser {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                object_renamed: Mutex::new(false),
            }
        }

        fn children(&self, node: &NodeRef) -> Vec<BrowseEntry> {
            let renamed = *self.object_renamed.lock();
            let object_id = if renamed { 10 } else { 1 };
            if *node == NodeRef::objects() {
                vec![
                    BrowseEntry::new(
                        QualifiedName::new(2, "MyObject"),
                        NodeRef::numeric(2, object_id),
                        NodeClass::Object,
                    ),
                    BrowseEntry::new(QualifiedName::new(2, "Twin"), NodeRef::numeric(2, 3), NodeClass::Object),
                    BrowseEntry::new(QualifiedName::new(2, "Twin"), NodeRef::numeric(2, 4), NodeClass::Object),
                ]
            } else if *node == NodeRef::numeric(2, object_id) {
                vec![BrowseEntry::new(
                    QualifiedName::new(2, "MyVariable"),
                    NodeRef::numeric(2, object_id + 1),
                    NodeClass::Variable,
                )]
            } else {
                Vec::new()
            }
        }
    }

    impl Browser for TreeBrowser {
        async fn browse_children(
            &self,
            node: &NodeRef,
            _filter: &BrowseFilter,
        ) -> std::result::Result<Vec<BrowseEntry>, ProtocolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.children(node))
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn path(s: &str) -> BrowsePath {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn resolves_nested_path() {
        let browser = TreeBrowser::new();
        let resolver = PathResolver::new();
        let node = resolver
            .resolve(&browser, &NodeRef::objects(), &path("2:MyObject/2:MyVariable"), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(node, NodeRef::numeric(2, 2));
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_segment_is_not_found() {
        let browser = TreeBrowser::new();
        let err = PathResolver::new()
            .resolve(&browser, &NodeRef::objects(), &path("2:MyObject/2:Nope"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Browse(BrowseError::NotFound { ref segment, .. }) if segment.name() == "Nope"
        ));
    }

    #[tokio::test]
    async fn duplicate_names_are_ambiguous() {
        let browser = TreeBrowser::new();
        let err = PathResolver::new()
            .resolve(&browser, &NodeRef::objects(), &path("2:Twin"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Browse(BrowseError::Ambiguous { matches: 2, .. })));
    }

    #[tokio::test]
    async fn cache_skips_round_trips() {
        let browser = TreeBrowser::new();
        let resolver = PathResolver::with_cache();
        let target = path("2:MyObject/2:MyVariable");

        resolver.resolve(&browser, &NodeRef::objects(), &target, TIMEOUT).await.unwrap();
        assert_eq!(resolver.cached_len(), 2);
        resolver.resolve(&browser, &NodeRef::objects(), &target, TIMEOUT).await.unwrap();
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_cache_entry_is_invalidated_and_retried() {
        let browser = TreeBrowser::new();
        let resolver = PathResolver::with_cache();

        // Cache only the object.
        resolver
            .resolve(&browser, &NodeRef::objects(), &path("2:MyObject"), TIMEOUT)
            .await
            .unwrap();

        // Server model changes: MyObject now has a different node id.
        *browser.object_renamed.lock() = true;

        let node = resolver
            .resolve(&browser, &NodeRef::objects(), &path("2:MyObject/2:MyVariable"), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(node, NodeRef::numeric(2, 11));

        // Fresh entries replace the stale one.
        let node = resolver
            .resolve(&browser, &NodeRef::objects(), &path("2:MyObject"), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(node, NodeRef::numeric(2, 10));
    }

    #[tokio::test]
    async fn invalidate_drops_descendants_only() {
        let browser = TreeBrowser::new();
        let resolver = PathResolver::with_cache();
        resolver
            .resolve(&browser, &NodeRef::objects(), &path("2:MyObject/2:MyVariable"), TIMEOUT)
            .await
            .unwrap();

        resolver.invalidate(&NodeRef::objects(), &path("2:MyObject/2:MyVariable"));
        assert_eq!(resolver.cached_len(), 1);
        resolver.clear();
        assert_eq!(resolver.cached_len(), 0);
    }
}
