//! Server-side active-profile tracking.
//!
//! Which sub-profile is "active" is global session state on the vendor
//! side: a switch request mutates it for every subsequent request. The
//! context therefore serializes profile-scoped work, holding its lock from
//! the switch through the scoped request itself so that a switch to
//! profile A can never interleave with a request intended for profile B.
//! Account-scoped requests bypass the lock entirely.

use kinharvest_core::{ProfileId, RequestDescriptor};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FetchError;
use crate::session::PerformRequest;

type SwitchBuilder = Box<dyn Fn(&ProfileId) -> RequestDescriptor + Send + Sync>;

/// Tracks and maintains the vendor-side active profile.
pub struct ProfileContext {
    active: Mutex<Option<ProfileId>>,
    build_switch: SwitchBuilder,
}

impl ProfileContext {
    /// Creates a context with a vendor-specific switch-request builder.
    pub fn new(
        build_switch: impl Fn(&ProfileId) -> RequestDescriptor + Send + Sync + 'static,
    ) -> Self {
        Self {
            active: Mutex::new(None),
            build_switch: Box::new(build_switch),
        }
    }

    /// Returns the profile currently believed active, if any.
    pub async fn active(&self) -> Option<ProfileId> {
        self.active.lock().await.clone()
    }

    /// Makes `target` the active profile, issuing a switch request only
    /// when the target differs from the current active profile.
    pub async fn ensure_active(
        &self,
        session: &dyn PerformRequest,
        target: &ProfileId,
    ) -> Result<(), FetchError> {
        let mut active = self.active.lock().await;
        self.ensure_active_locked(session, &mut active, target).await
    }

    async fn ensure_active_locked(
        &self,
        session: &dyn PerformRequest,
        active: &mut Option<ProfileId>,
        target: &ProfileId,
    ) -> Result<(), FetchError> {
        if active.as_ref() == Some(target) {
            return Ok(());
        }

        debug!(profile = %target, "Switching active profile");
        session.perform(&(self.build_switch)(target)).await?;
        *active = Some(target.clone());
        Ok(())
    }

    /// Performs a descriptor, routing profile-scoped requests through the
    /// switch protocol. The lock is held across the scoped request, not
    /// just the switch.
    pub async fn perform(
        &self,
        session: &dyn PerformRequest,
        descriptor: &RequestDescriptor,
    ) -> Result<String, FetchError> {
        match descriptor.target_profile() {
            None => session.perform(descriptor).await,
            Some(target) => {
                let mut active = self.active.lock().await;
                self.ensure_active_locked(session, &mut active, target).await?;
                session.perform(descriptor).await
            }
        }
    }
}

// ============================================================================
// Profile-Routing Session
// ============================================================================

/// A [`PerformRequest`] that routes through a [`ProfileContext`].
///
/// Lets the batch fetcher and page collector stay unaware of profile
/// scoping: they see one perform seam, and scoped descriptors pick up the
/// switch protocol transparently.
pub struct ProfileScopedSession<'a> {
    session: &'a dyn PerformRequest,
    profiles: &'a ProfileContext,
}

impl<'a> ProfileScopedSession<'a> {
    /// Wraps a session with profile routing.
    pub fn new(session: &'a dyn PerformRequest, profiles: &'a ProfileContext) -> Self {
        Self { session, profiles }
    }
}

#[async_trait::async_trait]
impl PerformRequest for ProfileScopedSession<'_> {
    async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
        self.profiles.perform(self.session, descriptor).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct RecordingSession {
        urls: StdMutex<Vec<String>>,
    }

    impl RecordingSession {
        fn new() -> Self {
            Self {
                urls: StdMutex::new(Vec::new()),
            }
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }

        fn switch_count(&self) -> usize {
            self.urls()
                .iter()
                .filter(|u| u.contains("switch"))
                .count()
        }
    }

    #[async_trait]
    impl PerformRequest for RecordingSession {
        async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
            self.urls.lock().unwrap().push(descriptor.url.clone());
            Ok(String::new())
        }
    }

    fn context() -> ProfileContext {
        ProfileContext::new(|profile| {
            RequestDescriptor::get(format!("https://vendor.example/switch?p={}", profile))
        })
    }

    fn scoped(path: &str, profile: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("https://vendor.example/{}", path))
            .scoped_to(ProfileId::new(profile))
    }

    #[tokio::test]
    async fn test_alternating_profiles_switch_each_time() {
        let session = RecordingSession::new();
        let ctx = context();

        ctx.perform(&session, &scoped("a1", "A")).await.unwrap();
        ctx.perform(&session, &scoped("b1", "B")).await.unwrap();
        ctx.perform(&session, &scoped("a2", "A")).await.unwrap();

        assert_eq!(session.switch_count(), 3);
        // Every scoped request is immediately preceded by its switch.
        let urls = session.urls();
        assert!(urls[0].contains("p=A") && urls[1].ends_with("/a1"));
        assert!(urls[2].contains("p=B") && urls[3].ends_with("/b1"));
        assert!(urls[4].contains("p=A") && urls[5].ends_with("/a2"));
    }

    #[tokio::test]
    async fn test_redundant_switches_are_elided() {
        let session = RecordingSession::new();
        let ctx = context();

        ctx.perform(&session, &scoped("a1", "A")).await.unwrap();
        ctx.perform(&session, &scoped("a2", "A")).await.unwrap();
        ctx.perform(&session, &scoped("a3", "A")).await.unwrap();

        assert_eq!(session.switch_count(), 1);
        assert_eq!(ctx.active().await, Some(ProfileId::new("A")));
    }

    #[tokio::test]
    async fn test_account_scope_bypasses_switching() {
        let session = RecordingSession::new();
        let ctx = context();

        ctx.perform(&session, &RequestDescriptor::get("https://vendor.example/acct"))
            .await
            .unwrap();

        assert_eq!(session.switch_count(), 0);
        assert_eq!(ctx.active().await, None);
    }

    #[tokio::test]
    async fn test_failed_switch_leaves_active_unchanged() {
        struct FailingSession;

        #[async_trait]
        impl PerformRequest for FailingSession {
            async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
                Err(FetchError::Forbidden {
                    url: descriptor.url.clone(),
                })
            }
        }

        let ctx = context();
        let result = ctx
            .ensure_active(&FailingSession, &ProfileId::new("A"))
            .await;

        assert!(result.is_err());
        assert_eq!(ctx.active().await, None);
    }
}
