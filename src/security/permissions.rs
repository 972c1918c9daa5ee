//! Permission resolution — session-scoped capability queries.
//!
//! A session's effective permissions are derived from its role: one fetch per
//! session (or per explicit reload) populates a [`PermissionSet`], and every
//! later capability query is answered synchronously from memory. The sentinel
//! permission `"all"` grants every capability unconditionally.
//!
//! The resolver is fail-closed: any failure while loading — the session lookup,
//! the role fetch, a malformed role payload — logs a warning and resets to an
//! empty, unloaded set. Errors never propagate to callers; a query against a
//! failed load simply answers `false`.
//!
//! State machine: `Unloaded → Loading → Loaded` on success, `Loading → Unloaded`
//! on failure. `Loaded → Loading` only on a forced reload. Concurrent
//! `resolve()` calls during `Loading` are not coalesced; each may trigger its
//! own fetch, last writer wins.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::Context;
use crate::middleware::{Middleware, Next};
use crate::{Response, StatusCode};

/// Sentinel permission granting every capability.
pub const ALL_PERMISSIONS: &str = "all";

/// Errors produced while loading a session's permissions.
///
/// These never escape [`PermissionResolver::resolve`]; they exist so
/// collaborators have a precise vocabulary for what went wrong before the
/// resolver swallows the failure into an empty set.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session lookup failed: {0}")]
    Session(String),

    #[error("role fetch failed: {0}")]
    RoleFetch(String),

    #[error("malformed role payload: missing `{field}` field")]
    MalformedRole { field: &'static str },
}

/// The current user as reported by the session provider.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: String,
    /// Role identifier, when the user has one assigned. Users without a role
    /// resolve to an empty permission set without touching the role service.
    pub role_id: Option<String>,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, role_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_id,
        }
    }
}

/// External collaborator exposing the current user identity.
pub trait SessionProvider: Send + Sync {
    /// Returns the current user, or `None` when no session is active.
    fn current_user(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserSession>, AuthError>> + Send + '_>>;
}

/// External collaborator resolving a role identifier to its permission list.
pub trait RoleService: Send + Sync {
    /// Fetches the permission names granted to `role_id`.
    fn fetch_permissions<'a>(
        &'a self,
        role_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, AuthError>> + Send + 'a>>;
}

/// Extracts the permission list from a JSON role payload.
///
/// Role services backed by HTTP APIs return bodies shaped like
/// `{"permissions": ["lead.read", "lead.write"]}`. A missing or non-array
/// `permissions` field is a [`AuthError::MalformedRole`], which the resolver
/// treats identically to a fetch failure. Non-string array elements are
/// skipped.
pub fn permissions_from_json(payload: &serde_json::Value) -> Result<Vec<String>, AuthError> {
    let list = payload
        .get("permissions")
        .and_then(|v| v.as_array())
        .ok_or(AuthError::MalformedRole {
            field: "permissions",
        })?;
    Ok(list
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect())
}

/// An in-memory role → permissions table implementing [`RoleService`].
///
/// Used by tests and by deployments that configure roles statically rather
/// than fetching them from a directory service.
#[derive(Debug, Default)]
pub struct StaticRoleStore {
    roles: HashMap<String, Vec<String>>,
}

impl StaticRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a role and its granted permissions.
    #[must_use]
    pub fn with_role<I, S>(mut self, role_id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.insert(
            role_id.into(),
            permissions.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl RoleService for StaticRoleStore {
    fn fetch_permissions<'a>(
        &'a self,
        role_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, AuthError>> + Send + 'a>> {
        Box::pin(async move {
            self.roles
                .get(role_id)
                .cloned()
                .ok_or_else(|| AuthError::RoleFetch(format!("unknown role: {role_id}")))
        })
    }
}

/// A session's effective permission set.
///
/// `loaded` distinguishes "we asked and the answer was nothing" from "we have
/// not asked yet" — both answer every [`has`](Self::has) query with `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    loaded: bool,
    values: HashSet<String>,
}

impl PermissionSet {
    /// An empty, unloaded set — the state at session start and after failures.
    pub fn empty() -> Self {
        Self::default()
    }

    fn loaded_with(values: HashSet<String>) -> Self {
        Self {
            loaded: true,
            values,
        }
    }

    /// Returns `true` once a load has completed successfully.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Returns `true` iff the sentinel `"all"` is present or `permission`
    /// matches an entry exactly.
    pub fn has(&self, permission: &str) -> bool {
        self.values.contains(ALL_PERMISSIONS) || self.values.contains(permission)
    }

    /// Returns `true` iff [`has`](Self::has) holds for at least one element,
    /// short-circuiting on the first match.
    pub fn has_any<I, S>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        permissions.into_iter().any(|p| self.has(p.as_ref()))
    }

    /// Iterates the raw permission names, for display surfaces.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

struct Inner {
    state: LoadState,
    values: HashSet<String>,
}

impl Inner {
    fn snapshot(&self) -> PermissionSet {
        PermissionSet {
            loaded: self.state == LoadState::Loaded,
            values: self.values.clone(),
        }
    }
}

/// Session-scoped permission resolver.
///
/// Owned explicitly by the session (constructed at session start, shared by
/// `Arc`), never an ambient singleton, so tests get isolated instances.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use leadify::security::{PermissionResolver, StaticRoleStore, SessionProvider, UserSession, AuthError};
/// use std::{future::Future, pin::Pin};
///
/// struct OneUser;
///
/// impl SessionProvider for OneUser {
///     fn current_user(
///         &self,
///     ) -> Pin<Box<dyn Future<Output = Result<Option<UserSession>, AuthError>> + Send + '_>> {
///         Box::pin(async {
///             Ok(Some(UserSession::new("u-1", Some("sales".to_owned()))))
///         })
///     }
/// }
///
/// # async fn demo() {
/// let roles = StaticRoleStore::new().with_role("sales", ["lead.read", "lead.write"]);
/// let resolver = PermissionResolver::new(Arc::new(OneUser), Arc::new(roles));
///
/// resolver.resolve(false).await;
/// assert!(resolver.has("lead.read"));
/// assert!(!resolver.has("project.delete"));
/// # }
/// ```
pub struct PermissionResolver {
    session: Arc<dyn SessionProvider>,
    roles: Arc<dyn RoleService>,
    inner: RwLock<Inner>,
}

impl PermissionResolver {
    pub fn new(session: Arc<dyn SessionProvider>, roles: Arc<dyn RoleService>) -> Self {
        Self {
            session,
            roles,
            inner: RwLock::new(Inner {
                state: LoadState::Unloaded,
                values: HashSet::new(),
            }),
        }
    }

    // The guarded data is plain state that is valid at every point a panic
    // could unwind, so a poisoned lock is recovered rather than propagated.
    fn lock_read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Ensures the permission set is loaded and returns a snapshot of it.
    ///
    /// When already loaded and `force_reload` is `false` this is pure and
    /// cheap: the existing set is returned with no I/O. Otherwise the current
    /// user is looked up and, when a role is assigned, its permission list is
    /// fetched; each successful load fully replaces the previous contents.
    /// On any failure the set resets to empty/unloaded and the error is logged,
    /// never returned.
    pub async fn resolve(&self, force_reload: bool) -> PermissionSet {
        if !force_reload {
            let inner = self.lock_read();
            if inner.state == LoadState::Loaded {
                return inner.snapshot();
            }
        }

        self.lock_write().state = LoadState::Loading;

        match self.load().await {
            Ok(values) => {
                let mut inner = self.lock_write();
                inner.state = LoadState::Loaded;
                inner.values = values;
                inner.snapshot()
            }
            Err(e) => {
                warn!(error = %e, "permission load failed — resetting to empty set");
                let mut inner = self.lock_write();
                inner.state = LoadState::Unloaded;
                inner.values.clear();
                inner.snapshot()
            }
        }
    }

    // One full load: session lookup, then role fetch when a role is assigned.
    // No session or no role is a definitive empty answer, not an error.
    async fn load(&self) -> Result<HashSet<String>, AuthError> {
        let Some(user) = self.session.current_user().await? else {
            debug!("no active session — empty permission set");
            return Ok(HashSet::new());
        };

        let Some(role_id) = user.role_id else {
            debug!(user = %user.user_id, "user has no role — empty permission set");
            return Ok(HashSet::new());
        };

        let permissions = self.roles.fetch_permissions(&role_id).await?;
        debug!(role = %role_id, count = permissions.len(), "loaded role permissions");
        Ok(permissions.into_iter().collect())
    }

    /// Returns `true` iff the sentinel `"all"` or the exact permission string
    /// is present. Pure, synchronous, no I/O.
    pub fn has(&self, permission: &str) -> bool {
        let inner = self.lock_read();
        inner.values.contains(ALL_PERMISSIONS) || inner.values.contains(permission)
    }

    /// Returns `true` iff [`has`](Self::has) holds for at least one element,
    /// short-circuiting on the first match.
    pub fn has_any<I, S>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        permissions.into_iter().any(|p| self.has(p.as_ref()))
    }

    /// Resets to empty/unloaded. Called on logout; the next
    /// [`resolve`](Self::resolve) performs a fresh load.
    pub fn clear(&self) {
        let mut inner = self.lock_write();
        inner.state = LoadState::Unloaded;
        inner.values.clear();
    }

    /// Returns a snapshot of the current permission set, for display surfaces.
    pub fn permissions(&self) -> PermissionSet {
        self.lock_read().snapshot()
    }
}

/// Route guard middleware: allows the request through when the session holds
/// at least one of the required permissions, otherwise short-circuits with
/// `403 Forbidden`.
///
/// A resolver injected into the request's [`Extensions`](crate::context::Extensions)
/// (by session middleware earlier in the pipeline, as `Arc<PermissionResolver>`)
/// takes precedence over the constructor-supplied one, so per-request sessions
/// can override the process-wide default.
///
/// Resolves lazily on first use, so mounting the guard does not force a role
/// fetch at startup. A guard constructed with no required permissions always
/// passes.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use leadify::middleware::Pipeline;
/// use leadify::security::RequirePermission;
/// # fn demo(resolver: Arc<leadify::security::PermissionResolver>) {
/// let pipeline = Pipeline::new()
///     .with(Arc::new(RequirePermission::any_of(
///         resolver,
///         ["lead.read", "all"],
///     )));
/// # }
/// ```
pub struct RequirePermission {
    resolver: Arc<PermissionResolver>,
    required: Vec<String>,
}

impl RequirePermission {
    /// Creates a guard that passes when any one of `required` is granted.
    pub fn any_of<I, S>(resolver: Arc<PermissionResolver>, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resolver,
            required: required.into_iter().map(Into::into).collect(),
        }
    }
}

impl Middleware for RequirePermission {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let fallback = Arc::clone(&self.resolver);
        let required = self.required.clone();

        Box::pin(async move {
            let resolver = ctx
                .extensions()
                .get::<Arc<PermissionResolver>>()
                .map(Arc::clone)
                .unwrap_or(fallback);

            resolver.resolve(false).await;

            if required.is_empty() || resolver.has_any(&required) {
                return next.run(ctx).await;
            }

            debug!(
                path = %ctx.request().path(),
                required = ?required,
                "permission denied"
            );
            Response::new(StatusCode::Forbidden).body("Insufficient permissions")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use crate::middleware::Pipeline;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Session provider that always reports the same user.
    struct FixedSession(Option<UserSession>);

    impl SessionProvider for FixedSession {
        fn current_user(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<UserSession>, AuthError>> + Send + '_>>
        {
            let user = self.0.clone();
            Box::pin(async move { Ok(user) })
        }
    }

    // Role service that counts fetches and can be flipped into failure mode.
    struct CountingRoles {
        permissions: RwLock<Option<Vec<String>>>,
        fetches: AtomicUsize,
    }

    impl CountingRoles {
        fn granting<S: Into<String>>(permissions: impl IntoIterator<Item = S>) -> Self {
            Self {
                permissions: RwLock::new(Some(
                    permissions.into_iter().map(Into::into).collect(),
                )),
                fetches: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                permissions: RwLock::new(None),
                fetches: AtomicUsize::new(0),
            }
        }

        fn fail_from_now_on(&self) {
            *self.permissions.write().unwrap() = None;
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl RoleService for CountingRoles {
        fn fetch_permissions<'a>(
            &'a self,
            _role_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, AuthError>> + Send + 'a>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let result = self
                .permissions
                .read()
                .unwrap()
                .clone()
                .ok_or_else(|| AuthError::RoleFetch("503 from role service".to_owned()));
            Box::pin(async move { result })
        }
    }

    fn sales_session() -> Arc<FixedSession> {
        Arc::new(FixedSession(Some(UserSession::new(
            "u-1",
            Some("sales".to_owned()),
        ))))
    }

    fn resolver_with(roles: Arc<CountingRoles>) -> PermissionResolver {
        PermissionResolver::new(sales_session(), roles)
    }

    // ── PermissionSet ─────────────────────────────────────────────────────────

    #[test]
    fn unloaded_set_denies_everything() {
        let set = PermissionSet::empty();
        assert!(!set.is_loaded());
        assert!(!set.has("lead.read"));
        assert!(!set.has_any(["lead.read", "all"]));
    }

    #[test]
    fn all_sentinel_grants_arbitrary_permissions() {
        let set = PermissionSet::loaded_with(HashSet::from([ALL_PERMISSIONS.to_owned()]));
        assert!(set.has("lead.read"));
        assert!(set.has("anything.at.all"));
        assert!(set.has_any(["never.granted.explicitly"]));
    }

    // ── PermissionResolver ────────────────────────────────────────────────────

    #[tokio::test]
    async fn resolve_loads_role_permissions() {
        let roles = Arc::new(CountingRoles::granting(["lead.read", "lead.write"]));
        let resolver = resolver_with(Arc::clone(&roles));

        let set = resolver.resolve(false).await;
        assert!(set.is_loaded());
        assert!(resolver.has("lead.read"));
        assert!(resolver.has("lead.write"));
        assert!(!resolver.has("project.read"));
        assert!(resolver.has_any(["project.read", "lead.write"]));
        assert!(!resolver.has_any(["project.read", "project.write"]));
    }

    #[tokio::test]
    async fn resolve_is_idempotent_once_loaded() {
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = resolver_with(Arc::clone(&roles));

        resolver.resolve(false).await;
        resolver.resolve(false).await;
        resolver.resolve(false).await;

        assert_eq!(roles.fetch_count(), 1);
    }

    #[tokio::test]
    async fn force_reload_fetches_again() {
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = resolver_with(Arc::clone(&roles));

        resolver.resolve(false).await;
        resolver.resolve(true).await;

        assert_eq!(roles.fetch_count(), 2);
    }

    // Session provider whose backing store is down.
    struct FailingSession;

    impl SessionProvider for FailingSession {
        fn current_user(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<UserSession>, AuthError>> + Send + '_>>
        {
            Box::pin(async {
                Err(AuthError::Session("session store unavailable".to_owned()))
            })
        }
    }

    #[tokio::test]
    async fn session_lookup_failure_fails_closed() {
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = PermissionResolver::new(
            Arc::new(FailingSession),
            Arc::clone(&roles) as Arc<dyn RoleService>,
        );

        let set = resolver.resolve(false).await;
        assert!(!set.is_loaded());
        assert!(set.is_empty());
        assert!(!resolver.has("lead.read"));
        // The role service is never consulted when the session lookup fails.
        assert_eq!(roles.fetch_count(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_fails_closed() {
        let roles = Arc::new(CountingRoles::failing());
        let resolver = resolver_with(Arc::clone(&roles));

        let set = resolver.resolve(false).await;
        assert!(!set.is_loaded());
        assert!(set.is_empty());
        assert!(!resolver.has("lead.read"));
    }

    #[tokio::test]
    async fn failed_reload_discards_previous_grants() {
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = resolver_with(Arc::clone(&roles));

        resolver.resolve(false).await;
        assert!(resolver.has("lead.read"));

        roles.fail_from_now_on();
        let set = resolver.resolve(true).await;

        // Full reset, not a partial merge with the old set.
        assert!(!set.is_loaded());
        assert!(!resolver.has("lead.read"));
    }

    #[tokio::test]
    async fn clear_resets_and_next_resolve_refetches() {
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = resolver_with(Arc::clone(&roles));

        resolver.resolve(false).await;
        resolver.clear();

        assert!(!resolver.has("lead.read"));
        assert!(!resolver.permissions().is_loaded());

        resolver.resolve(false).await;
        assert_eq!(roles.fetch_count(), 2);
        assert!(resolver.has("lead.read"));
    }

    #[tokio::test]
    async fn user_without_role_loads_empty_without_fetching() {
        let session = Arc::new(FixedSession(Some(UserSession::new("u-2", None))));
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = PermissionResolver::new(session, Arc::clone(&roles) as Arc<dyn RoleService>);

        let set = resolver.resolve(false).await;
        assert!(set.is_loaded());
        assert!(set.is_empty());
        assert_eq!(roles.fetch_count(), 0);
    }

    #[tokio::test]
    async fn no_session_loads_empty_without_fetching() {
        let session = Arc::new(FixedSession(None));
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = PermissionResolver::new(session, Arc::clone(&roles) as Arc<dyn RoleService>);

        let set = resolver.resolve(false).await;
        assert!(set.is_loaded());
        assert!(set.is_empty());
        assert_eq!(roles.fetch_count(), 0);
    }

    // ── Role payload decoding ─────────────────────────────────────────────────

    #[test]
    fn json_payload_decodes_permission_list() {
        let payload = serde_json::json!({"permissions": ["lead.read", "lead.write"]});
        let perms = permissions_from_json(&payload).unwrap();
        assert_eq!(perms, vec!["lead.read", "lead.write"]);
    }

    #[test]
    fn json_payload_missing_field_is_malformed() {
        let payload = serde_json::json!({"role": "sales"});
        let err = permissions_from_json(&payload).unwrap_err();
        assert!(matches!(
            err,
            AuthError::MalformedRole {
                field: "permissions"
            }
        ));
    }

    #[tokio::test]
    async fn static_store_unknown_role_errors() {
        let store = StaticRoleStore::new().with_role("admin", [ALL_PERMISSIONS]);
        assert!(store.fetch_permissions("admin").await.is_ok());
        assert!(matches!(
            store.fetch_permissions("ghost").await,
            Err(AuthError::RoleFetch(_))
        ));
    }

    // ── RequirePermission guard ───────────────────────────────────────────────

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: crm.local\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn guarded_pipeline(resolver: Arc<PermissionResolver>, required: &[&str]) -> Pipeline {
        Pipeline::new()
            .with(Arc::new(RequirePermission::any_of(
                resolver,
                required.iter().copied(),
            )))
            .terminal(|_ctx| async { Response::new(StatusCode::Ok).body("leads") })
    }

    #[tokio::test]
    async fn guard_allows_granted_permission() {
        let roles = Arc::new(CountingRoles::granting(["lead.read"]));
        let resolver = Arc::new(resolver_with(roles));
        let pipeline = guarded_pipeline(resolver, &["lead.read"]);

        let res = pipeline.dispatch(make_request("GET", "/leads")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn guard_rejects_missing_permission() {
        let roles = Arc::new(CountingRoles::granting(["vehicle.read"]));
        let resolver = Arc::new(resolver_with(roles));
        let pipeline = guarded_pipeline(resolver, &["lead.read", "lead.write"]);

        let res = pipeline.dispatch(make_request("GET", "/leads")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn guard_rejects_after_fetch_failure() {
        let roles = Arc::new(CountingRoles::failing());
        let resolver = Arc::new(resolver_with(roles));
        let pipeline = guarded_pipeline(resolver, &["lead.read"]);

        let res = pipeline.dispatch(make_request("GET", "/leads")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    // Session middleware that installs a per-request resolver into extensions.
    struct InjectResolver(Arc<PermissionResolver>);

    impl Middleware for InjectResolver {
        fn handle(
            &self,
            mut ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let resolver = Arc::clone(&self.0);
            Box::pin(async move {
                ctx.extensions_mut().insert(resolver);
                next.run(ctx).await
            })
        }
    }

    #[tokio::test]
    async fn guard_prefers_resolver_from_extensions() {
        // Fallback resolver would deny; the injected per-request one grants.
        let denying = Arc::new(resolver_with(Arc::new(CountingRoles::failing())));
        let granting = Arc::new(resolver_with(Arc::new(CountingRoles::granting([
            "lead.read",
        ]))));

        let pipeline = Pipeline::new()
            .with(Arc::new(InjectResolver(granting)))
            .with(Arc::new(RequirePermission::any_of(denying, ["lead.read"])))
            .terminal(|_ctx| async { Response::new(StatusCode::Ok).body("leads") });

        let res = pipeline.dispatch(make_request("GET", "/leads")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn guard_falls_back_to_constructed_resolver() {
        // Nothing injected: the constructor-supplied resolver decides.
        let denying = Arc::new(resolver_with(Arc::new(CountingRoles::failing())));
        let pipeline = guarded_pipeline(denying, &["lead.read"]);

        let res = pipeline.dispatch(make_request("GET", "/leads")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn guard_without_requirements_passes() {
        let roles = Arc::new(CountingRoles::granting(Vec::<String>::new()));
        let resolver = Arc::new(resolver_with(roles));
        let pipeline = guarded_pipeline(resolver, &[]);

        let res = pipeline.dispatch(make_request("GET", "/leads")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }
}
