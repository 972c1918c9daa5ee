//! Security — permission resolution, route guards, and CORS.
//!
//! The centerpiece is [`PermissionResolver`], which lazily loads the current
//! session's effective permission set from its role and answers capability
//! queries synchronously thereafter. [`RequirePermission`] gates routes on it,
//! and [`CorsMiddleware`] handles the cross-origin policy for browser clients.

pub mod cors;
pub mod permissions;

pub use cors::CorsMiddleware;
pub use permissions::{
    ALL_PERMISSIONS, AuthError, PermissionResolver, PermissionSet, RequirePermission, RoleService,
    SessionProvider, StaticRoleStore, UserSession,
};
