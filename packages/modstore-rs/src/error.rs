//! Structured error types for modstore.
//!
//! `StoreError` provides pattern-matchable errors for every condition the
//! store reports. Almost none of them are returned to the caller: the store
//! follows a **report and continue** policy so that one module's
//! misconfiguration cannot take down unrelated parts of the tree.
//!
//! # The Reporting Rule
//!
//! > **A dead-letter commit or dispatch never crashes the caller.**
//!
//! - Configuration and routing problems are sent to [`Diagnostics`] and
//!   logged through `tracing` at the level given by [`StoreError::severity`].
//! - `anyhow::Error` is reserved for user code: action handlers and action
//!   subscriber hooks. Those failures travel back to the dispatcher.
//! - `register_module` and `hot_update` additionally return the error, since
//!   the caller asked for a structural change that did not happen.
//!
//! # Example
//!
//! ```ignore
//! use modstore::{StoreError, HandlerKind};
//!
//! store.commit("cart/nope", json!(null));
//!
//! let unknown = store.diagnostics().matching(|e| {
//!     matches!(e, StoreError::UnknownType { kind: HandlerKind::Mutation, .. })
//! });
//! assert_eq!(unknown.len(), 1);
//! ```
//!
//! [`Diagnostics`]: crate::Diagnostics

use std::fmt;

use thiserror::Error;

use crate::path::ModulePath;
use crate::subscription::HookPhase;

// =============================================================================
// Handler Kind
// =============================================================================

/// The three kinds of handler a module can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Synchronous state change, run inside a commit.
    Mutation,
    /// Asynchronous workflow, run by dispatch.
    Action,
    /// Derived read-only value.
    Getter,
}

impl HandlerKind {
    /// Plural section name as it appears in a module declaration.
    pub fn section(&self) -> &'static str {
        match self {
            HandlerKind::Mutation => "mutations",
            HandlerKind::Action => "actions",
            HandlerKind::Getter => "getters",
        }
    }

    /// What a well-formed definition of this kind looks like.
    pub(crate) fn expected_shape(&self) -> &'static str {
        match self {
            HandlerKind::Mutation | HandlerKind::Getter => "a handler or handler name",
            HandlerKind::Action => {
                "a handler, a handler name, or an object with a \"handler\" name"
            }
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Mutation => write!(f, "mutation"),
            HandlerKind::Action => write!(f, "action"),
            HandlerKind::Getter => write!(f, "getter"),
        }
    }
}

// =============================================================================
// Severity
// =============================================================================

/// How loudly a reported error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Suspicious but legal (state key collisions, deprecated options).
    Warning,
    /// Misconfiguration or misuse; the offending call became a no-op.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Structured error type for store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A declared handler is not usable: unknown catalog name, a name that
    /// belongs to another kind, or a value that is not a handler at all.
    #[error(
        "{} should be {} but \"{}.{key}\"{} is {found}",
        .kind.section(),
        .kind.expected_shape(),
        .kind.section(),
        .path.location()
    )]
    Shape {
        /// Module that declared the handler.
        path: ModulePath,
        /// Section the handler was declared in.
        kind: HandlerKind,
        /// Local name of the handler.
        key: String,
        /// Description of what was found instead.
        found: String,
    },

    /// Commit, dispatch or getter read against a name with no handler.
    #[error("unknown {kind} type: {type_name}")]
    UnknownType {
        /// Which registry was consulted.
        kind: HandlerKind,
        /// Fully-qualified name that was requested.
        type_name: String,
    },

    /// A namespaced module asked for a local name that does not resolve.
    #[error("unknown local {kind} type: {local}, global type: {global}")]
    UnknownLocalType {
        /// Which registry was consulted.
        kind: HandlerKind,
        /// Name as the module wrote it.
        local: String,
        /// Name after namespace prefixing.
        global: String,
    },

    /// Two namespaced modules resolved to the same namespace.
    #[error("duplicate namespace {namespace} for the namespaced module {}", .path.slashed())]
    DuplicateNamespace {
        /// The shared namespace prefix.
        namespace: String,
        /// Path of the module registered last (the one kept in the lookup).
        path: ModulePath,
    },

    /// A getter name was registered twice; the first registration wins.
    #[error("duplicate getter key: {type_name}")]
    DuplicateGetter {
        /// Fully-qualified getter name.
        type_name: String,
    },

    /// A path names a module (or parent module) that is not in the tree.
    #[error("module \"{path}\" is not registered")]
    UnregisteredModulePath {
        /// The path that failed to resolve.
        path: ModulePath,
    },

    /// The path cannot be used for this operation.
    #[error("invalid module path \"{path}\": {reason}")]
    InvalidModulePath {
        /// The rejected path.
        path: ModulePath,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A hot update tried to add a module that is not in the live tree.
    #[error("trying to add a new module '{key}' at \"{path}\" on hot reloading, manual reload is needed")]
    HotUpdateAddsModule {
        /// Module whose declaration gained a child.
        path: ModulePath,
        /// The new child key.
        key: String,
    },

    /// Attaching a module's state replaced an existing field of its parent.
    #[error("state field \"{field}\" was overridden by a module with the same name at \"{path}\"")]
    StateFieldOverridden {
        /// The overwritten field.
        field: String,
        /// Path of the module whose state now occupies the field.
        path: ModulePath,
    },

    /// The parent state slice cannot hold child state (not an object), or
    /// a module's slice is missing from the live tree.
    #[error("state slot for module \"{path}\" is unavailable")]
    StateSlotUnavailable {
        /// Module whose slice could not be resolved.
        path: ModulePath,
    },

    /// State changed while no commit was in progress (strict mode only).
    #[error("do not mutate store state outside mutation handlers")]
    StrictModeViolation,

    /// An action subscriber hook failed or panicked.
    #[error("error in {phase} action subscribers for {type_name}: {message}")]
    HookFailure {
        /// Which hook failed.
        phase: HookPhase,
        /// Action being dispatched.
        type_name: String,
        /// Rendered error or panic message.
        message: String,
    },

    /// Object-style commit/dispatch whose `type` field is not a string.
    #[error("expects string as the type, but found {found}")]
    InvalidDescriptor {
        /// The offending `type` value, rendered as JSON.
        found: String,
    },

    /// The `silent` commit option no longer has any effect.
    #[error("mutation type: {type_name}. Silent option has been removed")]
    SilentOptionRemoved {
        /// Mutation committed with `silent: true`.
        type_name: String,
    },
}

impl StoreError {
    /// Logging level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            StoreError::StateFieldOverridden { .. }
            | StoreError::SilentOptionRemoved { .. }
            | StoreError::HotUpdateAddsModule { .. }
            | StoreError::HookFailure { .. } => Severity::Warning,
            StoreError::UnregisteredModulePath { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Short machine-friendly label, used as a tracing field.
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::Shape { .. } => "shape",
            StoreError::UnknownType { .. } => "unknown_type",
            StoreError::UnknownLocalType { .. } => "unknown_local_type",
            StoreError::DuplicateNamespace { .. } => "duplicate_namespace",
            StoreError::DuplicateGetter { .. } => "duplicate_getter",
            StoreError::UnregisteredModulePath { .. } => "unregistered_module_path",
            StoreError::InvalidModulePath { .. } => "invalid_module_path",
            StoreError::HotUpdateAddsModule { .. } => "hot_update_adds_module",
            StoreError::StateFieldOverridden { .. } => "state_field_overridden",
            StoreError::StateSlotUnavailable { .. } => "state_slot_unavailable",
            StoreError::StrictModeViolation => "strict_mode_violation",
            StoreError::HookFailure { .. } => "hook_failure",
            StoreError::InvalidDescriptor { .. } => "invalid_descriptor",
            StoreError::SilentOptionRemoved { .. } => "silent_option_removed",
        }
    }
}
