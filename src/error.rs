use thiserror::Error;

use crate::{dispatch::FailReason, sandbox::SandboxState};

macro_rules! config_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Configuration {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Configuration {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure surfaces to the enclosing test execution as a single error attributable to
/// that test. Nothing in this crate logs an error and continues.
///
/// # Error Categories
///
/// ## Build-time errors
/// - [`Error::Configuration`] - A registry or configuration references an impossible substitution
///
/// ## Dispatch errors
/// - [`Error::DispatchAmbiguity`] - Tie-breaking did not produce a unique candidate (a defect)
/// - [`Error::DispatchFailed`] - A call resolved to a `Fail` decision
/// - [`Error::Invocation`] - A shadow or original body reported a failure
///
/// ## Sandbox errors
/// - [`Error::IsolationLeak`] - A reset did not clear the state it was expected to clear
/// - [`Error::InvalidState`] - A lifecycle operation was attempted in the wrong state
/// - [`Error::SandboxPoisoned`] - The sandbox was poisoned by an earlier failure
/// - [`Error::TaskPanicked`] - The executed task panicked
///
/// ## Object model errors
/// - [`Error::TypeNotFound`], [`Error::FieldNotFound`], [`Error::InvalidReference`],
///   [`Error::StaleReference`]
///
/// # Examples
///
/// ```rust
/// use shadowbox::{Error, ShadowRegistry, TypeUniverse, TypeDescriptor, ShadowType};
/// use std::sync::Arc;
///
/// let universe = TypeUniverse::builder()
///     .add(TypeDescriptor::new("android.os.Build").final_type())
///     .build()?;
/// let shadow = Arc::new(ShadowType::new("ShadowBuild", "android.os.Build").call_through_by_default(true));
///
/// match ShadowRegistry::builder().add_shadow(&shadow).build(&universe) {
///     Err(Error::Configuration { message, .. }) => println!("rejected: {message}"),
///     Err(e) => println!("other error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// # Ok::<(), shadowbox::Error>(())
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The configuration references an impossible substitution.
    ///
    /// Raised at registry build time (e.g. call-through requested for a final type), never
    /// deferred to the first call. Includes the source location where it was detected.
    #[error("Configuration - {file}:{line}: {message}")]
    Configuration {
        /// Description of the invalid configuration
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Tie-breaking between candidate shadow methods failed to produce a unique winner.
    ///
    /// This only happens when two candidates share an identical signature, i.e. a shadow
    /// declares the same method twice. It is an invariant violation and surfaces immediately.
    #[error("Ambiguous dispatch for {type_id}.{method}: {candidates:?}")]
    DispatchAmbiguity {
        /// The runtime type the call was made on
        type_id: String,
        /// The method name being resolved
        method: String,
        /// Rendered signatures of the tied candidates
        candidates: Vec<String>,
    },

    /// The call resolved to a `Fail` decision.
    #[error("Dispatch failed for {type_id}.{method}: {reason}")]
    DispatchFailed {
        /// The runtime type the call was made on
        type_id: String,
        /// The method name that was called
        method: String,
        /// Why no implementation could be selected
        reason: FailReason,
    },

    /// A shadow or original method body failed.
    ///
    /// Bodies return this to model a thrown exception. The dispatcher propagates it unchanged.
    #[error("Invocation of {type_id}.{method} failed: {message}")]
    Invocation {
        /// The type whose method failed
        type_id: String,
        /// The failing method
        method: String,
        /// Failure description supplied by the body
        message: String,
    },

    /// A sandbox reset did not clear the state it was expected to clear.
    ///
    /// The sandbox is poisoned and destroyed instead of being returned to the pool.
    #[error("Isolation leak in sandbox {sandbox}: {details}")]
    IsolationLeak {
        /// Id of the leaking sandbox
        sandbox: u64,
        /// What the leak check observed
        details: String,
    },

    /// A lifecycle operation was attempted in a state that does not permit it.
    #[error("Operation '{operation}' is not valid in state {state}")]
    InvalidState {
        /// The current sandbox state
        state: SandboxState,
        /// The rejected operation
        operation: &'static str,
    },

    /// The sandbox was poisoned by an earlier isolation failure.
    #[error("Sandbox {0} is poisoned")]
    SandboxPoisoned(u64),

    /// The task executed inside the sandbox panicked.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// The requested type does not exist in the type universe.
    #[error("Failed to find type - {0}")]
    TypeNotFound(String),

    /// The requested field is not declared on the type or its ancestors.
    #[error("Failed to find field {type_id}.{field}")]
    FieldNotFound {
        /// The type that was searched
        type_id: String,
        /// The missing field
        field: String,
    },

    /// The object handle does not refer to a live object.
    #[error("Invalid object reference #{0}")]
    InvalidReference(u64),

    /// The object handle was created before the last sandbox reset.
    #[error("Stale object reference #{id} from generation {generation} (current {current})")]
    StaleReference {
        /// The object id
        id: u64,
        /// Generation the handle was created in
        generation: u64,
        /// The namespace's current generation
        current: u64,
    },
}

impl Error {
    /// Creates an [`Error::Invocation`] for a failing method body.
    ///
    /// # Arguments
    ///
    /// * `type_id` - The type whose method failed
    /// * `method` - The failing method
    /// * `message` - Failure description
    #[must_use]
    pub fn invocation(
        type_id: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Invocation {
            type_id: type_id.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error should poison the sandbox it occurred in.
    #[must_use]
    pub fn poisons_sandbox(&self) -> bool {
        matches!(self, Error::IsolationLeak { .. } | Error::SandboxPoisoned(_))
    }
}
