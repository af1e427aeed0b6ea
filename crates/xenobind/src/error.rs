use xenoabi::ForeignError;

use crate::handles::HandleKey;
use crate::proxy::ProxyObject;
use crate::resolve::MatchFailure;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("{class} has no attribute {name:?}")]
    AttributeNotFound { class: String, name: String },

    #[error("no overload of {class}.{method} accepts ({args}): {failure}")]
    NoMatchingOverload {
        class: String,
        method: String,
        /// Local kinds of the offending arguments, comma separated.
        args: String,
        failure: MatchFailure,
    },

    #[error("type error: expected {expected}, found {found}")]
    TypeError { expected: String, found: String },

    #[error("startup failed: {0}")]
    Startup(String),

    /// A handle was used or released after its key left the registry.
    #[error("handle {0} is not live")]
    Identity(HandleKey),

    /// Foreign code threw. `exception` is the throwable itself; `message`
    /// is a lossy copy of its text, so read `getMessage()` through
    /// `exception` when exact contents matter.
    #[error("{class}{}", message_suffix(.message))]
    ForeignException {
        class: String,
        message: Option<String>,
        exception: ProxyObject,
    },

    #[error(transparent)]
    Foreign(#[from] ForeignError),
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {}", m),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn type_error(expected: impl ToString, found: impl ToString) -> Self {
        Error::TypeError {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
