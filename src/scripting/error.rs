use thiserror::Error;

use super::temporaries::TempKind;

/// Errors surfaced by the scripting bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to initialize the Lua runtime")]
    Init(#[source] mlua::Error),

    #[error("Lua libraries have not been loaded; call load_libs first")]
    NotReady,

    #[error("error in Lua chunk `{chunk}`")]
    Script {
        chunk: String,
        #[source]
        source: mlua::Error,
    },

    #[error("global `{0}` is not defined")]
    MissingGlobal(String),

    #[error("global `{name}` is a {type_name}, not a function")]
    NotCallable {
        name: String,
        type_name: &'static str,
    },

    #[error("call to `{name}` failed")]
    Call {
        name: String,
        #[source]
        source: mlua::Error,
    },

    #[error("temporary {kind} pool exhausted ({capacity} slots)")]
    PoolExhausted { kind: TempKind, capacity: usize },

    #[error("cannot mark {count} temporary {kind}s in use, capacity is {capacity}")]
    CountOutOfRange {
        kind: TempKind,
        count: u32,
        capacity: usize,
    },

    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Formats the error together with its source chain on one line.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

impl From<BridgeError> for mlua::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Lua(inner) => inner,
            other => mlua::Error::external(other),
        }
    }
}
