/// Classified RPC failures. Carried inside `anyhow::Error` and recovered with
/// `downcast_ref` by the retry loops and by callers that need to branch on them.
#[derive(Debug)]
pub enum RpcError {
    Timeout {
        method: &'static str,
    },
    ResponseTooLarge {
        method: &'static str,
    },
    Transport {
        method: &'static str,
        reason: String,
    },
    Server {
        method: &'static str,
        code: i32,
        message: String,
    },
    Decode {
        method: &'static str,
        reason: String,
    },
    /// The node answered, but had no block at this number yet.
    EmptyResult {
        block_num: u64,
    },
}

impl RpcError {
    pub(crate) fn decode(method: &'static str, reason: impl ToString) -> Self {
        RpcError::Decode {
            method,
            reason: reason.to_string(),
        }
    }

    /// True for failures of the connection or the node itself, as opposed to
    /// payload problems or an empty answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Timeout { .. }
                | RpcError::ResponseTooLarge { .. }
                | RpcError::Transport { .. }
                | RpcError::Server { .. }
        )
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::ResponseTooLarge { method } => {
                write!(f, "rpc {method} response exceeded HTTP size limits")
            }
            RpcError::Transport { method, reason } => {
                write!(f, "rpc {method} call failed: {reason}")
            }
            RpcError::Server {
                method,
                code,
                message,
            } => write!(f, "rpc {method} call failed (code={code}, message={message})"),
            RpcError::Decode { method, reason } => {
                write!(f, "failed to decode {method} response: {reason}")
            }
            RpcError::EmptyResult { block_num } => {
                write!(f, "block {block_num} is not available yet")
            }
        }
    }
}

impl std::error::Error for RpcError {}
