//! Chain data model: blocks, transactions, operations, and the handful of
//! node-level records the client reads while streaming.

pub mod account;
pub mod block;
pub mod operation;
pub mod properties;

pub use account::Account;
pub use block::{block_num_from_id, Block, Transaction};
pub use operation::{
    CommentOperation, CustomJsonOperation, Operation, OperationKind, TransferOperation,
    TypedOperation, VoteOperation,
};
pub use properties::DynamicGlobalProperties;
