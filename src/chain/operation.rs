//! Operations carried inside transactions.
//!
//! The payload of an operation is kept as an opaque, insertion-ordered JSON map so
//! blocks containing operation kinds this crate does not know about still decode.
//! [`Operation::typed`] interprets the few kinds the client reads directly.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

macro_rules! operation_kinds {
    ($($variant:ident => $tag:literal,)+) => {
        /// Operation type tag as it appears in the `type` field of `block_api` payloads.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum OperationKind {
            $($variant,)+
            /// A tag this crate does not recognise, preserved verbatim.
            Unknown(String),
        }

        impl OperationKind {
            /// Every recognised kind, in protocol order.
            pub const KNOWN: &'static [OperationKind] = &[$(OperationKind::$variant,)+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(OperationKind::$variant => $tag,)+
                    OperationKind::Unknown(tag) => tag.as_str(),
                }
            }

            pub fn parse(tag: &str) -> Self {
                match tag {
                    $($tag => OperationKind::$variant,)+
                    other => OperationKind::Unknown(other.to_owned()),
                }
            }
        }
    };
}

operation_kinds! {
    Vote => "vote_operation",
    Comment => "comment_operation",
    Transfer => "transfer_operation",
    TransferToVesting => "transfer_to_vesting_operation",
    WithdrawVesting => "withdraw_vesting_operation",
    LimitOrderCreate => "limit_order_create_operation",
    LimitOrderCancel => "limit_order_cancel_operation",
    FeedPublish => "feed_publish_operation",
    Convert => "convert_operation",
    AccountCreate => "account_create_operation",
    AccountUpdate => "account_update_operation",
    WitnessUpdate => "witness_update_operation",
    AccountWitnessVote => "account_witness_vote_operation",
    AccountWitnessProxy => "account_witness_proxy_operation",
    Pow => "pow_operation",
    Custom => "custom_operation",
    ReportOverProduction => "report_over_production_operation",
    DeleteComment => "delete_comment_operation",
    CustomJson => "custom_json_operation",
    CommentOptions => "comment_options_operation",
    SetWithdrawVestingRoute => "set_withdraw_vesting_route_operation",
    LimitOrderCreate2 => "limit_order_create2_operation",
    ClaimAccount => "claim_account_operation",
    CreateClaimedAccount => "create_claimed_account_operation",
    RequestAccountRecovery => "request_account_recovery_operation",
    RecoverAccount => "recover_account_operation",
    ChangeRecoveryAccount => "change_recovery_account_operation",
    EscrowTransfer => "escrow_transfer_operation",
    EscrowDispute => "escrow_dispute_operation",
    EscrowRelease => "escrow_release_operation",
    Pow2 => "pow2_operation",
    EscrowApprove => "escrow_approve_operation",
    TransferToSavings => "transfer_to_savings_operation",
    TransferFromSavings => "transfer_from_savings_operation",
    CancelTransferFromSavings => "cancel_transfer_from_savings_operation",
    CustomBinary => "custom_binary_operation",
    DeclineVotingRights => "decline_voting_rights_operation",
    ResetAccount => "reset_account_operation",
    SetResetAccount => "set_reset_account_operation",
    ClaimRewardBalance => "claim_reward_balance_operation",
    DelegateVestingShares => "delegate_vesting_shares_operation",
    AccountCreateWithDelegation => "account_create_with_delegation_operation",
    WitnessSetProperties => "witness_set_properties_operation",
    AccountUpdate2 => "account_update2_operation",
    CreateProposal => "create_proposal_operation",
    UpdateProposalVotes => "update_proposal_votes_operation",
    RemoveProposal => "remove_proposal_operation",
    UpdateProposal => "update_proposal_operation",
    CollateralizedConvert => "collateralized_convert_operation",
    RecurrentTransfer => "recurrent_transfer_operation",
}

impl OperationKind {
    pub fn is_known(&self) -> bool {
        !matches!(self, OperationKind::Unknown(_))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for OperationKind {
    fn from(tag: String) -> Self {
        match OperationKind::parse(&tag) {
            OperationKind::Unknown(_) => OperationKind::Unknown(tag),
            known => known,
        }
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Unknown(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl Serialize for OperationKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperationKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(OperationKind::from)
    }
}

/// One state-changing action inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default)]
    pub value: Map<String, Value>,
}

impl Operation {
    pub fn new(kind: OperationKind, value: Map<String, Value>) -> Self {
        Self { kind, value }
    }

    /// Interprets the payload for the operation kinds the client understands.
    ///
    /// Returns `Ok(None)` for every other kind. A recognised kind whose payload does not
    /// match the expected shape is an error.
    pub fn typed(&self) -> Result<Option<TypedOperation>> {
        let typed = match self.kind {
            OperationKind::Vote => TypedOperation::Vote(self.decode_value()?),
            OperationKind::Comment => TypedOperation::Comment(self.decode_value()?),
            OperationKind::Transfer => TypedOperation::Transfer(self.decode_value()?),
            OperationKind::CustomJson => TypedOperation::CustomJson(self.decode_value()?),
            _ => return Ok(None),
        };
        Ok(Some(typed))
    }

    fn decode_value<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.value.clone()))
            .with_context(|| format!("malformed {} payload", self.kind))
    }
}

/// Typed view over the operation kinds the client interprets.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedOperation {
    Vote(VoteOperation),
    Comment(CommentOperation),
    Transfer(TransferOperation),
    CustomJson(CustomJsonOperation),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoteOperation {
    pub voter: String,
    pub author: String,
    pub permlink: String,
    pub weight: i16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommentOperation {
    pub parent_author: String,
    pub parent_permlink: String,
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub json_metadata: String,
}

/// Amounts are left as raw JSON: nodes emit either legacy `"1.000 HIVE"` strings or
/// NAI objects depending on the API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferOperation {
    pub from: String,
    pub to: String,
    pub amount: Value,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomJsonOperation {
    #[serde(default)]
    pub required_auths: Vec<String>,
    #[serde(default)]
    pub required_posting_auths: Vec<String>,
    pub id: String,
    pub json: String,
}

impl CustomJsonOperation {
    /// Parses the embedded `json` string.
    pub fn payload(&self) -> Result<Value> {
        serde_json::from_str(&self.json)
            .with_context(|| format!("custom_json {} carries invalid JSON", self.id))
    }
}
