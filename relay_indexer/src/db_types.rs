use std::{fmt::Display, str::FromStr};

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use relay_common::TokenAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indexer::IndexerError;

//--------------------------------------     OrderStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order is live and, as far as we know, the maker can honour it.
    Open,
    /// The order's taker amount has been filled completely on-chain.
    Filled,
    /// The maker's available balance no longer covers the order.
    Unfunded,
    /// The order was cancelled. Cancellations are recorded elsewhere; the indexer never overrides them.
    Cancelled,
}

impl OrderStatus {
    /// The allowed status transitions. Remaining in the same state is always allowed.
    ///
    /// * Open <-> Unfunded
    /// * Open | Unfunded -> Filled
    /// * anything -> Cancelled
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Open, Open) |
                (Unfunded, Unfunded) |
                (Filled, Filled) |
                (Open, Unfunded) |
                (Unfunded, Open) |
                (Open, Filled) |
                (Unfunded, Filled) |
                (_, Cancelled)
        )
    }

    /// Orders in these states take part in the funding check.
    pub fn is_fundable(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Unfunded)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "Open"),
            OrderStatus::Filled => write!(f, "Filled"),
            OrderStatus::Unfunded => write!(f, "Unfunded"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "Filled" => Ok(Self::Filled),
            "Unfunded" => Ok(Self::Unfunded),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
/// The signed, immutable terms of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub exchange_address: Address,
    pub maker: Address,
    /// `Address::ZERO` means that anyone may fill the order.
    pub taker: Address,
    pub maker_token: Address,
    pub taker_token: Address,
    pub fee_recipient: Address,
    pub maker_asset_amount: TokenAmount,
    pub taker_asset_amount: TokenAmount,
    #[serde(default)]
    pub maker_fee: TokenAmount,
    #[serde(default)]
    pub taker_fee: TokenAmount,
    pub expiration_time_seconds: u64,
    pub salt: U256,
    /// Opaque signature bytes. Validity is established before an order reaches the indexer.
    pub signature: Bytes,
}

impl Order {
    /// The deterministic digest of the order terms. This is the order's identity in storage.
    ///
    /// The signature is not covered by the hash.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(6 * 20 + 6 * 32);
        buf.extend_from_slice(self.exchange_address.as_slice());
        buf.extend_from_slice(self.maker.as_slice());
        buf.extend_from_slice(self.taker.as_slice());
        buf.extend_from_slice(self.maker_token.as_slice());
        buf.extend_from_slice(self.taker_token.as_slice());
        buf.extend_from_slice(self.fee_recipient.as_slice());
        buf.extend_from_slice(&self.maker_asset_amount.to_be_bytes());
        buf.extend_from_slice(&self.taker_asset_amount.to_be_bytes());
        buf.extend_from_slice(&self.maker_fee.to_be_bytes());
        buf.extend_from_slice(&self.taker_fee.to_be_bytes());
        buf.extend_from_slice(&U256::from(self.expiration_time_seconds).to_be_bytes::<32>());
        buf.extend_from_slice(&self.salt.to_be_bytes::<32>());
        keccak256(&buf)
    }

    /// Checks the terms that the indexer relies on. Signatures are not checked here.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.maker.is_zero() {
            return Err(IndexerError::InvalidOrder("maker cannot be the zero address".into()));
        }
        if self.maker_asset_amount.is_zero() {
            return Err(IndexerError::InvalidOrder("makerAssetAmount must be greater than zero".into()));
        }
        if self.taker_asset_amount.is_zero() {
            return Err(IndexerError::InvalidOrder("takerAssetAmount must be greater than zero".into()));
        }
        if i64::try_from(self.expiration_time_seconds).is_err() {
            return Err(IndexerError::InvalidOrder(format!(
                "expirationTimeSeconds {} is out of range",
                self.expiration_time_seconds
            )));
        }
        Ok(())
    }
}

//--------------------------------------     OrderRecord       ---------------------------------------------------------
/// An order as persisted by the indexer, along with its mutable bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(skip)]
    pub id: i64,
    pub order_hash: B256,
    #[serde(flatten)]
    pub order: Order,
    pub status: OrderStatus,
    /// The cumulative taker amount filled on-chain.
    pub taker_asset_amount_filled: TokenAmount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn remaining_taker_amount(&self) -> TokenAmount {
        self.order.taker_asset_amount.saturating_sub(self.taker_asset_amount_filled)
    }

    pub fn is_filled(&self) -> bool {
        self.taker_asset_amount_filled >= self.order.taker_asset_amount
    }
}

//--------------------------------------     FillRecord        ---------------------------------------------------------
/// An on-chain fill, decoded from the fill channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRecord {
    pub order_hash: B256,
    /// The cumulative amount filled so far. This is not a delta.
    pub filled_taker_asset_amount: TokenAmount,
}

impl FillRecord {
    pub fn new(order_hash: B256, filled_taker_asset_amount: TokenAmount) -> Self {
        Self { order_hash, filled_taker_asset_amount }
    }
}

//--------------------------------------     SpendRecord       ---------------------------------------------------------
/// A change in a maker's available balance, decoded from the spend channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendRecord {
    /// The account whose balance changed
    pub address: Address,
    /// The token that was spent
    pub token: Address,
    pub reference_token: Address,
    /// The balance now available to `address` in `token`
    pub amount: TokenAmount,
}
