use alloy_primitives::{Address, Bytes, B256, U256};
use relay_common::TokenAmount;

use crate::{
    db::sqlite::orders,
    db_types::{Order, OrderStatus},
    SqliteDatabase,
};

pub const EXCHANGE: Address = Address::repeat_byte(0xe0);
pub const MAKER_TOKEN: Address = Address::repeat_byte(0xa1);
pub const TAKER_TOKEN: Address = Address::repeat_byte(0xb2);

pub fn maker(n: u8) -> Address {
    Address::repeat_byte(0x10 + n)
}

pub fn taker(n: u8) -> Address {
    Address::repeat_byte(0x50 + n)
}

/// A sample order from `maker` offering `maker_amount` of `MAKER_TOKEN` for `taker_amount` of `TAKER_TOKEN`. `salt`
/// distinguishes otherwise identical orders.
pub fn sample_order(maker: Address, maker_amount: u64, taker_amount: u64, salt: u64) -> Order {
    Order {
        exchange_address: EXCHANGE,
        maker,
        taker: taker(1),
        maker_token: MAKER_TOKEN,
        taker_token: TAKER_TOKEN,
        fee_recipient: Address::ZERO,
        maker_asset_amount: TokenAmount::from(maker_amount),
        taker_asset_amount: TokenAmount::from(taker_amount),
        maker_fee: TokenAmount::ZERO,
        taker_fee: TokenAmount::ZERO,
        expiration_time_seconds: 1_900_000_000,
        salt: U256::from(salt),
        signature: Bytes::from_static(&[0x1b; 65]),
    }
}

/// Cancels an indexed order directly in storage. Cancellations never come through the indexer.
pub async fn cancel_order(db: &SqliteDatabase, hash: &B256) {
    let mut tx = db.begin().await.expect("Could not start transaction");
    let record =
        orders::fetch_order_by_hash(hash, &mut tx).await.expect("Error fetching order").expect("No such order");
    orders::update_order_status(&record, OrderStatus::Cancelled, &mut tx).await.expect("Could not cancel order");
    tx.commit().await.expect("Could not commit cancellation");
}
