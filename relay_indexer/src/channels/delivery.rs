use std::{fmt::Debug, sync::Arc};

/// A message as it sits in the transport, along with the number of times it has been handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub payload: String,
    pub attempt: u32,
}

impl Envelope {
    pub fn new<S: Into<String>>(payload: S) -> Self {
        Self { payload: payload.into(), attempt: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The message was processed and can be forgotten.
    Ack,
    /// The message can never be processed. It is dropped without redelivery.
    Reject,
    /// Processing failed, but could succeed later. The transport may redeliver the message.
    Nack,
}

/// The transport side of a delivery. Implemented by each channel backend.
pub trait Acknowledger: Send + Sync {
    fn settle(&self, envelope: Envelope, settlement: Settlement);
}

/// A single inbound message handed to a consumer.
///
/// Every delivery must be settled exactly once via [`Delivery::ack`], [`Delivery::reject`] or [`Delivery::nack`].
pub struct Delivery {
    envelope: Envelope,
    acker: Arc<dyn Acknowledger>,
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery").field("envelope", &self.envelope).finish()
    }
}

impl Delivery {
    pub fn new(envelope: Envelope, acker: Arc<dyn Acknowledger>) -> Self {
        Self { envelope, acker }
    }

    pub fn payload(&self) -> &str {
        self.envelope.payload.as_str()
    }

    pub fn attempt(&self) -> u32 {
        self.envelope.attempt
    }

    pub fn ack(self) {
        self.settle(Settlement::Ack)
    }

    pub fn reject(self) {
        self.settle(Settlement::Reject)
    }

    pub fn nack(self) {
        self.settle(Settlement::Nack)
    }

    fn settle(self, settlement: Settlement) {
        let Self { envelope, acker } = self;
        acker.settle(envelope, settlement);
    }
}
