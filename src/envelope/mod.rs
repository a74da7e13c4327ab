//! Feed envelopes: charset handling and control-message classification.

pub mod charset;
pub mod classifier;

pub use classifier::{
    Envelope, NO_NEW_DATA_MESSAGE, RATE_LIMITED_PREFIX, classify, classify_envelope,
};
