pub mod responses;
pub mod rest;
pub mod signer;

pub use rest::CryptoComClient;
pub use signer::{RequestSigner, SignedRequest};
