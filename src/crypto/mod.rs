//! Remote signing and encryption.
//!
//! - [`MacSigner`] / [`Cipher`]: narrow capabilities handed to whoever needs them
//! - [`KmsClient`]: the network adapter, with CRC32C transit checks
//! - [`CipherStrategy`]: production vs. development encryption, chosen at startup

pub mod checksum;
mod cipher;
mod kms;
mod signer;

pub use cipher::{CipherStrategy, InsecureHexCipher};
pub use kms::KmsClient;
pub use signer::{Cipher, MacSigner, SignerError};
