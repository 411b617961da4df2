//! Protocol engine for a Nostr Wallet Connect (NIP-47) service provider.
//!
//! This crate implements the NIP-47 protocol end to end: relay transport,
//! event cryptography, authorization/budget accounting, request dispatch,
//! and method handlers. It does not implement a host wallet, a durable
//! store backend, or an admin HTTP surface — those are external
//! collaborators reached through the [`wallet::HostWallet`] and
//! [`store::Store`] traits; `nwc-sqlite` and the `nwcd` binary provide
//! concrete implementations.

#![warn(missing_docs)]

pub mod budget;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod pairing;
pub mod queue;
pub mod relay;
pub mod service;
pub mod store;
pub mod subscription;
pub mod validate;
pub mod wallet;

pub mod handlers;
