//! JSON-RPC smart-contract client for end-to-end tests of token bridges.
//!
//! Contracts are described by compact method tables (`balanceOf(address)uint256`,
//! `event:Transfer(i:address,i:address,uint256)`), called through a typed
//! dispatcher, and driven concurrently through a bounded task pool.

pub mod config;
pub mod error;
pub mod ethereum;
pub mod pool;
pub mod scenario;

pub use error::{ClientError, Result};
