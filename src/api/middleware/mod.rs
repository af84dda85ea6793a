//! Request pipeline pieces.
//!
//! Every route passes through [`recover`] and [`headers`]. Page routes add
//! [`session`], [`csrf`] and [`auth`], in that order.

pub mod auth;
pub mod csrf;
pub mod headers;
pub mod recover;
pub mod session;
