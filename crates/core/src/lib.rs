//! Rural Grow Core - Shared types library.
//!
//! This crate provides common types and the pure client-side logic used across
//! all Rural Grow components:
//! - `marketplace` - Web tier and BaaS client
//! - `cli` - Operator tooling (role management)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no network
//! clients, no async runtime. Everything that talks to the Backend-as-a-Service
//! lives in the marketplace crate.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, emails, roles and statuses
//! - [`cart`] - Local cart aggregation and its persisted format
//! - [`access`] - Route guard decisions and role-to-dashboard dispatch

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod cart;
pub mod types;

pub use access::{AuthPhase, Dashboard, Dispatch, GuardDecision, Route, RouteGuard};
pub use cart::{CART_STORAGE_KEY, Cart, CartItem, CartProduct};
pub use types::*;
